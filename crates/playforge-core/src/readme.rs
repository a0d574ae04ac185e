//! README generation for a finished playbook.

use tracing::warn;

use crate::domain::{GenerationRequest, GeneratorError};
use crate::generator::Generator;

const README_SYSTEM_PROMPT: &str =
    "You are a technical writer. Produce clear, professional Markdown documentation.";
const README_MAX_TOKENS: u32 = 2048;
const README_TEMPERATURE: f64 = 0.5;

fn readme_prompt(playbook: &str) -> String {
    format!(
        "Write a README.md in Markdown for the Ansible playbook below, which manages \
Kubernetes resources.\n\n\
Cover these sections:\n\
1. Overview: what the playbook deploys\n\
2. Prerequisites: tools, cluster access and collections required\n\
3. Usage: the exact commands to run it\n\
4. Created resources: every Kubernetes object it creates\n\
5. Customization: which variables to change per environment\n\
6. Troubleshooting: common failures and how to fix them\n\n\
Playbook:\n```yaml\n{playbook}\n```\n"
    )
}

/// Ask the generator for README markdown.
pub async fn try_generate_readme(
    generator: &dyn Generator,
    playbook: &str,
) -> Result<String, GeneratorError> {
    let request = GenerationRequest::new(
        readme_prompt(playbook),
        README_SYSTEM_PROMPT,
        README_MAX_TOKENS,
        README_TEMPERATURE,
    )?;
    let response = generator.generate(&request).await?;
    Ok(response.content)
}

/// Like [`try_generate_readme`], but a failure becomes a README describing it.
pub async fn generate_readme(generator: &dyn Generator, playbook: &str) -> String {
    match try_generate_readme(generator, playbook).await {
        Ok(readme) => readme,
        Err(e) => {
            warn!(error = %e, "README generation failed");
            failure_readme(&e)
        }
    }
}

fn failure_readme(err: &GeneratorError) -> String {
    format!("# README Generation Failed\n\nError: {err}\n")
}
