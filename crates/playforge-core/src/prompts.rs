//! System prompt loading.

use std::path::Path;

use crate::domain::PromptError;

/// The bundled Ansible/Kubernetes expert prompt.
pub const BUNDLED_SYSTEM_PROMPT: &str = include_str!("../prompts/ansible_k8s_expert.txt");

/// Phrases a system prompt must contain to steer generation away from the
/// most common lint failures.
pub const CRITICAL_KEYWORDS: [&str; 4] = [
    "kubernetes.core.k8s",
    "NEVER use kubectl",
    "FQCN",
    "state: present",
];

/// Load the system prompt: `override_path` when given, the bundled one otherwise.
pub fn load_system_prompt(override_path: Option<&Path>) -> Result<String, PromptError> {
    let prompt = match override_path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| PromptError::Missing {
            path: path.to_path_buf(),
            source,
        })?,
        None => BUNDLED_SYSTEM_PROMPT.to_string(),
    };
    check_keywords(&prompt)?;
    Ok(prompt)
}

/// Fail listing every critical keyword `prompt` lacks.
pub fn check_keywords(prompt: &str) -> Result<(), PromptError> {
    let missing: Vec<String> = CRITICAL_KEYWORDS
        .iter()
        .filter(|kw| !prompt.contains(*kw))
        .map(|kw| kw.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PromptError::MissingKeywords(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_prompt_has_keywords() {
        let prompt = load_system_prompt(None).unwrap();
        assert!(prompt.contains("kubernetes.core.k8s"));
    }

    #[test]
    fn test_override_missing_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Use FQCN and kubernetes.core.k8s.").unwrap();

        let err = load_system_prompt(Some(&path)).unwrap_err();
        match err {
            PromptError::MissingKeywords(missing) => {
                assert_eq!(missing, vec!["NEVER use kubectl", "state: present"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_missing_file() {
        let err = load_system_prompt(Some(Path::new("/nonexistent/prompt.txt"))).unwrap_err();
        assert!(matches!(err, PromptError::Missing { .. }));
    }

    #[test]
    fn test_override_used_when_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        let text = "FQCN kubernetes.core.k8s NEVER use kubectl state: present custom";
        std::fs::write(&path, text).unwrap();
        assert_eq!(load_system_prompt(Some(&path)).unwrap(), text);
    }
}
