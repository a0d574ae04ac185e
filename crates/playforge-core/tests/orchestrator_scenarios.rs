//! End-to-end orchestration scenarios over in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use playforge_core::fakes::{FailingGenerator, RuleSandbox, ScriptedGenerator, UnavailableSandbox};
use playforge_core::{
    FailureKind, Generator, Orchestrator, OrchestratorError, OrchestratorOptions, SandboxRunner,
    ValidationEngine, FEEDBACK_HEADER,
};

const SYSTEM_PROMPT: &str = "You write Ansible playbooks.";

const REDIS_PLAYBOOK: &str = "---
- name: Deploy Redis
  hosts: localhost
  connection: local
  gather_facts: false
  tasks:
    - name: Redis deployment
      kubernetes.core.k8s:
        state: present
        definition:
          apiVersion: apps/v1
          kind: Deployment
          metadata:
            name: redis
            namespace: default
          spec:
            replicas: 1
";

fn orchestrator(generator: Arc<dyn Generator>, sandbox: Arc<dyn SandboxRunner>) -> Orchestrator {
    Orchestrator::new(
        generator,
        Arc::new(ValidationEngine::new(sandbox)),
        SYSTEM_PROMPT,
        OrchestratorOptions::default(),
    )
}

/// Sandbox rejecting the two classic mistakes.
fn strict_sandbox() -> RuleSandbox {
    RuleSandbox::new()
        .lint_fails_on("kubectl", "command-instead-of-module: kubectl used in place of kubernetes.core.k8s")
        .lint_fails_on("  k8s:", "fqcn[action-core]: Use FQCN for builtin module actions (k8s)")
        .syntax_fails_on("\t", "ERROR! found character that cannot start any token")
}

#[tokio::test]
async fn test_single_attempt_success() {
    let generator = Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK]));
    let sandbox = Arc::new(strict_sandbox());
    let orch = orchestrator(generator.clone(), sandbox.clone());

    let result = orch.orchestrate("Deploy Redis with 1 replica", 3).await.unwrap();

    assert!(result.success);
    assert_eq!(result.artifact, REDIS_PLAYBOOK);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.model_used.as_deref(), Some("scripted"));
    assert!(result.verdict.as_ref().unwrap().is_valid());
    assert!(result.failure_reason.is_none());
    assert_eq!(generator.calls(), 1);
    assert_eq!(sandbox.calls(), 2);

    assert_eq!(result.history.len(), 1);
    assert_eq!(
        result.history[0].artifact_digest.as_deref(),
        Some(playforge_core::artifact_digest(REDIS_PLAYBOOK).as_str())
    );
}

#[tokio::test]
async fn test_third_attempt_succeeds_with_feedback() {
    let generator = Arc::new(ScriptedGenerator::new([
        "- hosts: localhost\n  tasks:\n    - shell: kubectl apply -f redis.yaml\n",
        "- hosts: localhost\n  tasks:\n    - name: apply\n      k8s:\n        state: present\n",
        REDIS_PLAYBOOK,
    ]));
    let orch = orchestrator(generator.clone(), Arc::new(strict_sandbox()));

    let result = orch.orchestrate("Deploy Redis with 1 replica", 3).await.unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.artifact, REDIS_PLAYBOOK);

    let requests = generator.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].description(), "Deploy Redis with 1 replica");
    assert!(requests[1].description().contains("command-instead-of-module"));

    // Only the latest errors are carried forward.
    let third = requests[2].description();
    assert!(third.starts_with("Deploy Redis with 1 replica\n\n"));
    assert!(third.contains(&format!(
        "{FEEDBACK_HEADER}\nansible-lint failed: fqcn[action-core]"
    )));
    assert!(!third.contains("command-instead-of-module"));
    assert_eq!(third.matches(FEEDBACK_HEADER).count(), 1);

    let error_counts: Vec<usize> = result.history.iter().map(|h| h.error_count).collect();
    assert_eq!(error_counts, [1, 1, 0]);
}

#[tokio::test]
async fn test_always_invalid_exhausts() {
    let generator = Arc::new(ScriptedGenerator::new(["- shell: kubectl get pods\n"]));
    let orch = orchestrator(generator.clone(), Arc::new(strict_sandbox()));

    let result = orch.orchestrate("List pods", 2).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.artifact, "");
    assert_eq!(result.attempts, 2);
    assert_eq!(result.failure_kind, Some(FailureKind::Exhausted));
    assert_eq!(result.failure_reason.as_deref(), Some("exhausted 2 attempts"));
    let verdict = result.verdict.unwrap();
    assert!(!verdict.is_valid());
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_hung_checker_is_a_retryable_finding() {
    let generator = Arc::new(ScriptedGenerator::new(["include: /dev/zero\n", REDIS_PLAYBOOK]));
    let sandbox = Arc::new(RuleSandbox::new().lint_hangs_on("/dev/zero"));
    let orch = orchestrator(generator.clone(), sandbox);

    let result = orch.orchestrate("Deploy Redis", 2).await.unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert!(generator.requests()[1]
        .description()
        .contains("ansible-lint timed out after 30s"));
}

#[tokio::test]
async fn test_generator_failure_is_not_retried() {
    let generator = Arc::new(FailingGenerator::new(401, "invalid x-api-key"));
    let sandbox = Arc::new(RuleSandbox::new());
    let orch = orchestrator(generator.clone(), sandbox.clone());

    let result = orch.orchestrate("Deploy Redis", 3).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.artifact, "");
    assert_eq!(result.failure_kind, Some(FailureKind::Generator));
    let reason = result.failure_reason.unwrap();
    assert!(reason.starts_with("generation failed: "), "{reason}");
    assert!(reason.contains("invalid x-api-key"));
    assert_eq!(generator.calls(), 1);
    assert_eq!(sandbox.calls(), 0);
    assert!(result.verdict.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_generator_deadline_ends_run() {
    let generator = Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK]).with_delay(Duration::from_secs(600)));
    let orch = Orchestrator::new(
        generator.clone(),
        Arc::new(ValidationEngine::new(Arc::new(RuleSandbox::new()))),
        SYSTEM_PROMPT,
        OrchestratorOptions {
            generation_timeout_secs: 5,
            ..OrchestratorOptions::default()
        },
    );

    let result = orch.orchestrate("Deploy Redis", 3).await.unwrap();

    assert_eq!(result.failure_kind, Some(FailureKind::Generator));
    assert_eq!(
        result.failure_reason.as_deref(),
        Some("generation failed: generation timed out after 5s")
    );
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_sandbox_unavailable_is_not_retried() {
    let generator = Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK]));
    let sandbox = Arc::new(UnavailableSandbox::new("Cannot connect to the Docker daemon"));
    let orch = orchestrator(generator.clone(), sandbox.clone());

    let result = orch.orchestrate("Deploy Redis", 3).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Infrastructure));
    assert_eq!(
        result.failure_reason.as_deref(),
        Some("sandbox unavailable: Cannot connect to the Docker daemon")
    );
    assert_eq!(generator.calls(), 1);
    assert!(result.verdict.is_none());
}

#[tokio::test]
async fn test_zero_attempts_never_calls_generator() {
    let generator = Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK]));
    let orch = orchestrator(generator.clone(), Arc::new(RuleSandbox::new()));

    let err = orch.orchestrate("Deploy Redis", 0).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Configuration(_)));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_bad_temperature_fails_before_generation() {
    let generator = Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK]));
    let orch = Orchestrator::new(
        generator.clone(),
        Arc::new(ValidationEngine::new(Arc::new(RuleSandbox::new()))),
        SYSTEM_PROMPT,
        OrchestratorOptions {
            temperature: 7.0,
            ..OrchestratorOptions::default()
        },
    );

    assert!(orch.orchestrate("Deploy Redis", 1).await.is_err());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_fenced_output_is_unwrapped_before_validation() {
    let fenced = format!("```yaml\n{REDIS_PLAYBOOK}```\n");
    let generator = Arc::new(ScriptedGenerator::new([fenced]));
    let sandbox = Arc::new(RuleSandbox::new().syntax_fails_on("```", "ERROR! fence"));
    let orch = orchestrator(generator, sandbox);

    let result = orch.orchestrate("Deploy Redis", 1).await.unwrap();

    assert!(result.success);
    assert_eq!(result.artifact, REDIS_PLAYBOOK);
}

#[tokio::test]
async fn test_empty_output_is_invalid_and_retried() {
    let generator = Arc::new(ScriptedGenerator::new(["   \n", REDIS_PLAYBOOK]));
    let orch = orchestrator(generator.clone(), Arc::new(RuleSandbox::new()));

    let result = orch.orchestrate("Deploy Redis", 2).await.unwrap();

    assert!(result.success);
    assert!(generator.requests()[1]
        .description()
        .contains("artifact is empty"));
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let sandbox: Arc<dyn SandboxRunner> = Arc::new(strict_sandbox());
    let good = orchestrator(Arc::new(ScriptedGenerator::new([REDIS_PLAYBOOK])), sandbox.clone());
    let bad = orchestrator(
        Arc::new(ScriptedGenerator::new(["- shell: kubectl\n"])),
        sandbox.clone(),
    );

    let (a, b) = tokio::join!(good.orchestrate("a", 2), bad.orchestrate("b", 2));

    assert!(a.unwrap().success);
    assert!(!b.unwrap().success);
}
