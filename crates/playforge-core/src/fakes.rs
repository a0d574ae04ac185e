//! In-memory fakes for the generator and sandbox seams (testing only)
//!
//! Provides `ScriptedGenerator`, `FailingGenerator`, `RuleSandbox`, and
//! `UnavailableSandbox`, which satisfy the trait contracts without network
//! access or a container runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use playforge_sandbox::{
    BuiltinChecker, CheckerInvocation, CheckerOutcome, SandboxError, SandboxResult, SandboxRunner,
};

use crate::domain::{GenerationRequest, GenerationResponse, GeneratorError};
use crate::generator::Generator;

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Returns canned outputs in order, repeating the last one when the script
/// runs out. Every request is recorded.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
    model: String,
}

impl ScriptedGenerator {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(outputs.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: None,
            model: "scripted".to_string(),
        }
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let content = {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            last.clone().ok_or(GeneratorError::EmptyResponse)?
        };

        Ok(GenerationResponse {
            token_count: Some(content.len() as u64),
            content,
            model_id: self.model.clone(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// FailingGenerator
// ---------------------------------------------------------------------------

/// Fails every call with a provider error.
#[derive(Debug)]
pub struct FailingGenerator {
    status: u16,
    body: String,
    calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Provider {
            status: self.status,
            body: self.body.clone(),
        })
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// RuleSandbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Effect {
    Fail(String),
    Warn(String),
    Hang,
}

#[derive(Debug, Clone)]
struct Rule {
    checker: &'static str,
    needle: String,
    effect: Effect,
}

/// Sandbox that "checks" payloads with substring rules.
///
/// A payload containing a rule's needle triggers that rule for the named
/// checker; the first matching rule wins. Payloads matching nothing pass.
#[derive(Debug, Default)]
pub struct RuleSandbox {
    rules: Vec<Rule>,
    lint_delay: Option<Duration>,
    calls: AtomicUsize,
}

impl RuleSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, checker: BuiltinChecker, needle: &str, effect: Effect) -> Self {
        self.rules.push(Rule {
            checker: checker.name(),
            needle: needle.to_string(),
            effect,
        });
        self
    }

    /// ansible-lint exits 2 with `message` on stderr.
    pub fn lint_fails_on(self, needle: &str, message: &str) -> Self {
        self.rule(
            BuiltinChecker::AnsibleLint,
            needle,
            Effect::Fail(message.to_string()),
        )
    }

    /// ansible-lint passes but prints `stdout`.
    pub fn lint_warns_on(self, needle: &str, stdout: &str) -> Self {
        self.rule(
            BuiltinChecker::AnsibleLint,
            needle,
            Effect::Warn(stdout.to_string()),
        )
    }

    /// ansible-lint is killed at its deadline.
    pub fn lint_hangs_on(self, needle: &str) -> Self {
        self.rule(BuiltinChecker::AnsibleLint, needle, Effect::Hang)
    }

    /// syntax-check exits 4 with `message` on stderr.
    pub fn syntax_fails_on(self, needle: &str, message: &str) -> Self {
        self.rule(
            BuiltinChecker::SyntaxCheck,
            needle,
            Effect::Fail(message.to_string()),
        )
    }

    /// Delay the lint result so syntax-check finishes first.
    pub fn with_lint_delay_ms(mut self, ms: u64) -> Self {
        self.lint_delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxRunner for RuleSandbox {
    async fn run(
        &self,
        invocation: &CheckerInvocation,
        payload: &str,
    ) -> SandboxResult<CheckerOutcome> {
        invocation.check()?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        if invocation.name == BuiltinChecker::AnsibleLint.name() {
            if let Some(delay) = self.lint_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let timeout_secs = invocation.timeout_secs;
        let matched = self
            .rules
            .iter()
            .find(|r| r.checker == invocation.name && payload.contains(&r.needle));

        let outcome = match matched.map(|r| &r.effect) {
            None => CheckerOutcome::completed(0, "", "", timeout_secs),
            Some(Effect::Fail(message)) => {
                let code = if invocation.name == BuiltinChecker::SyntaxCheck.name() {
                    4
                } else {
                    2
                };
                CheckerOutcome::completed(code, "", message.as_str(), timeout_secs)
            }
            Some(Effect::Warn(stdout)) => {
                CheckerOutcome::completed(0, stdout.as_str(), "", timeout_secs)
            }
            Some(Effect::Hang) => CheckerOutcome::deadline_exceeded("", "", timeout_secs),
        };
        Ok(outcome)
    }

    fn backend_name(&self) -> &'static str {
        "rules"
    }
}

// ---------------------------------------------------------------------------
// UnavailableSandbox
// ---------------------------------------------------------------------------

/// Sandbox whose runtime never starts.
#[derive(Debug)]
pub struct UnavailableSandbox {
    reason: String,
    calls: AtomicUsize,
}

impl UnavailableSandbox {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxRunner for UnavailableSandbox {
    async fn run(
        &self,
        _invocation: &CheckerInvocation,
        _payload: &str,
    ) -> SandboxResult<CheckerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SandboxError::Unavailable {
            reason: self.reason.clone(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
