//! The aggregate verdict for one artifact.

use serde::{Deserialize, Serialize};

/// Outcome of validating one artifact with both checkers.
///
/// `is_valid` holds exactly when `errors` is empty. Fields are private and
/// deserialization goes through [`TryFrom`], so no value breaking that rule
/// can exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VerdictRepr", into = "VerdictRepr")]
pub struct ValidationVerdict {
    is_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
    raw_lint_output: String,
    raw_syntax_output: String,
}

impl ValidationVerdict {
    /// Build a verdict; duplicate errors are dropped keeping first occurrence.
    pub fn new(
        errors: Vec<String>,
        warnings: Vec<String>,
        raw_lint_output: impl Into<String>,
        raw_syntax_output: impl Into<String>,
    ) -> Self {
        let errors = dedup_preserving_order(errors);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            raw_lint_output: raw_lint_output.into(),
            raw_syntax_output: raw_syntax_output.into(),
        }
    }

    /// An invalid verdict that never reached the checkers.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self::new(vec![error.into()], Vec::new(), "", "")
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn raw_lint_output(&self) -> &str {
        &self.raw_lint_output
    }

    pub fn raw_syntax_output(&self) -> &str {
        &self.raw_syntax_output
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[derive(Serialize, Deserialize)]
struct VerdictRepr {
    is_valid: bool,
    errors: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    raw_lint_output: String,
    #[serde(default)]
    raw_syntax_output: String,
}

impl TryFrom<VerdictRepr> for ValidationVerdict {
    type Error = String;

    fn try_from(repr: VerdictRepr) -> Result<Self, Self::Error> {
        if repr.is_valid != repr.errors.is_empty() {
            return Err(format!(
                "inconsistent verdict: is_valid={} with {} error(s)",
                repr.is_valid,
                repr.errors.len()
            ));
        }
        let verdict = ValidationVerdict::new(
            repr.errors,
            repr.warnings,
            repr.raw_lint_output,
            repr.raw_syntax_output,
        );
        Ok(verdict)
    }
}

impl From<ValidationVerdict> for VerdictRepr {
    fn from(v: ValidationVerdict) -> Self {
        Self {
            is_valid: v.is_valid,
            errors: v.errors,
            warnings: v.warnings,
            raw_lint_output: v.raw_lint_output,
            raw_syntax_output: v.raw_syntax_output,
        }
    }
}
