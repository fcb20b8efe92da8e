// ABOUTME: Non-fatal warnings raised while a deploy runs (hook failures, --force overrides).
// ABOUTME: Printed for humans, or attached to the JSON result under "warnings".

use serde::Serialize;

use crate::output::{Output, OutputMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    /// A post-deploy or on-error hook exited non-zero.
    Hook,
    /// `--force` overrode an environment's auto-deploy rule.
    Forced,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn hook(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Hook,
            message: message.into(),
        }
    }

    pub fn forced(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Forced,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Print warnings as they stand; used when there is no result to carry them.
    pub fn print(&self, output: &Output) {
        for warning in &self.warnings {
            output.warning(&warning.message);
        }
    }

    /// Print `result`. JSON output embeds the warnings in the result object;
    /// other modes print them first.
    pub fn finish<T: Serialize>(&self, output: &Output, result: &T, human: &str) {
        if output.mode() == OutputMode::Json {
            output.result(&self.annotate(result), human);
        } else {
            self.print(output);
            output.result(result, human);
        }
    }

    pub fn annotate<'a, T: Serialize>(&'a self, result: &'a T) -> Annotated<'a, T> {
        Annotated {
            result,
            warnings: &self.warnings,
        }
    }
}

/// A result object with the run's warnings alongside its own fields.
#[derive(Serialize)]
pub struct Annotated<'a, T> {
    #[serde(flatten)]
    result: &'a T,
    #[serde(skip_serializing_if = "no_warnings")]
    warnings: &'a [Warning],
}

fn no_warnings(warnings: &&[Warning]) -> bool {
    warnings.is_empty()
}
