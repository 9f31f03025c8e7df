//! Diagnostics handed to the logging facility.
//!
//! Every failed rewrite is reported once, with the method, the patch, the
//! cursor step that failed, and a severity. Recoverable diagnostics mean the
//! host method changed shape; fatal ones mean the patch itself is wrong.

use crate::il::MethodTarget;
use std::fmt;
use tracing::{error, warn};

/// How a failure affects the patch that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The landmark was not where the patch expected it; the original body is kept.
    Recoverable,
    /// The patch produced an invalid body or could not be installed.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Recoverable => f.write_str("recoverable"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub target: MethodTarget,
    pub patch: Option<String>,
    /// Cursor step (1-based) at which the rewrite stopped
    pub step: Option<usize>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(target: MethodTarget, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            target,
            patch: None,
            step: None,
            severity,
            message: message.into(),
        }
    }

    pub fn for_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn at_step(mut self, step: Option<usize>) -> Self {
        self.step = step;
        self
    }

    /// Log through `tracing`: recoverable failures as warnings, fatal ones as errors.
    pub fn emit(&self) {
        let patch = self.patch.as_deref().unwrap_or("-");
        match self.severity {
            Severity::Recoverable => warn!(
                target: "il_patcher::diagnostic",
                method = %self.target,
                patch,
                step = ?self.step,
                "{}",
                self.message
            ),
            Severity::Fatal => error!(
                target: "il_patcher::diagnostic",
                method = %self.target,
                patch,
                step = ?self.step,
                "{}",
                self.message
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.target)?;
        if let Some(patch) = &self.patch {
            write!(f, " (patch '{patch}')")?;
        }
        if let Some(step) = self.step {
            write!(f, " at step {step}")?;
        }
        write!(f, ": {}", self.message)
    }
}
