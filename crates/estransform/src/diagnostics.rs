//! Non-fatal findings reported by stages.
//!
//! A stage that skips a rewrite (an unresolved specifier, a dynamic `require`)
//! records a [`Diagnostic`] instead of failing the file. Diagnostics are also
//! logged through `tracing` when they are created.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: &'static str,
    pub file: PathBuf,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(stage: &'static str, file: &Path, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            stage,
            file: file.to_path_buf(),
            severity: Severity::Warning,
            message: message.into(),
        };
        tracing::warn!(
            stage,
            file = %diagnostic.file.display(),
            "{}",
            diagnostic.message
        );
        diagnostic
    }

    pub fn info(stage: &'static str, file: &Path, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            stage,
            file: file.to_path_buf(),
            severity: Severity::Info,
            message: message.into(),
        };
        tracing::info!(
            stage,
            file = %diagnostic.file.display(),
            "{}",
            diagnostic.message
        );
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[estransform:{}] {}: {}",
            self.stage,
            self.file.display(),
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_file() {
        let diagnostic =
            Diagnostic::warning("meta-url", Path::new("/src/a.js"), "skipped './b.png'");
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert_eq!(
            diagnostic.to_string(),
            "[estransform:meta-url] /src/a.js: skipped './b.png'"
        );
    }
}
