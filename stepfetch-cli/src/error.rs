//! CLI error type.

use std::fmt;

/// Errors surfaced to the terminal with a one-line message.
#[derive(Debug)]
pub enum CliError {
    /// The HTTP client could not be constructed.
    HttpClient(String),

    /// A step call failed unrecoverably.
    Step(stepfetch::StepError),

    /// The state file could not be read, parsed or written.
    StateFile(String),

    /// The probe found nothing downloadable at the URL.
    Probe(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::HttpClient(msg) => write!(f, "Failed to create HTTP client: {}", msg),
            CliError::Step(e) => write!(f, "Download failed: {}", e),
            CliError::StateFile(msg) => write!(f, "State file error: {}", msg),
            CliError::Probe(msg) => write!(f, "Probe failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Step(e) => Some(e),
            _ => None,
        }
    }
}

impl From<stepfetch::StepError> for CliError {
    fn from(e: stepfetch::StepError) -> Self {
        CliError::Step(e)
    }
}
