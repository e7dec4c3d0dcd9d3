use std::fmt;

use thiserror::Error;

/// Machine-readable conflict codes returned by the backing service (and
/// raised locally by the checklist engine's pre-checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCode {
  /// The step is automated; manual completion is not allowed.
  AutomatedStepUseAutomationEndpoint,
  /// The step is already completed. Informational: re-completing is an
  /// idempotent no-op, not an error banner.
  StepAlreadyCompleted,
  /// A dependency or gate is unmet. Carries a blockers list that is
  /// consumed verbatim; the service is authoritative for gating in
  /// ambiguous cases.
  WorkflowGated,
  /// External verification was called without its required inputs.
  MissingIdentifiers,
}

impl ConflictCode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ConflictCode::AutomatedStepUseAutomationEndpoint => "AUTOMATED_STEP_USE_AUTOMATION_ENDPOINT",
      ConflictCode::StepAlreadyCompleted => "STEP_ALREADY_COMPLETED",
      ConflictCode::WorkflowGated => "WORKFLOW_GATED",
      ConflictCode::MissingIdentifiers => "MISSING_IDENTIFIERS",
    }
  }

  /// Parse a code from a response body. Unrecognized codes return `None`
  /// and the response is treated as a generic server error.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "AUTOMATED_STEP_USE_AUTOMATION_ENDPOINT" => {
        Some(ConflictCode::AutomatedStepUseAutomationEndpoint)
      }
      "STEP_ALREADY_COMPLETED" => Some(ConflictCode::StepAlreadyCompleted),
      "WORKFLOW_GATED" => Some(ConflictCode::WorkflowGated),
      "MISSING_IDENTIFIERS" => Some(ConflictCode::MissingIdentifiers),
      _ => None,
    }
  }
}

impl fmt::Display for ConflictCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors surfaced by the template and execution stores.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The service rejected the request with a recognized conflict code.
  #[error("conflict ({code}): {message}")]
  Conflict {
    code: ConflictCode,
    message: String,
    /// Human-readable blocker descriptions, only populated for
    /// [`ConflictCode::WorkflowGated`].
    blockers: Vec<String>,
  },

  /// Transport failure before a response was received.
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  /// Unrecognized non-success response.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  #[error("invalid url: {0}")]
  Url(#[from] url::ParseError),
}

impl StoreError {
  pub fn conflict(code: ConflictCode, message: impl Into<String>) -> Self {
    StoreError::Conflict {
      code,
      message: message.into(),
      blockers: Vec::new(),
    }
  }

  pub fn conflict_code(&self) -> Option<ConflictCode> {
    match self {
      StoreError::Conflict { code, .. } => Some(*code),
      _ => None,
    }
  }
}
