use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A named external integration that can complete a step without direct
/// human action.
///
/// On the wire a handler is a plain string. The external-system existence
/// check used on verification gates is spelled
/// `external_verification:<system>`; everything else is carried opaquely as
/// [`AutomationHandler::Named`] so new backend handlers never fail to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationHandler {
  /// Existence check against an external system. Success completes the
  /// step and records linkage metadata for display.
  ExternalVerification { system: String },
  /// Any other backend-registered handler.
  Named(String),
}

const EXTERNAL_VERIFICATION_PREFIX: &str = "external_verification:";

impl AutomationHandler {
  /// Parse the wire spelling. Never fails: anything that is not an
  /// external verification is carried as [`AutomationHandler::Named`].
  pub fn from_wire(s: &str) -> Self {
    match s.strip_prefix(EXTERNAL_VERIFICATION_PREFIX) {
      Some(system) => AutomationHandler::ExternalVerification {
        system: system.to_string(),
      },
      None => AutomationHandler::Named(s.to_string()),
    }
  }

  pub fn is_external_verification(&self) -> bool {
    matches!(self, AutomationHandler::ExternalVerification { .. })
  }
}

impl FromStr for AutomationHandler {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::from_wire(s))
  }
}

impl fmt::Display for AutomationHandler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AutomationHandler::ExternalVerification { system } => {
        write!(f, "{}{}", EXTERNAL_VERIFICATION_PREFIX, system)
      }
      AutomationHandler::Named(name) => f.write_str(name),
    }
  }
}

impl Serialize for AutomationHandler {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for AutomationHandler {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(AutomationHandler::from_wire(&raw))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_external_verification() {
    let handler: AutomationHandler = "external_verification:sis".parse().unwrap();
    assert_eq!(
      handler,
      AutomationHandler::ExternalVerification {
        system: "sis".to_string()
      }
    );
    assert!(handler.is_external_verification());
  }

  #[test]
  fn test_parse_named_handler() {
    let handler: AutomationHandler = "send_welcome_email".parse().unwrap();
    assert_eq!(
      handler,
      AutomationHandler::Named("send_welcome_email".to_string())
    );
    assert!(!handler.is_external_verification());
  }

  #[test]
  fn test_serializes_back_to_exact_string() {
    for raw in ["external_verification:registrar", "notify_owner"] {
      let handler: AutomationHandler = raw.parse().unwrap();
      assert_eq!(serde_json::to_value(&handler).unwrap(), serde_json::json!(raw));
    }
  }
}
