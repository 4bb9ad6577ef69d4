use std::fmt::Display;
use thiserror::Error;

/// Everything that can stop or degrade a generation pass.
#[derive(Debug, Error)]
pub enum GenError {
  #[error("duplicate object id {id} (minted for {kind})")]
  DuplicateId { id: String, kind: &'static str },

  #[error("object {id} references unknown object (attribute {attr})")]
  DanglingRef { id: String, attr: String },

  #[error("target {from} depends on unknown target {to}")]
  UnknownDependency { from: String, to: String },

  #[error("target {target} is linkable but has no sources in any known language")]
  NoLinkerLanguage { target: String },

  #[error("{file}: language override conflicts with its classification ({reason})")]
  BadLanguageOverride { file: String, reason: String },

  #[error("{0}")]
  Io(#[from] std::io::Error)
}

/// Accumulates problems across a generation pass. Fatal conditions abort via
/// `Err`; input and degraded conditions are recorded here so one pass reports
/// everything it can.
#[derive(Default)]
pub struct Diagnostics {
  input:    Vec<String>,
  degraded: Vec<String>
}

impl Diagnostics {
  pub fn new() -> Self {
    Diagnostics::default()
  }

  pub fn input(&mut self, e: impl Display) {
    tracing::error!("{}", e);
    self.input.push(e.to_string());
  }

  pub fn degraded(&mut self, msg: impl Display) {
    tracing::warn!("{}", msg);
    self.degraded.push(msg.to_string());
  }

  pub fn has_input_errors(&self) -> bool {
    !self.input.is_empty()
  }

  pub fn input_errors(&self) -> &'_ [String] {
    &self.input
  }

  pub fn degraded_conditions(&self) -> &'_ [String] {
    &self.degraded
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn input_errors_accumulate() {
    let mut d = Diagnostics::new();
    assert!(!d.has_input_errors());

    d.input(GenError::BadLanguageOverride {
      file:   "src/app.h".to_string(),
      reason: "header-only file".to_string()
    });
    d.degraded("mixed debug flags");

    assert!(d.has_input_errors());
    assert_eq!(d.input_errors().len(), 1);
    assert_eq!(d.degraded_conditions(), &["mixed debug flags".to_string()]);
  }
}
