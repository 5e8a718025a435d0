//! Typed input validation
//!
//! Request bodies deserialize into plain structs and are then checked by an
//! explicit `validate()` that collects every problem into a field-level list.

use serde::{Deserialize, Serialize};

use crate::types::{Result, SurveyError};

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted/indexed path of the offending field, e.g. `questions[2].options`
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Input types that can check themselves
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Accumulates field errors and turns them into [`SurveyError::InvalidInput`]
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error unless `ok` holds
    pub fn check(&mut self, ok: bool, field: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
    }

    /// Record an error for a blank string
    pub fn non_blank(&mut self, value: &str, field: impl Into<String>) {
        self.check(!value.trim().is_empty(), field, "must not be empty");
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SurveyError::InvalidInput(self.errors))
        }
    }
}
