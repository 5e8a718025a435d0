//! Response ticket status machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Result, SurveyError};

/// Status of a response ticket
///
/// PENDING is where batch-issued tickets start, IN_PROGRESS where public-link
/// tickets start. COMPLETED and ABANDONED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Abandoned,
}

impl ResponseStatus {
    pub const ALL: [ResponseStatus; 4] = [
        ResponseStatus::Pending,
        ResponseStatus::InProgress,
        ResponseStatus::Completed,
        ResponseStatus::Abandoned,
    ];

    pub fn allowed_targets(&self) -> &'static [ResponseStatus] {
        match self {
            // Opening the link, or submitting straight away
            ResponseStatus::Pending => &[ResponseStatus::InProgress, ResponseStatus::Completed],
            ResponseStatus::InProgress => &[ResponseStatus::Completed, ResponseStatus::Abandoned],
            ResponseStatus::Completed | ResponseStatus::Abandoned => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Validate a move. Anything out of a terminal state is a `Conflict`.
    pub fn transition(self, target: ResponseStatus) -> Result<ResponseStatus> {
        if self.is_terminal() {
            return Err(SurveyError::Conflict(format!(
                "response is already {}",
                self.as_str().to_lowercase()
            )));
        }
        if self.allowed_targets().contains(&target) {
            Ok(target)
        } else {
            Err(SurveyError::InvalidTransition {
                entity: "response",
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "PENDING",
            ResponseStatus::InProgress => "IN_PROGRESS",
            ResponseStatus::Completed => "COMPLETED",
            ResponseStatus::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
