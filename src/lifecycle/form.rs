//! Form status machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{Result, SurveyError};

/// Form status; every state has an outbound edge so admins can always reverse a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Paused,
    Closed,
    Archived,
}

impl FormStatus {
    pub const ALL: [FormStatus; 5] = [
        FormStatus::Draft,
        FormStatus::Published,
        FormStatus::Paused,
        FormStatus::Closed,
        FormStatus::Archived,
    ];

    /// Legal targets from this state
    pub fn allowed_targets(&self) -> &'static [FormStatus] {
        match self {
            FormStatus::Draft => &[FormStatus::Published, FormStatus::Closed],
            FormStatus::Published => &[FormStatus::Closed, FormStatus::Paused],
            FormStatus::Paused => &[FormStatus::Published, FormStatus::Closed],
            FormStatus::Closed => &[FormStatus::Published, FormStatus::Paused],
            FormStatus::Archived => &[FormStatus::Published],
        }
    }

    pub fn can_transition_to(&self, target: FormStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Validate a move; never clamps to a nearby state
    pub fn transition(self, target: FormStatus) -> Result<FormStatus> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(SurveyError::InvalidTransition {
                entity: "form",
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Whether respondents may answer
    pub fn accepts_responses(&self) -> bool {
        matches!(self, FormStatus::Published)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Draft => "DRAFT",
            FormStatus::Published => "PUBLISHED",
            FormStatus::Paused => "PAUSED",
            FormStatus::Closed => "CLOSED",
            FormStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormStatus {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self> {
        FormStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SurveyError::invalid_field("status", format!("unknown form status '{}'", s)))
    }
}
