//! Form document schema
//!
//! A form is an ordered list of questions plus its lifecycle status.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::ticket::AnswerValue;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::lifecycle::FormStatus;
use crate::scoring::MAX_SCORE;

/// Collection name for forms
pub const FORM_COLLECTION: &str = "forms";

/// Kind of question and its answer constraints
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// 0-10 recommendation score
    Nps,
    Text,
    SingleChoice { options: Vec<String> },
    MultiChoice { options: Vec<String> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl Question {
    /// Check an answer against this question's constraints
    pub fn check_answer(&self, value: &AnswerValue) -> Result<(), String> {
        match (&self.kind, value) {
            (QuestionKind::Nps, AnswerValue::Number(n)) => {
                if (0..=MAX_SCORE).contains(n) {
                    Ok(())
                } else {
                    Err(format!("score must be between 0 and {}", MAX_SCORE))
                }
            }
            (QuestionKind::Nps, _) => Err("expected a number".to_string()),
            (QuestionKind::Text, AnswerValue::Text(_)) => Ok(()),
            (QuestionKind::Text, _) => Err("expected text".to_string()),
            (QuestionKind::SingleChoice { options }, AnswerValue::Text(choice)) => {
                if options.contains(choice) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of the options", choice))
                }
            }
            (QuestionKind::SingleChoice { .. }, _) => Err("expected a single option".to_string()),
            (QuestionKind::MultiChoice { options }, AnswerValue::Choices(choices)) => {
                match choices.iter().find(|c| !options.contains(c)) {
                    Some(bad) => Err(format!("'{}' is not one of the options", bad)),
                    None => Ok(()),
                }
            }
            (QuestionKind::MultiChoice { .. }, _) => Err("expected a list of options".to_string()),
        }
    }

    /// Whether a value counts as "answered" for required-question checks
    pub fn is_answered(value: Option<&AnswerValue>) -> bool {
        match value {
            None => false,
            Some(AnswerValue::Text(t)) => !t.trim().is_empty(),
            Some(AnswerValue::Choices(c)) => !c.is_empty(),
            Some(AnswerValue::Number(_)) => true,
        }
    }
}

/// Form document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FormDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: FormStatus,

    pub questions: Vec<Question>,

    /// User who created the form
    pub owner_id: String,
}

impl FormDoc {
    /// Create a new form in DRAFT
    pub fn new(title: String, description: Option<String>, questions: Vec<Question>, owner_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            title,
            description,
            status: FormStatus::Draft,
            questions,
            owner_id,
        }
    }

    /// The question whose answers feed the NPS report
    pub fn nps_question(&self) -> Option<&Question> {
        self.questions
            .iter()
            .find(|q| matches!(q.kind, QuestionKind::Nps))
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

impl IntoIndexes for FormDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
            (
                doc! { "owner_id": 1 },
                Some(IndexOptions::builder().name("owner_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for FormDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(options: &[&str]) -> Question {
        Question {
            id: "q".into(),
            prompt: "Pick".into(),
            kind: QuestionKind::SingleChoice {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            required: true,
        }
    }

    #[test]
    fn test_nps_answer_range() {
        let q = Question {
            id: "nps".into(),
            prompt: "How likely?".into(),
            kind: QuestionKind::Nps,
            required: true,
        };
        assert!(q.check_answer(&AnswerValue::Number(0)).is_ok());
        assert!(q.check_answer(&AnswerValue::Number(10)).is_ok());
        assert!(q.check_answer(&AnswerValue::Number(11)).is_err());
        assert!(q.check_answer(&AnswerValue::Number(-1)).is_err());
        assert!(q.check_answer(&AnswerValue::Text("9".into())).is_err());
    }

    #[test]
    fn test_choice_membership() {
        let q = choice(&["red", "blue"]);
        assert!(q.check_answer(&AnswerValue::Text("red".into())).is_ok());
        assert!(q.check_answer(&AnswerValue::Text("green".into())).is_err());
    }

    #[test]
    fn test_question_json_shape() {
        let json = r#"{"id":"q1","prompt":"Why?","type":"text"}"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind, QuestionKind::Text);
        assert!(q.required);

        let json = r#"{"id":"q2","prompt":"Pick","type":"multi_choice","options":["a","b"],"required":false}"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert!(matches!(q.kind, QuestionKind::MultiChoice { ref options } if options.len() == 2));
    }

    #[test]
    fn test_new_form_is_draft() {
        let form = FormDoc::new("Q3 pulse".into(), None, vec![], "owner".into());
        assert_eq!(form.status, FormStatus::Draft);
        assert!(form.nps_question().is_none());
    }
}
