use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    ClientSession,
};
use serde::{Deserialize, Serialize};

use crate::model::common::{QuestionSpec, Tracks};
use crate::model::mongodb::{Coll, Id};

/// Core question data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCore {
    /// Question text, unique by convention (imports skip duplicates).
    pub question_text: String,
    /// Global active flag, independent of any session's current question.
    pub is_active: bool,
    /// Track applicability flags.
    #[serde(flatten)]
    pub tracks: Tracks,
    /// Creation time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A question without an ID.
pub type NewQuestion = QuestionCore;

/// A question from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl From<QuestionSpec> for NewQuestion {
    fn from(spec: QuestionSpec) -> Self {
        Self {
            question_text: spec.question_text,
            is_active: spec.is_active,
            tracks: spec.tracks,
            created_at: Utc::now(),
        }
    }
}

fn other_active_questions(keep: Id) -> Document {
    doc! {
        "_id": { "$ne": keep },
        "is_active": true,
    }
}

fn clear_active_flag() -> Document {
    doc! {
        "$set": { "is_active": false }
    }
}

/// Clear the active flag on every question except the given one.
///
/// At most one question system-wide may be flagged active; this sweep runs
/// after every insert or update of an active question.
pub async fn deactivate_other_questions(
    questions: &Coll<Question>,
    keep: Id,
) -> Result<(), DbError> {
    questions
        .update_many(other_active_questions(keep), clear_active_flag(), None)
        .await?;
    Ok(())
}

/// Transactional variant of [`deactivate_other_questions`].
pub async fn deactivate_other_questions_with_session(
    questions: &Coll<Question>,
    keep: Id,
    txn: &mut ClientSession,
) -> Result<(), DbError> {
    questions
        .update_many_with_session(other_active_questions(keep), clear_active_flag(), None, txn)
        .await?;
    Ok(())
}
