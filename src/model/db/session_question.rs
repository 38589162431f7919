use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::model::common::SessionId;
use crate::model::mongodb::Id;

/// Core session-question association data.
///
/// Unique per `(session, question)`; `question_order` defines the sequence
/// in which an admin walks through the questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuestionCore {
    pub session: SessionId,
    pub question: Id,
    pub question_order: u32,
    pub is_completed: bool,
}

/// A session-question association without an ID.
pub type NewSessionQuestion = SessionQuestionCore;

impl NewSessionQuestion {
    /// Associate a question with a session at the given position.
    pub fn new(session: SessionId, question: Id, question_order: u32) -> Self {
        Self {
            session,
            question,
            question_order,
            is_completed: false,
        }
    }
}

/// A session-question association from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuestion {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub session_question: SessionQuestionCore,
}

impl Deref for SessionQuestion {
    type Target = SessionQuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.session_question
    }
}
