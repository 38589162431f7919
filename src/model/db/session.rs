use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::{bson::doc, error::Error as DbError, options::UpdateOptions};
use serde::{Deserialize, Serialize};

use crate::model::common::{SessionId, SessionState};
use crate::model::mongodb::{opt_chrono_datetime_as_bson_datetime, Coll, Id};

/// Grace period after the voting deadline during which votes are still
/// accepted, absorbing client clock skew and request latency.
pub const VOTE_GRACE_PERIOD_SECONDS: i64 = 3;

/// A voting session: a named event with an ordered set of questions and a
/// roster of votable participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique numeric ID, allocated from the global counter.
    #[serde(rename = "_id")]
    pub id: SessionId,
    /// Human-readable session name.
    pub session_name: String,
    /// Which team group this session is aimed at.
    pub team_group: String,
    /// Free-form description.
    pub description: String,
    /// Lifecycle state.
    pub status: SessionState,
    /// The question currently open for voting, if any.
    pub current_question: Option<Id>,
    /// When the current question was activated.
    #[serde(with = "opt_chrono_datetime_as_bson_datetime")]
    pub question_start_time: Option<DateTime<Utc>>,
    /// When voting on the current question closes.
    #[serde(with = "opt_chrono_datetime_as_bson_datetime")]
    pub voting_deadline: Option<DateTime<Utc>>,
    /// Creation time, used to order the admin session listing.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new draft session with no questions activated yet.
    pub fn new(
        id: SessionId,
        session_name: String,
        team_group: String,
        description: String,
    ) -> Self {
        Self {
            id,
            session_name,
            team_group,
            description,
            status: SessionState::Draft,
            current_question: None,
            question_start_time: None,
            voting_deadline: None,
            created_at: Utc::now(),
        }
    }

    /// Is voting currently open for the current question?
    pub fn is_voting_open(&self) -> bool {
        match (self.current_question, self.voting_deadline) {
            (Some(_), Some(deadline)) => Utc::now() <= deadline,
            _ => false,
        }
    }

    /// Is voting still accepted, i.e. within the deadline plus grace period?
    pub fn accepts_votes_at(&self, now: DateTime<Utc>) -> bool {
        match self.voting_deadline {
            Some(deadline) => now <= deadline + Duration::seconds(VOTE_GRACE_PERIOD_SECONDS),
            // No deadline stamped: the question stays open indefinitely.
            None => true,
        }
    }

    /// Seconds left until the voting deadline, clamped at zero.
    pub fn time_remaining(&self) -> i64 {
        self.voting_deadline
            .map(|deadline| (deadline - Utc::now()).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// ID of the singleton active-session pointer document.
pub const ACTIVE_SESSION_POINTER_ID: &str = "active_session";

/// The single source of truth for which session is Active.
///
/// Replaces the original table-wide "mark everything else Completed" sweep:
/// starting a session is a compare-and-set on this one document, so two
/// concurrent starts cannot leave two Active sessions behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionPointer {
    #[serde(rename = "_id")]
    pub id: String,
    /// The currently Active session, if any.
    pub session: Option<SessionId>,
}

impl ActiveSessionPointer {
    /// A filter document matching the pointer.
    pub fn filter() -> mongodb::bson::Document {
        doc! { "_id": ACTIVE_SESSION_POINTER_ID }
    }
}

/// Ensure the active-session pointer exists, creating an empty one if necessary.
///
/// The upsert makes this safe to run from concurrently launching instances.
pub async fn ensure_active_pointer_exists(
    pointers: &Coll<ActiveSessionPointer>,
) -> Result<(), DbError> {
    let options = UpdateOptions::builder().upsert(true).build();
    pointers
        .update_one(
            ActiveSessionPointer::filter(),
            doc! { "$setOnInsert": { "session": null } },
            options,
        )
        .await?;
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Session {
        pub fn example(id: SessionId) -> Self {
            Self::new(
                id,
                "Backend & Security & DevOps Team Session".to_string(),
                "Backend Track".to_string(),
                "Team building session for Backend, Security, and DevOps teams".to_string(),
            )
        }
    }
}
