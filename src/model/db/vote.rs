use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::SessionId;
use crate::model::mongodb::Id;

/// Core vote data: one fingerprint backing one participant for one question.
///
/// Unique per `(session, question, voter_fingerprint)`, enforced both by an
/// application-level check (for the friendly rejection message) and by a
/// unique index (so a racing duplicate can never persist).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub session: SessionId,
    pub question: Id,
    pub participant: Id,
    pub voter_fingerprint: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

/// A vote without an ID.
pub type NewVote = VoteCore;

impl NewVote {
    pub fn new(session: SessionId, question: Id, participant: Id, voter_fingerprint: String) -> Self {
        Self {
            session,
            question,
            participant,
            voter_fingerprint,
            cast_at: Utc::now(),
        }
    }
}

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
