use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::model::common::SessionId;
use crate::model::mongodb::Id;

/// Core participant data. Participants are the votable targets, scoped to a
/// single session; the same person appearing in two sessions is two records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParticipantCore {
    pub session: SessionId,
    pub participant_name: String,
    pub team: String,
    pub display_order: u32,
}

/// A participant without an ID.
pub type NewSessionParticipant = SessionParticipantCore;

impl NewSessionParticipant {
    pub fn new(
        session: SessionId,
        participant_name: String,
        team: String,
        display_order: u32,
    ) -> Self {
        Self {
            session,
            participant_name,
            team,
            display_order,
        }
    }
}

/// A participant from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParticipant {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub participant: SessionParticipantCore,
}

impl Deref for SessionParticipant {
    type Target = SessionParticipantCore;

    fn deref(&self) -> &Self::Target {
        &self.participant
    }
}
