//! Plain shared types, used by both the DB and API layers.

use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Unique numeric session ID, allocated from the global counter.
pub type SessionId = u32;

/// States in the session lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Under construction, not yet open for voting.
    Draft,
    /// The one session currently running. At most one exists system-wide.
    Active,
    /// Finished, either explicitly or because another session was started.
    Completed,
}

impl From<SessionState> for Bson {
    fn from(state: SessionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::Completed => "Completed",
        };
        write!(f, "{}", name)
    }
}

/// Which team tracks a question applies to.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracks {
    #[serde(default)]
    pub for_leadership_track: bool,
    #[serde(default)]
    pub for_backend_track: bool,
    #[serde(default)]
    pub for_frontend_track: bool,
    #[serde(default)]
    pub for_custom_sessions: bool,
}

impl Tracks {
    /// Does this question apply to the given track?
    pub fn includes(&self, track: Track) -> bool {
        match track {
            Track::Leadership => self.for_leadership_track,
            Track::Backend => self.for_backend_track,
            Track::Frontend => self.for_frontend_track,
            Track::Custom => self.for_custom_sessions,
        }
    }
}

/// A single team track.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Track {
    Leadership,
    Backend,
    Frontend,
    Custom,
}

impl Track {
    /// Human-readable track name, used as the session `team_group`.
    pub fn group_name(&self) -> &'static str {
        match self {
            Self::Leadership => "Leadership Track",
            Self::Backend => "Backend Track",
            Self::Frontend => "Frontend Track",
            Self::Custom => "Custom Track",
        }
    }
}

/// A question as described in the settings blob or an import payload.
///
/// The original deployment kept these as a JSON blob in the settings
/// document, keyed by a short name like `Q1`; sessions are provisioned by
/// picking names from this list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Short unique name within the blob.
    pub name: String,
    /// Question text.
    pub question_text: String,
    /// Whether the materialised question starts out flagged active.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Track applicability flags.
    #[serde(flatten)]
    pub tracks: Tracks,
}

fn default_active() -> bool {
    true
}
