use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::api::id::ApiId;
use crate::model::common::{SessionId, SessionState, Tracks};
use crate::model::db::question::Question;
use crate::model::db::session::Session;
use crate::model::db::session_participant::SessionParticipant;

/// One row of the admin session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub session_name: String,
    pub team_group: String,
    pub status: SessionState,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            session_name: session.session_name,
            team_group: session.team_group,
            status: session.status,
            created_at: session.created_at,
        }
    }
}

/// The Active session as seen by polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    pub id: SessionId,
    pub session_name: String,
    pub current_question: Option<ApiId>,
    pub question_start_time: Option<DateTime<Utc>>,
    pub voting_deadline: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionDescription {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            session_name: session.session_name.clone(),
            current_question: session.current_question.map(Into::into),
            question_start_time: session.question_start_time,
            voting_deadline: session.voting_deadline,
        }
    }
}

/// A question as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDescription {
    pub id: ApiId,
    pub question_text: String,
}

impl From<&Question> for QuestionDescription {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.into(),
            question_text: question.question_text.clone(),
        }
    }
}

/// A participant as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDescription {
    pub id: ApiId,
    pub participant_name: String,
    pub team: String,
    pub display_order: u32,
}

impl From<&SessionParticipant> for ParticipantDescription {
    fn from(participant: &SessionParticipant) -> Self {
        Self {
            id: participant.id.into(),
            participant_name: participant.participant_name.clone(),
            team: participant.team.clone(),
            display_order: participant.display_order,
        }
    }
}

/// Payload of `GET /game/active`.
#[derive(Debug, Serialize)]
pub struct ActiveSessionPayload {
    pub session: SessionDescription,
    pub question: Option<QuestionDescription>,
    pub participants: Vec<ParticipantDescription>,
    pub time_remaining: i64,
    pub voting_open: bool,
}

/// One tally row: a participant and its vote count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyRow {
    pub id: ApiId,
    pub participant_name: String,
    pub team: String,
    pub vote_count: u64,
}

/// Payload of `GET /game/results`.
#[derive(Debug, Serialize)]
pub struct ResultsPayload {
    pub session: SessionDescription,
    pub question: Option<QuestionDescription>,
    pub results: Vec<TallyRow>,
    pub total_votes: u64,
}

/// Payload of `GET /game/results/cumulative`.
#[derive(Debug, Serialize)]
pub struct CumulativeResultsPayload {
    pub session: SessionSummary,
    pub results: Vec<TallyRow>,
    pub total_votes: u64,
    /// Number of distinct questions that received at least one vote.
    pub questions_count: u64,
}

/// Body of `POST /game/vote`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoteRequest {
    pub participant: ApiId,
}

/// Payload of `GET /game/vote/status`.
#[derive(Debug, Serialize)]
pub struct VoteStatusPayload {
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_participant: Option<ApiId>,
}

/// A participant in a session creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSpec {
    pub name: String,
    pub team: String,
}

/// Body of `POST /sessions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub session_name: String,
    pub team_group: String,
    #[serde(default)]
    pub description: String,
    /// Names of questions from the settings blob, in activation order.
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantSpec>,
}

/// Payload of `POST /sessions`.
#[derive(Debug, Serialize)]
pub struct CreateSessionPayload {
    pub session_id: SessionId,
}

/// One row of `GET /sessions/<id>/questions`: the association joined with
/// its question text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionQuestionDescription {
    pub id: ApiId,
    pub question_id: ApiId,
    pub question_text: String,
    pub question_order: u32,
    pub is_completed: bool,
}

/// Payload of `POST /sessions/<id>/questions/<qid>/activate`.
#[derive(Debug, Serialize)]
pub struct ActivateQuestionPayload {
    pub question_id: ApiId,
    pub timer_seconds: u32,
    pub voting_deadline: DateTime<Utc>,
}

/// Payload of `POST /questions/import`.
#[derive(Debug, Serialize)]
pub struct ImportQuestionsPayload {
    pub imported: u64,
    pub skipped: u64,
}

/// One question in an import payload. Unlike the settings blob, import files
/// carry no short name and default every flag to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionImportSpec {
    #[serde(default)]
    pub question_text: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub for_leadership_track: bool,
    #[serde(default = "default_true")]
    pub for_backend_track: bool,
    #[serde(default = "default_true")]
    pub for_frontend_track: bool,
    #[serde(default = "default_true")]
    pub for_custom_sessions: bool,
}

fn default_true() -> bool {
    true
}

impl QuestionImportSpec {
    pub fn tracks(&self) -> Tracks {
        Tracks {
            for_leadership_track: self.for_leadership_track,
            for_backend_track: self.for_backend_track,
            for_frontend_track: self.for_frontend_track,
            for_custom_sessions: self.for_custom_sessions,
        }
    }
}
