use mongodb::{
    bson::{doc, to_bson},
    error::Error as DbError,
    options::UpdateOptions,
};
use serde::{Deserialize, Serialize};

use crate::model::common::{QuestionSpec, Tracks};
use crate::model::mongodb::Coll;

/// ID of the singleton settings document.
pub const GAME_SETTINGS_ID: &str = "game_settings";

/// Fallback timer length when none is configured.
pub const DEFAULT_VOTING_TIMER_SECONDS: u32 = 30;

/// Global game settings: the question blob sessions are provisioned from,
/// plus the per-question voting timer length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(rename = "_id")]
    pub id: String,
    /// Available questions, keyed by short name.
    pub questions: Vec<QuestionSpec>,
    /// Timer length applied when a question is activated.
    pub voting_timer_seconds: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            id: GAME_SETTINGS_ID.to_string(),
            questions: Vec::new(),
            voting_timer_seconds: DEFAULT_VOTING_TIMER_SECONDS,
        }
    }
}

impl GameSettings {
    /// Load the settings document, falling back to defaults if missing.
    pub async fn load(settings: &Coll<GameSettings>) -> Result<Self, DbError> {
        Ok(settings
            .find_one(doc! { "_id": GAME_SETTINGS_ID }, None)
            .await?
            .unwrap_or_default())
    }

    /// The questions available for provisioning sessions. Serves a built-in
    /// sample set when the blob is empty, so a fresh deployment is playable.
    pub fn available_questions(&self) -> Vec<QuestionSpec> {
        if self.questions.is_empty() {
            sample_questions()
        } else {
            self.questions.clone()
        }
    }
}

/// Built-in sample questions, served when the settings blob is empty.
pub fn sample_questions() -> Vec<QuestionSpec> {
    vec![
        QuestionSpec {
            name: "Q1".to_string(),
            question_text: "Who is most likely to work late?".to_string(),
            is_active: true,
            tracks: Tracks {
                for_leadership_track: true,
                for_backend_track: true,
                for_frontend_track: false,
                for_custom_sessions: false,
            },
        },
        QuestionSpec {
            name: "Q2".to_string(),
            question_text: "Who is most likely to debug on weekends?".to_string(),
            is_active: false,
            tracks: Tracks {
                for_leadership_track: false,
                for_backend_track: true,
                for_frontend_track: true,
                for_custom_sessions: false,
            },
        },
    ]
}

/// Ensure the settings singleton exists, creating a default one if necessary.
pub async fn ensure_settings_exist(settings: &Coll<GameSettings>) -> Result<(), DbError> {
    let defaults = GameSettings::default();
    let options = UpdateOptions::builder().upsert(true).build();
    settings
        .update_one(
            doc! { "_id": GAME_SETTINGS_ID },
            doc! { "$setOnInsert": {
                "questions": to_bson(&defaults.questions).expect("Serialisation is infallible"),
                "voting_timer_seconds": defaults.voting_timer_seconds,
            } },
            options,
        )
        .await?;
    Ok(())
}
