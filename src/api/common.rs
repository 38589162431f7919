use mongodb::{bson::doc, options::FindOptions};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::SessionId,
    db::session::{ActiveSessionPointer, Session},
    db::session_participant::SessionParticipant,
    mongodb::{session_id_filter, Coll},
};

/// Resolve the currently active session via the pointer document.
pub async fn active_session(
    pointers: &Coll<ActiveSessionPointer>,
    sessions: &Coll<Session>,
) -> Result<Option<Session>> {
    let pointer = pointers.find_one(ActiveSessionPointer::filter(), None).await?;
    match pointer.and_then(|pointer| pointer.session) {
        Some(session_id) => Ok(sessions.find_one(session_id_filter(session_id), None).await?),
        None => Ok(None),
    }
}

/// Look up a session by ID, or fail with the canonical not-found message.
pub async fn session_by_id(sessions: &Coll<Session>, session_id: SessionId) -> Result<Session> {
    sessions
        .find_one(session_id_filter(session_id), None)
        .await?
        .ok_or_else(|| Error::not_found("Session not found"))
}

/// All participants of a session, in display order with names breaking ties.
pub async fn session_participants(
    participants: &Coll<SessionParticipant>,
    session_id: SessionId,
) -> Result<Vec<SessionParticipant>> {
    let filter = doc! { "session": i64::from(session_id) };
    let options = FindOptions::builder()
        .sort(doc! { "display_order": 1, "participant_name": 1 })
        .build();
    Ok(participants.find(filter, options).await?.try_collect().await?)
}
