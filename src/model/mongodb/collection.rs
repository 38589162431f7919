use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    admin::{Admin, NewAdmin},
    question::{NewQuestion, Question},
    session::{ActiveSessionPointer, Session},
    session_participant::{NewSessionParticipant, SessionParticipant},
    session_question::{NewSessionQuestion, SessionQuestion},
    settings::GameSettings,
    vote::{NewVote, Vote},
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Admin collections
const ADMINS: &str = "admins";
impl MongoCollection for Admin {
    const NAME: &'static str = ADMINS;
}
impl MongoCollection for NewAdmin {
    const NAME: &'static str = ADMINS;
}

// Question collections
const QUESTIONS: &str = "questions";
impl MongoCollection for Question {
    const NAME: &'static str = QUESTIONS;
}
impl MongoCollection for NewQuestion {
    const NAME: &'static str = QUESTIONS;
}

// Session collections
const SESSIONS: &str = "sessions";
impl MongoCollection for Session {
    const NAME: &'static str = SESSIONS;
}

// Session question collections
const SESSION_QUESTIONS: &str = "session_questions";
impl MongoCollection for SessionQuestion {
    const NAME: &'static str = SESSION_QUESTIONS;
}
impl MongoCollection for NewSessionQuestion {
    const NAME: &'static str = SESSION_QUESTIONS;
}

// Session participant collections
const SESSION_PARTICIPANTS: &str = "session_participants";
impl MongoCollection for SessionParticipant {
    const NAME: &'static str = SESSION_PARTICIPANTS;
}
impl MongoCollection for NewSessionParticipant {
    const NAME: &'static str = SESSION_PARTICIPANTS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Settings collection (singleton document)
const SETTINGS: &str = "settings";
impl MongoCollection for GameSettings {
    const NAME: &'static str = SETTINGS;
}

// Active session pointer collection (singleton document)
const ACTIVE_SESSION: &str = "active_session";
impl MongoCollection for ActiveSessionPointer {
    const NAME: &'static str = ACTIVE_SESSION;
}

// Counter collection
const COUNTERS: &str = "counters";
impl MongoCollection for Counter {
    const NAME: &'static str = COUNTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Admin collection.
    let admin_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique.clone())
        .build();
    Coll::<Admin>::from_db(db)
        .create_index(admin_index, None)
        .await?;

    // Session question collection.
    let session_question_index = IndexModel::builder()
        .keys(doc! {"session": 1, "question": 1})
        .options(unique.clone())
        .build();
    Coll::<SessionQuestion>::from_db(db)
        .create_index(session_question_index, None)
        .await?;

    // Session participant collection: not unique, but every lookup is per-session.
    let participant_index = IndexModel::builder()
        .keys(doc! {"session": 1, "display_order": 1})
        .build();
    Coll::<SessionParticipant>::from_db(db)
        .create_index(participant_index, None)
        .await?;

    // Vote collection. The unique index backstops the application-level
    // duplicate check: two votes with the same fingerprint for the same
    // question can never both persist, even under concurrent submissions.
    let vote_index = IndexModel::builder()
        .keys(doc! {"session": 1, "question": 1, "voter_fingerprint": 1})
        .options(unique)
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    Ok(())
}
