use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::SessionId;
use crate::model::mongodb::Coll;

/// ID of the global session ID counter.
pub const SESSION_ID_COUNTER_ID: &str = "session_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: i64,
}

impl Counter {
    /// Create a new `Counter` with the given ID, starting at the given value.
    pub fn new(id: impl Into<String>, start: i64) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<i64> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter with ID {}", id),
                )
            })?;
        Ok(counter.next)
    }

    /// Mint a fresh session ID.
    pub async fn next_session_id(counters: &Coll<Counter>) -> Result<SessionId> {
        let next = Self::next(counters, SESSION_ID_COUNTER_ID).await?;
        SessionId::try_from(next).map_err(|_| {
            Error::Status(
                Status::InternalServerError,
                format!("Session ID counter overflowed: {}", next),
            )
        })
    }
}

/// Ensure the global session ID counter exists, creating it if necessary.
///
/// The upsert makes this safe to run from concurrently launching instances.
pub async fn ensure_session_id_counter_exists(
    counters: &Coll<Counter>,
) -> std::result::Result<(), DbError> {
    let options = UpdateOptions::builder().upsert(true).build();
    counters
        .update_one(
            doc! { "_id": SESSION_ID_COUNTER_ID },
            doc! { "$setOnInsert": { "next": 1_i64 } },
            options,
        )
        .await?;
    Ok(())
}
