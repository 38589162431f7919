use jsonwebtoken::errors::Error as JwtError;
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request, Response,
};
use thiserror::Error;

use crate::model::api::response::Envelope;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status(Status::NotFound, message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Status(Status::Unauthorized, message.into())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    /// Convert any error into the uniform envelope `{success: false, message}`.
    ///
    /// Internal failures are logged here and surface only as a generic
    /// message; they never reach the caller raw.
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let (status, message) = match self {
            Self::Db(ref err) => {
                error!("Database error while handling {}: {err}", req.uri());
                (
                    Status::InternalServerError,
                    "An internal error occurred".to_string(),
                )
            }
            Self::Jwt(ref err) => {
                error!("JWT error while handling {}: {err}", req.uri());
                (
                    Status::InternalServerError,
                    "An internal error occurred".to_string(),
                )
            }
            Self::Status(status, message) => (status, message),
        };

        let body = Json(Envelope::<()>::rejected(message)).respond_to(req)?;
        Ok(Response::build_from(body).status(status).finalize())
    }
}
