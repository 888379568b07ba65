use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::{bson::ser::Error as BsonError, error::Error as DbError};
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::serde_json::Error as JsonError,
    Request,
};
use thiserror::Error;

use crate::model::id::IdError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error("Already voted: {0}")]
    AlreadyVoted(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, msg.into())
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            // JWTs are only decoded by the auth guard, which forwards on failure.
            Self::Db(_)
            | Self::Bson(_)
            | Self::Json(_)
            | Self::Jwt(_)
            | Self::Argon2(_)
            | Self::Store(_) => Status::InternalServerError,
            Self::Id(_) => Status::BadRequest,
            Self::AlreadyVoted(_) => Status::Conflict,
            Self::NotFound(_) => Status::NotFound,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        (status, self.to_string()).respond_to(req)
    }
}
