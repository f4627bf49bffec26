/*
 *     Copyright (C) 2023  Fritz Ochsmann
 *
 *     This program is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU Affero General Public License as published
 *     by the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     This program is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU Affero General Public License for more details.
 *
 *     You should have received a copy of the GNU Affero General Public License
 *     along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("The task still has incomplete checklist items")]
    ChecklistIncomplete,
    #[error("A checklist item with this title already exists")]
    DuplicateTitle,
    #[error("{0}")]
    ValidationError(String),
    #[error("The task was modified concurrently")]
    Conflict,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    ConfigError(#[from] envy::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    SendError(#[from] kanal::SendError),
    #[error("Internal error occurred")]
    InternalServerError,
}

impl From<surrealdb::Error> for ApplicationError {
    fn from(error: surrealdb::Error) -> Self {
        Self::StoreUnavailable(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ApplicationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::StoreUnavailable(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApplicationError>;

macro_rules! log_test_error {
    ($error:expr) => {
        #[cfg(test)]
        {
            println!("Err: {:?}", $error.to_string());
        }
    };
}

impl ApplicationError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApplicationError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApplicationError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApplicationError::NotFound(_) => StatusCode::NOT_FOUND,
            ApplicationError::ChecklistIncomplete | ApplicationError::DuplicateTitle => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApplicationError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApplicationError::Conflict => StatusCode::CONFLICT,
            ApplicationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Err: {}", self.to_string());

            #[cfg(test)]
            {
                println!("Err: {:?}", self.to_string());
            }
        } else {
            log_test_error!(self);
        }

        match self {
            ApplicationError::InternalServerError
            | ApplicationError::ConfigError(_)
            | ApplicationError::IoError(_)
            | ApplicationError::SendError(_) => (
                status,
                Json(json!({"error": "Error occurred while processing the request"})),
            ),
            _ => (status, Json(json!({ "error": self.to_string() }))),
        }
        .into_response()
    }
}
