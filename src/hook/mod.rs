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

use crate::database::definitions::task::draft::parse_date;
use crate::prelude::*;
use crate::routes::extractor::Json;
use crate::server::Config;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;

pub mod overdue;

#[derive(Debug, Deserialize, Clone)]
pub struct HookRequest {
    token: String,
    /// overrides the current date, used to replay a missed day
    #[serde(default)]
    today: Option<String>,
}

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route("/sweep", post(sweep))
        .with_state(state)
}

/// The daily trigger. A report with failures answers with an error status so the scheduler
/// retries, the tasks that succeeded stay flagged.
pub async fn sweep(
    State(state): State<ApplicationState>,
    Json(data): Json<HookRequest>,
) -> Result<Response> {
    // authorize the request
    authorize_request(data.token.as_str(), state.config())?;

    let today = match data.today.as_deref() {
        Some(raw) => parse_date(raw, "today")?,
        None => Utc::now().date_naive(),
    };
    let report = overdue::sweep(today, state.info()).await?;

    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(report)).into_response())
}

#[instrument(skip_all)]
pub fn authorize_request(token: &str, config: &Config) -> Result<()> {
    match config.cron_secret.as_deref() {
        Some(secret) if !secret.is_empty() && secret.eq(token) => Ok(()),
        _ => Err(ApplicationError::Unauthorized),
    }
}
