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

use crate::auth::middleware::require_account;
use crate::notify;
use crate::prelude::*;
use crate::routes::extractor::{Json, Path, Query};
use crate::routes::record;
use axum::extract::State;
use axum::routing::{get, put};
use axum::{middleware, Extension, Router};

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route("/", get(list))
        .route("/unread", get(unread_count))
        .route("/read", put(mark_all_read))
        .route("/:id/read", put(mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_account))
        .with_state(state)
}

#[derive(Deserialize, Debug)]
pub struct ListOptions {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Query(options): Query<ListOptions>,
) -> Json<Vec<Notification>> {
    let limit = options.limit.unwrap_or(notify::DEFAULT_LIMIT);

    Json(notify::list(&actor.id, limit, state.info()).await)
}

#[derive(Serialize, Debug)]
pub struct UnreadResponse {
    unread: usize,
}

async fn unread_count(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
) -> Json<UnreadResponse> {
    Json(UnreadResponse {
        unread: notify::unread_count(&actor.id, state.info()).await,
    })
}

async fn mark_read(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
) -> Result<Json<Notification>> {
    let id = record("notification", &id)?;

    Ok(Json(notify::mark_read(&id, &actor.id, state.info()).await?))
}

#[derive(Serialize, Debug)]
pub struct MarkAllResponse {
    updated: usize,
}

async fn mark_all_read(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
) -> Result<Json<MarkAllResponse>> {
    let updated = notify::mark_all_read(&actor.id, state.info()).await?;

    Ok(Json(MarkAllResponse { updated }))
}
