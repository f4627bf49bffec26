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
use crate::database::definitions::group::{GroupDraft, TaskGroup};
use crate::lifecycle::group;
use crate::prelude::*;
use crate::routes::extractor::{Json, Path};
use crate::routes::record;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{middleware, Extension, Router};

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/count", get(count))
        .route("/:id", put(update).delete(delete))
        .layer(middleware::from_fn_with_state(state.clone(), require_account))
        .with_state(state)
}

async fn list(State(state): State<ApplicationState>) -> Json<Vec<TaskGroup>> {
    Json(group::list_groups(state.info()).await)
}

#[derive(Serialize, Debug)]
pub struct CountResponse {
    count: usize,
}

async fn count(State(state): State<ApplicationState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: group::count_groups(state.info()).await,
    })
}

async fn create(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Json(data): Json<GroupDraft>,
) -> Result<(StatusCode, Json<TaskGroup>)> {
    let created = group::create_group(data, &actor, state.info()).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<GroupDraft>,
) -> Result<Json<TaskGroup>> {
    let id = record("task_group", &id)?;

    Ok(Json(
        group::update_group(&id, data, &actor, state.info()).await?,
    ))
}

async fn delete(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    group::delete_group(&record("task_group", &id)?, &actor, state.info()).await?;

    Ok(StatusCode::NO_CONTENT)
}
