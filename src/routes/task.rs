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
use crate::database::definitions::task::draft::TaskDraft;
use crate::lifecycle::{self, StatusChange};
use crate::prelude::*;
use crate::routes::extractor::{Json, Path, Query};
use crate::routes::record;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{middleware, Extension, Router};
use chrono::Utc;
use surrealdb::sql::Thing;

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/bulk/archive", post(bulk_archive))
        .route("/bulk/delete", post(bulk_delete))
        .route("/:id", put(update_task).delete(delete_task))
        .route("/:id/status", put(set_status))
        .route("/:id/notes", put(set_notes))
        .route("/:id/archive", put(archive))
        .route("/:id/restore", put(restore))
        .route("/:id/pin", put(pin))
        .route("/:id/checklist", post(add_item))
        .route("/:id/checklist/:item", put(toggle_item).delete(remove_item))
        .layer(middleware::from_fn_with_state(state.clone(), require_account))
        .with_state(state)
}

#[derive(Deserialize, Debug, Default)]
pub struct ListOptions {
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    mine: bool,
    #[serde(default)]
    group: Option<String>,
}

async fn list_tasks(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Query(options): Query<ListOptions>,
) -> Result<Json<Vec<Task>>> {
    let group = options
        .group
        .as_deref()
        .map(|raw| record("task_group", raw))
        .transpose()?;

    Ok(Json(
        lifecycle::list_tasks(
            &actor,
            options.archived,
            options.mine,
            group.as_ref(),
            state.info(),
        )
        .await,
    ))
}

async fn create_task(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Json(data): Json<TaskDraft>,
) -> Result<(StatusCode, Json<Task>)> {
    let task = lifecycle::create(data, &actor, state.info()).await?;

    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<TaskDraft>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;
    let today = Utc::now().date_naive();

    Ok(Json(
        lifecycle::update(&id, data, &actor, today, state.info()).await?,
    ))
}

async fn delete_task(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    lifecycle::delete(&record("task", &id)?, &actor, state.info()).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Debug)]
pub struct StatusRequest {
    status: TaskStatus,
}

async fn set_status(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<StatusRequest>,
) -> Result<Json<StatusChange>> {
    let id = record("task", &id)?;

    Ok(Json(
        lifecycle::set_status(&id, data.status, &actor, state.info()).await?,
    ))
}

#[derive(Deserialize, Debug)]
pub struct NotesRequest {
    notes: String,
}

async fn set_notes(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<NotesRequest>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(
        lifecycle::set_notes(&id, &data.notes, &actor, state.info()).await?,
    ))
}

async fn archive(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(lifecycle::archive(&id, &actor, state.info()).await?))
}

async fn restore(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(lifecycle::restore(&id, &actor, state.info()).await?))
}

#[derive(Deserialize, Debug)]
pub struct PinRequest {
    pinned: bool,
}

async fn pin(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<PinRequest>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(
        lifecycle::pin(&id, data.pinned, &actor, state.info()).await?,
    ))
}

#[derive(Deserialize, Debug)]
pub struct ChecklistItemRequest {
    title: String,
}

async fn add_item(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path(id): Path<String>,
    Json(data): Json<ChecklistItemRequest>,
) -> Result<(StatusCode, Json<Task>)> {
    let id = record("task", &id)?;
    let task = lifecycle::add_checklist_item(&id, &data.title, &actor, state.info()).await?;

    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Deserialize, Debug)]
pub struct ToggleRequest {
    completed: bool,
}

async fn toggle_item(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path((id, item)): Path<(String, String)>,
    Json(data): Json<ToggleRequest>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(
        lifecycle::toggle_checklist_item(&id, &item, data.completed, &actor, state.info())
            .await?,
    ))
}

async fn remove_item(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Path((id, item)): Path<(String, String)>,
) -> Result<Json<Task>> {
    let id = record("task", &id)?;

    Ok(Json(
        lifecycle::remove_checklist_item(&id, &item, &actor, state.info()).await?,
    ))
}

#[derive(Deserialize, Debug)]
pub struct BulkRequest {
    ids: Vec<Id>,
}

impl BulkRequest {
    fn records(&self) -> Result<Vec<Thing>> {
        self.ids
            .iter()
            .map(|id| record("task", id.to_string().as_str()))
            .collect()
    }
}

#[derive(Serialize, Debug)]
pub struct BulkResponse {
    affected: usize,
}

async fn bulk_archive(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Json(data): Json<BulkRequest>,
) -> Result<Json<BulkResponse>> {
    let affected = lifecycle::bulk_archive(&data.records()?, &actor, state.info()).await?;

    Ok(Json(BulkResponse { affected }))
}

async fn bulk_delete(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Json(data): Json<BulkRequest>,
) -> Result<Json<BulkResponse>> {
    let affected = lifecycle::bulk_delete(&data.records()?, &actor, state.info()).await?;

    Ok(Json(BulkResponse { affected }))
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::tests::{draft, TestSuite};
    use axum::http::StatusCode;

    fn url(task: &Task, suffix: &str) -> String {
        format!("/task/{}{}", Id::from(task.id()), suffix)
    }

    #[tokio::test]
    async fn test_requires_account() -> Result<()> {
        let suite = TestSuite::init().await?;

        let response = suite.client().get("/task").send().await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());

        let response = suite
            .client()
            .get("/task")
            .header("x-account", "account:unknown")
            .send()
            .await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());

        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_list() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;

        let response = suite
            .post(&editor, "/task")
            .json(&json!({
                "title": "Inventario",
                "deadline": "2024-03-01T00:00:00.000Z",
                "frequency": "weekly_1",
                "checklist": ["count", "COUNT", "sign"]
            }))
            .send()
            .await;
        assert_eq!(StatusCode::CREATED, response.status());

        let task = response.json::<serde_json::Value>().await;
        assert_eq!(json!("2024-03-01"), task["deadline"]);
        assert_eq!(json!("weekly_1"), task["frequency"]);
        assert_eq!(json!(Id::from(editor.id()).to_string()), task["owner"]);
        assert_eq!(2, task["checklist"].as_array().unwrap().len());

        let response = suite.get(&editor, "/task").send().await;
        assert_eq!(StatusCode::OK, response.status());
        let tasks = response.json::<serde_json::Value>().await;
        assert_eq!(1, tasks.as_array().unwrap().len());

        let response = suite
            .post(&editor, "/task")
            .json(&json!({
                "title": "   ",
                "deadline": "2024-03-01"
            }))
            .send()
            .await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        Ok(())
    }

    #[tokio::test]
    async fn test_status_errors() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let viewer = suite.account("viewer", Role::Viewer).await?;

        let mut input = draft("Inventario", "2024-03-01");
        input.checklist = vec!["count".to_owned()];
        let task = suite.task(&editor, input).await?;

        let response = suite
            .put(&editor, url(&task, "/status").as_str())
            .json(&json!({ "status": "completed" }))
            .send()
            .await;
        assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, response.status());
        let body = response.json::<serde_json::Value>().await;
        assert!(body["error"].is_string());

        let response = suite
            .put(&viewer, url(&task, "/status").as_str())
            .json(&json!({ "status": "in_progress" }))
            .send()
            .await;
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());

        let response = suite
            .put(&editor, "/task/task:missing/status")
            .json(&json!({ "status": "in_progress" }))
            .send()
            .await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());

        let response = suite
            .put(&editor, url(&task, "/status").as_str())
            .json(&json!({ "status": "finished" }))
            .send()
            .await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        Ok(())
    }

    #[tokio::test]
    async fn test_checklist_routes() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let task = suite.task(&admin, draft("Inventario", "2024-03-01")).await?;

        let response = suite
            .post(&admin, url(&task, "/checklist").as_str())
            .json(&json!({ "title": "count" }))
            .send()
            .await;
        assert_eq!(StatusCode::CREATED, response.status());
        let body = response.json::<serde_json::Value>().await;
        let item = body["checklist"][0]["id"].as_str().unwrap().to_owned();

        let response = suite
            .post(&admin, url(&task, "/checklist").as_str())
            .json(&json!({ "title": "COUNT " }))
            .send()
            .await;
        assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, response.status());

        let response = suite
            .put(&admin, url(&task, &format!("/checklist/{item}")).as_str())
            .json(&json!({ "completed": true }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());

        let response = suite
            .put(&admin, url(&task, "/status").as_str())
            .json(&json!({ "status": "completed" }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(json!("completed"), body["task"]["status"]);
        assert_eq!(1, body["notifications"]["created"].as_array().unwrap().len());

        Ok(())
    }

    #[tokio::test]
    async fn test_flags_and_bulk() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let first = suite.task(&editor, draft("first", "2024-03-01")).await?;
        let second = suite.task(&editor, draft("second", "2024-03-02")).await?;

        let response = suite
            .put(&editor, url(&first, "/pin").as_str())
            .json(&json!({ "pinned": true }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(json!(true), body["is_pinned"]);

        let response = suite
            .put(&editor, url(&first, "/notes").as_str())
            .json(&json!({ "notes": "call before noon" }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());

        let response = suite
            .post(&editor, "/task/bulk/archive")
            .json(&json!({
                "ids": [Id::from(first.id()), Id::from(second.id())]
            }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(json!(2), body["affected"]);

        let response = suite.get(&editor, "/task").send().await;
        let body = response.json::<serde_json::Value>().await;
        assert!(body.as_array().unwrap().is_empty());

        let response = suite.get(&editor, "/task?archived=true").send().await;
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(2, body.as_array().unwrap().len());
        assert_eq!(json!("call before noon"), body[0]["notes"]);

        let response = suite
            .put(&editor, url(&second, "/restore").as_str())
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());

        let response = suite
            .post(&editor, "/task/bulk/delete")
            .json(&json!({
                "ids": [Id::from(first.id()), Id::from(second.id())]
            }))
            .send()
            .await;
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(json!(2), body["affected"]);
        assert!(Task::fetch(second.id(), suite.info()).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_update_route() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let task = suite.task(&editor, draft("first", "2024-03-01")).await?;

        let response = suite
            .put(&editor, url(&task, "").as_str())
            .json(&json!({
                "title": "renamed",
                "deadline": "2024-03-10",
                "startDate": "2024-03-05",
                "frequency": "date_range",
                "priority": "urgent"
            }))
            .send()
            .await;
        assert_eq!(StatusCode::OK, response.status());
        let body = response.json::<serde_json::Value>().await;
        assert_eq!(json!("renamed"), body["title"]);
        assert_eq!(json!("2024-03-05"), body["start_date"]);
        assert_eq!(json!("urgent"), body["priority"]);

        let response = suite
            .put(&editor, url(&task, "").as_str())
            .json(&json!({
                "title": "renamed",
                "deadline": "2024-03-10",
                "frequency": "fortnightly"
            }))
            .send()
            .await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        Ok(())
    }
}
