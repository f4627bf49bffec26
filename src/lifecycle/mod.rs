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

//! Task mutations. Each operation loads the task, checks the actor against it and commits
//! through a single conditional update guarded by the task revision.

use crate::database::definitions::group::TaskGroup;
use crate::database::definitions::task::draft::TaskDraft;
use crate::database::definitions::task::{TaskFilter, TaskPriority};
use crate::notify::{self, Event, FanOutReport};
use crate::prelude::*;
use chrono::NaiveDate;
use std::future::Future;
use surrealdb::sql::Thing;

pub mod group;

/// The fields a mutation touches. Unset fields are left as stored.
#[derive(Serialize, Debug, Default)]
struct Changes<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency: Option<&'a Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<Option<&'a Thing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_group: Option<Option<&'a Thing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checklist: Option<&'a [ChecklistItem]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overdue_notified: Option<bool>,
    revision: u64,
}

/// Writes the changes if nobody committed since `task` was loaded.
async fn commit(task: &Task, changes: Changes<'_>, info: &ConnectionInfo) -> Result<Task> {
    let changes = Changes {
        revision: task.revision + 1,
        ..changes
    };

    info.bounded(async {
        let mut updated: Vec<Task> = sql_span!(
            info.connection
                .query("UPDATE $task MERGE $changes WHERE revision = $revision")
                .bind(("task", &task.id))
                .bind(("changes", &changes))
                .bind(("revision", task.revision))
                .await?
                .take(0)?,
            "committing task"
        );

        if updated.is_empty() {
            warn!("{} changed concurrently", Id::from(&task.id));
            return Err(ApplicationError::Conflict);
        }

        Ok(updated.remove(0))
    })
    .await
}

/// Loads the task and fails unless the actor may mutate it.
async fn load(id: &Thing, actor: &Actor, info: &ConnectionInfo) -> Result<Task> {
    let task = Task::fetch(id, info).await?;
    actor.authorize(&task)?;

    Ok(task)
}

#[derive(Debug, Clone, Serialize, Getters)]
#[get = "pub"]
pub struct StatusChange {
    task: Task,
    /// present if the change completed the task
    #[serde(skip_serializing_if = "Option::is_none")]
    notifications: Option<FanOutReport>,
}

#[instrument(skip(info))]
pub async fn set_status(
    id: &Thing,
    status: TaskStatus,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<StatusChange> {
    let task = load(id, actor, info).await?;
    if task.status == status {
        return Ok(StatusChange {
            task,
            notifications: None,
        });
    }
    if status == TaskStatus::Completed && !task.checklist_complete() {
        return Err(ApplicationError::ChecklistIncomplete);
    }

    let task = commit(
        &task,
        Changes {
            status: Some(status),
            ..Default::default()
        },
        info,
    )
    .await?;
    info!("{} is now {}", Id::from(task.id()), status);

    if status != TaskStatus::Completed {
        return Ok(StatusChange {
            task,
            notifications: None,
        });
    }

    // the status change stands even if nobody could be notified
    let event = Event::TaskCompleted {
        task: task.id.clone(),
        title: task.title.clone(),
    };
    let report = match notify::notify_all(&event, info).await {
        Ok(report) => report,
        Err(error) => {
            error!(
                "Unable to resolve recipients for {}: {}",
                Id::from(task.id()),
                error
            );
            FanOutReport::unresolved(error)
        }
    };
    if !report.is_complete() {
        warn!("{} completion notifications failed", report.failed().len());
    }

    Ok(StatusChange {
        task,
        notifications: Some(report),
    })
}

/// A completed task with open work is in progress again.
fn reopened(task: &Task, checklist: &[ChecklistItem]) -> Option<TaskStatus> {
    let open = checklist.iter().any(|item| !item.completed);
    (task.status == TaskStatus::Completed && open).then_some(TaskStatus::InProgress)
}

#[instrument(skip(info))]
pub async fn toggle_checklist_item(
    id: &Thing,
    item: &str,
    completed: bool,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<Task> {
    let task = load(id, actor, info).await?;

    let mut checklist = task.checklist.clone();
    let entry = checklist
        .iter_mut()
        .find(|entry| entry.id == item)
        .ok_or(ApplicationError::NotFound("checklist item"))?;
    if entry.completed == completed {
        return Ok(task);
    }
    entry.completed = completed;

    commit(
        &task,
        Changes {
            status: reopened(&task, &checklist),
            checklist: Some(&checklist),
            ..Default::default()
        },
        info,
    )
    .await
}

#[instrument(skip(info))]
pub async fn add_checklist_item(
    id: &Thing,
    title: &str,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<Task> {
    if title.trim().is_empty() {
        return Err(ApplicationError::ValidationError(
            "the item title is required".to_owned(),
        ));
    }

    let task = load(id, actor, info).await?;
    if task.checklist.iter().any(|entry| entry.has_title(title)) {
        return Err(ApplicationError::DuplicateTitle);
    }

    let mut checklist = task.checklist.clone();
    checklist.push(ChecklistItem::new(title));

    commit(
        &task,
        Changes {
            status: reopened(&task, &checklist),
            checklist: Some(&checklist),
            ..Default::default()
        },
        info,
    )
    .await
}

#[instrument(skip(info))]
pub async fn remove_checklist_item(
    id: &Thing,
    item: &str,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<Task> {
    let task = load(id, actor, info).await?;
    if !task.checklist.iter().any(|entry| entry.id == item) {
        return Err(ApplicationError::NotFound("checklist item"));
    }

    let checklist: Vec<ChecklistItem> = task
        .checklist
        .iter()
        .filter(|entry| entry.id != item)
        .cloned()
        .collect();

    commit(
        &task,
        Changes {
            checklist: Some(&checklist),
            ..Default::default()
        },
        info,
    )
    .await
}

async fn set_archived(task: Task, archived: bool, info: &ConnectionInfo) -> Result<Task> {
    if task.is_archived == archived {
        return Ok(task);
    }

    commit(
        &task,
        Changes {
            is_archived: Some(archived),
            ..Default::default()
        },
        info,
    )
    .await
}

/// Hides the task from the calendar and the sweep. Nothing is dropped.
#[instrument(skip(info))]
pub async fn archive(id: &Thing, actor: &Actor, info: &ConnectionInfo) -> Result<Task> {
    set_archived(load(id, actor, info).await?, true, info).await
}

#[instrument(skip(info))]
pub async fn restore(id: &Thing, actor: &Actor, info: &ConnectionInfo) -> Result<Task> {
    set_archived(load(id, actor, info).await?, false, info).await
}

#[instrument(skip(info))]
pub async fn pin(id: &Thing, pinned: bool, actor: &Actor, info: &ConnectionInfo) -> Result<Task> {
    let task = load(id, actor, info).await?;
    if task.is_pinned == pinned {
        return Ok(task);
    }

    commit(
        &task,
        Changes {
            is_pinned: Some(pinned),
            ..Default::default()
        },
        info,
    )
    .await
}

#[instrument(skip(info, notes))]
pub async fn set_notes(
    id: &Thing,
    notes: &str,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<Task> {
    let task = load(id, actor, info).await?;

    commit(
        &task,
        Changes {
            notes: Some(notes),
            ..Default::default()
        },
        info,
    )
    .await
}

#[instrument(skip(info))]
pub async fn delete(id: &Thing, actor: &Actor, info: &ConnectionInfo) -> Result<()> {
    let task = load(id, actor, info).await?;

    info.bounded(async {
        let deleted: Vec<Task> = sql_span!(
            info.connection
                .query("DELETE $task WHERE revision = $revision RETURN BEFORE")
                .bind(("task", &task.id))
                .bind(("revision", task.revision))
                .await?
                .take(0)?,
            "deleting task"
        );

        if deleted.is_empty() {
            return Err(ApplicationError::Conflict);
        }
        info!("Deleted {}", Id::from(task.id()));

        Ok(())
    })
    .await
}

/// A task may only be sorted into a group that exists.
async fn ensure_group(group: Option<&Thing>, info: &ConnectionInfo) -> Result<()> {
    let Some(group) = group else {
        return Ok(());
    };
    if TaskGroup::fetch(group, info).await?.is_none() {
        return Err(ApplicationError::ValidationError(format!(
            "unknown task group {}",
            Id::from(group)
        )));
    }

    Ok(())
}

/// Creates a task. Non-elevated actors always own what they create.
#[instrument(skip(info))]
pub async fn create(draft: TaskDraft, actor: &Actor, info: &ConnectionInfo) -> Result<Task> {
    let mut draft = draft.validate()?;
    if !actor.role.is_elevated() {
        draft.owner = Some(actor.id.clone());
    }
    ensure_group(draft.task_group.as_ref(), info).await?;

    info.bounded(async {
        let task: Option<Task> = sql_span!(
            info.connection
                .query("CREATE task CONTENT $content")
                .bind(("content", &draft))
                .await?
                .take(0)?,
            "creating task"
        );

        let task = task.ok_or(ApplicationError::InternalServerError)?;
        info!("Created {}", Id::from(task.id()));

        Ok(task)
    })
    .await
}

/// Replaces the editable fields. The checklist keeps its own operations and is left as is.
/// Moving the deadline to today or later starts a new overdue period.
#[instrument(skip(info))]
pub async fn update(
    id: &Thing,
    draft: TaskDraft,
    actor: &Actor,
    today: NaiveDate,
    info: &ConnectionInfo,
) -> Result<Task> {
    let draft = draft.validate()?;
    let task = load(id, actor, info).await?;
    ensure_group(draft.task_group.as_ref(), info).await?;

    let owner = if actor.role.is_elevated() {
        draft.owner.as_ref()
    } else {
        task.owner.as_ref()
    };
    let reset = draft.deadline != task.deadline && draft.deadline >= today;

    commit(
        &task,
        Changes {
            title: Some(&draft.title),
            description: Some(&draft.description),
            notes: Some(&draft.notes),
            priority: Some(draft.priority),
            deadline: Some(draft.deadline),
            start_date: Some(draft.start_date),
            frequency: Some(&draft.frequency),
            owner: Some(owner),
            task_group: Some(draft.task_group.as_ref()),
            overdue_notified: reset.then_some(false),
            ..Default::default()
        },
        info,
    )
    .await
}

/// Runs `operation` on every listed task. Missing tasks and tasks the actor may not mutate
/// are skipped, the result counts the tasks that actually changed.
async fn bulk<'a, F, Fut>(ids: &'a [Thing], operation: F) -> Result<usize>
where
    F: Fn(&'a Thing) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut affected = 0;
    for id in ids {
        match operation(id).await {
            Ok(true) => affected += 1,
            Ok(false) => {}
            Err(ApplicationError::NotFound(_) | ApplicationError::Unauthorized) => {
                debug!("Skipping {}", Id::from(id));
            }
            Err(error) => return Err(error),
        }
    }

    Ok(affected)
}

#[instrument(skip(info))]
pub async fn bulk_archive(ids: &[Thing], actor: &Actor, info: &ConnectionInfo) -> Result<usize> {
    bulk(ids, |id| async move {
        let task = load(id, actor, info).await?;
        let archived = !task.is_archived;
        set_archived(task, true, info).await?;

        Ok(archived)
    })
    .await
}

#[instrument(skip(info))]
pub async fn bulk_delete(ids: &[Thing], actor: &Actor, info: &ConnectionInfo) -> Result<usize> {
    bulk(ids, |id| async move {
        delete(id, actor, info).await?;

        Ok(true)
    })
    .await
}

/// Pinned tasks first, then by deadline. Only elevated actors see tasks of others, for
/// everybody else `mine_only` is implied.
#[instrument(skip(info))]
pub async fn list_tasks(
    actor: &Actor,
    include_archived: bool,
    mine_only: bool,
    group: Option<&Thing>,
    info: &ConnectionInfo,
) -> Vec<Task> {
    let mine_only = mine_only || !actor.role.is_elevated();
    let filter = TaskFilter {
        owner: mine_only.then(|| actor.id.clone()),
        group: group.cloned(),
        include_archived,
    };

    let mut tasks = Task::list(&filter, info).await;
    tasks.sort_by_key(|task| !task.is_pinned);
    tasks
}
