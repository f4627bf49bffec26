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

use crate::database::id::{serialize_optional_thing, serialize_thing};
use crate::prelude::*;
use chrono::{DateTime, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumString};
use surrealdb::sql::Thing;

pub mod draft;
pub mod frequency;

pub use frequency::Frequency;

#[derive(
    Deserialize,
    Serialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumString,
    AsRefStr,
    Display,
    Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(
    Deserialize,
    Serialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumString,
    AsRefStr,
    Display,
    Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    Normal,
    Urgent,
}

/// Titles compare trimmed and case-insensitive.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Getters)]
#[get = "pub"]
pub struct ChecklistItem {
    pub(crate) id: String,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) completed: bool,
}

impl ChecklistItem {
    pub fn new(title: &str) -> Self {
        Self {
            id: nanoid::nanoid!(),
            title: title.trim().to_owned(),
            completed: false,
        }
    }

    pub fn has_title(&self, title: &str) -> bool {
        normalize_title(&self.title) == normalize_title(title)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Getters)]
#[get = "pub"]
pub struct Task {
    #[serde(serialize_with = "serialize_thing")]
    pub(crate) id: Thing,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) notes: String,
    #[serde(default)]
    pub(crate) priority: TaskPriority,
    #[serde(default)]
    pub(crate) status: TaskStatus,
    pub(crate) deadline: NaiveDate,
    #[serde(default)]
    pub(crate) start_date: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) frequency: Frequency,
    #[serde(default)]
    pub(crate) checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub(crate) is_archived: bool,
    #[serde(default)]
    pub(crate) is_pinned: bool,
    #[serde(default)]
    pub(crate) overdue_notified: bool,
    #[serde(default, serialize_with = "serialize_optional_thing")]
    pub(crate) owner: Option<Thing>,
    #[serde(default, serialize_with = "serialize_optional_thing")]
    pub(crate) task_group: Option<Thing>,
    #[serde(default)]
    pub(crate) revision: u64,
    pub(crate) created_at: DateTime<Utc>,
}

impl Task {
    /// An empty checklist never blocks completion.
    pub fn checklist_complete(&self) -> bool {
        self.checklist.iter().all(|item| item.completed)
    }

    #[instrument(skip(info))]
    pub async fn fetch(id: &Thing, info: &ConnectionInfo) -> Result<Task> {
        info.bounded(async {
            let task: Option<Task> = sql_span!(
                info.connection
                    .query("SELECT * FROM $task")
                    .bind(("task", id))
                    .await?
                    .take(0)?,
                "fetching task"
            );

            task.ok_or(ApplicationError::NotFound("task"))
        })
        .await
    }

    /// Lists tasks ordered by deadline. This is a read path, so store failures yield nothing.
    #[instrument(skip(info))]
    pub async fn list(filter: &TaskFilter, info: &ConnectionInfo) -> Vec<Task> {
        let mut conditions = Vec::new();
        if filter.owner.is_some() {
            conditions.push("owner = $owner");
        }
        if filter.group.is_some() {
            conditions.push("task_group = $group");
        }
        if !filter.include_archived {
            conditions.push("is_archived = false");
        }

        let query = if conditions.is_empty() {
            "SELECT * FROM task ORDER BY deadline ASC".to_owned()
        } else {
            format!(
                "SELECT * FROM task WHERE {} ORDER BY deadline ASC",
                conditions.join(" AND ")
            )
        };

        info.best_effort(
            async {
                let tasks: Vec<Task> = sql_span!(
                    info.connection
                        .query(query)
                        .bind(("owner", &filter.owner))
                        .bind(("group", &filter.group))
                        .await?
                        .take(0)?,
                    "listing tasks"
                );

                Ok(tasks)
            },
            "task list",
        )
        .await
    }

    #[cfg(test)]
    pub fn fixture(deadline: NaiveDate, frequency: Frequency) -> Task {
        Task {
            id: Thing::from(("task", nanoid::nanoid!().as_str())),
            title: "fixture".to_owned(),
            description: String::new(),
            notes: String::new(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Pending,
            deadline,
            start_date: None,
            frequency,
            checklist: Vec::new(),
            is_archived: false,
            is_pinned: false,
            overdue_notified: false,
            owner: None,
            task_group: None,
            revision: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// only tasks owned by this account
    pub owner: Option<Thing>,
    pub group: Option<Thing>,
    pub include_archived: bool,
}
