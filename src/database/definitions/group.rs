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
use chrono::{DateTime, Utc};
use surrealdb::sql::Thing;

const NAME_LIMIT: usize = 255;
const DESCRIPTION_LIMIT: usize = 1000;
const COLOR_LIMIT: usize = 20;
pub const DEFAULT_COLOR: &str = "#0f766e";

/// A named bucket tasks can be sorted into.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Getters)]
#[get = "pub"]
pub struct TaskGroup {
    #[serde(serialize_with = "serialize_thing")]
    pub(crate) id: Thing,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) color: Option<String>,
    #[serde(default, serialize_with = "serialize_optional_thing")]
    pub(crate) created_by: Option<Thing>,
    pub(crate) created_at: DateTime<Utc>,
}

impl TaskGroup {
    #[instrument(skip(info))]
    pub async fn fetch(id: &Thing, info: &ConnectionInfo) -> Result<Option<TaskGroup>> {
        info.bounded(async {
            let group: Option<TaskGroup> = sql_span!(
                info.connection
                    .query("SELECT * FROM $group")
                    .bind(("group", id))
                    .await?
                    .take(0)?,
                "fetching task group"
            );

            Ok(group)
        })
        .await
    }

    /// Newest first. Store failures yield nothing.
    #[instrument(skip(info))]
    pub async fn list(info: &ConnectionInfo) -> Vec<TaskGroup> {
        info.best_effort(
            async {
                let groups: Vec<TaskGroup> = sql_span!(
                    info.connection
                        .query("SELECT * FROM task_group ORDER BY created_at DESC")
                        .await?
                        .take(0)?,
                    "listing task groups"
                );

                Ok(groups)
            },
            "task group list",
        )
        .await
    }

    #[instrument(skip(info))]
    pub async fn count(info: &ConnectionInfo) -> usize {
        info.best_effort(
            async {
                let count: Option<usize> = sql_span!(
                    info.connection
                        .query("SELECT count() FROM task_group GROUP ALL")
                        .await?
                        .take((0, "count"))?,
                    "counting task groups"
                );

                Ok(count.unwrap_or_default())
            },
            "task group count",
        )
        .await
    }
}

/// A task group as submitted by a client.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct GroupDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ValidGroup {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Blank optional text counts as missing.
fn optional(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

impl GroupDraft {
    /// `fallback_color` fills in a missing color, new groups get the default one.
    pub fn validate(self, fallback_color: Option<&str>) -> Result<ValidGroup> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApplicationError::ValidationError(
                "the group name is required".to_owned(),
            ));
        }
        if name.chars().count() > NAME_LIMIT {
            return Err(ApplicationError::ValidationError(format!(
                "the group name exceeds {NAME_LIMIT} characters"
            )));
        }

        let description = optional(self.description);
        if description
            .as_ref()
            .is_some_and(|description| description.chars().count() > DESCRIPTION_LIMIT)
        {
            return Err(ApplicationError::ValidationError(format!(
                "the group description exceeds {DESCRIPTION_LIMIT} characters"
            )));
        }

        let color = optional(self.color).or(fallback_color.map(str::to_owned));
        if color
            .as_ref()
            .is_some_and(|color| color.chars().count() > COLOR_LIMIT)
        {
            return Err(ApplicationError::ValidationError(format!(
                "the group color exceeds {COLOR_LIMIT} characters"
            )));
        }

        Ok(ValidGroup {
            name: name.to_owned(),
            description,
            color,
        })
    }
}
