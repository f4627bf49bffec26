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

use crate::database::definitions::task::{normalize_title, ChecklistItem, Frequency, TaskPriority};
use crate::prelude::*;
use chrono::NaiveDate;
use std::collections::HashSet;
use surrealdb::sql::Thing;

const TITLE_LIMIT: usize = 255;
const DESCRIPTION_LIMIT: usize = 2000;

/// Parses a calendar date. A full ISO timestamp is accepted and cut to its date.
pub fn parse_date(raw: &str, field: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let date = raw.split('T').next().unwrap_or(raw);

    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ApplicationError::ValidationError(format!("{field} is not a valid date")))
}

/// The editable part of a task as submitted by a client.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub owner: Option<Id>,
    #[serde(default)]
    pub group: Option<Id>,
    pub deadline: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// initial checklist titles
    #[serde(default)]
    pub checklist: Vec<String>,
}

/// A draft that passed validation, ready to be written.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ValidDraft {
    pub title: String,
    pub description: String,
    pub notes: String,
    pub owner: Option<Thing>,
    pub task_group: Option<Thing>,
    pub deadline: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub frequency: Frequency,
    pub priority: TaskPriority,
    pub checklist: Vec<ChecklistItem>,
}

impl TaskDraft {
    pub fn validate(self) -> Result<ValidDraft> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ApplicationError::ValidationError(
                "the title is required".to_owned(),
            ));
        }
        if title.chars().count() > TITLE_LIMIT {
            return Err(ApplicationError::ValidationError(format!(
                "the title exceeds {TITLE_LIMIT} characters"
            )));
        }
        if self.description.chars().count() > DESCRIPTION_LIMIT {
            return Err(ApplicationError::ValidationError(format!(
                "the description exceeds {DESCRIPTION_LIMIT} characters"
            )));
        }

        let owner = self
            .owner
            .map(|id| Id::try_from(("account", id.to_string().as_str())))
            .transpose()?
            .map(|id| id.to_thing());
        let task_group = self
            .group
            .map(|id| Id::try_from(("task_group", id.to_string().as_str())))
            .transpose()?
            .map(|id| id.to_thing());
        let frequency = match self.frequency.as_deref() {
            Some(raw) => Frequency::parse(raw)?,
            None => Frequency::OneTime,
        };
        let deadline = parse_date(&self.deadline, "deadline")?;

        // the start date only has a meaning for ranges
        let start_date = if frequency == Frequency::DateRange {
            let start = self
                .start_date
                .as_deref()
                .filter(|raw| !raw.trim().is_empty())
                .ok_or(ApplicationError::ValidationError(
                    "a date range requires a start date".to_owned(),
                ))
                .and_then(|raw| parse_date(raw, "startDate"))?;
            if start > deadline {
                return Err(ApplicationError::ValidationError(
                    "the start date lies after the deadline".to_owned(),
                ));
            }

            Some(start)
        } else {
            None
        };

        let mut seen = HashSet::new();
        let checklist = self
            .checklist
            .iter()
            .filter(|title| !title.trim().is_empty())
            .filter(|title| seen.insert(normalize_title(title)))
            .map(|title| ChecklistItem::new(title))
            .collect();

        Ok(ValidDraft {
            title: title.to_owned(),
            description: self.description,
            notes: self.notes,
            owner,
            task_group,
            deadline,
            start_date,
            frequency,
            priority: self.priority,
            checklist,
        })
    }
}
