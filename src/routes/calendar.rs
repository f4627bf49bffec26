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
use crate::database::definitions::task::draft::parse_date;
use crate::lifecycle;
use crate::occurrence::{group_by_date, month_range, project};
use crate::prelude::*;
use crate::routes::extractor::{Json, Query};
use crate::routes::record;
use axum::extract::State;
use axum::routing::get;
use axum::{middleware, Extension, Router};
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Longest range a single calendar request may span.
const MAX_RANGE_DAYS: i64 = 366;

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route("/", get(calendar))
        .layer(middleware::from_fn_with_state(state.clone(), require_account))
        .with_state(state)
}

#[derive(Deserialize, Debug, Default)]
pub struct CalendarOptions {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    month: Option<u32>,
    #[serde(default)]
    mine: bool,
    #[serde(default)]
    group: Option<String>,
}

impl CalendarOptions {
    /// An explicit range wins over a month, without either the current month is shown.
    fn range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let (start, end) = match (self.from.as_deref(), self.to.as_deref()) {
            (Some(from), Some(to)) => (parse_date(from, "from")?, parse_date(to, "to")?),
            (None, None) => month_range(
                self.year.unwrap_or(today.year()),
                self.month.unwrap_or(today.month()),
            )?,
            _ => {
                return Err(ApplicationError::ValidationError(
                    "from and to must be given together".to_owned(),
                ))
            }
        };

        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(ApplicationError::ValidationError(format!(
                "the range exceeds {MAX_RANGE_DAYS} days"
            )));
        }

        Ok((start, end))
    }
}

async fn calendar(
    Extension(actor): Extension<Actor>,
    State(state): State<ApplicationState>,
    Query(options): Query<CalendarOptions>,
) -> Result<Json<BTreeMap<NaiveDate, Vec<Task>>>> {
    let (start, end) = options.range(Utc::now().date_naive())?;
    let group = options
        .group
        .as_deref()
        .map(|raw| record("task_group", raw))
        .transpose()?;
    let tasks =
        lifecycle::list_tasks(&actor, false, options.mine, group.as_ref(), state.info()).await;

    let grouped = group_by_date(project(&tasks, start, end))
        .into_iter()
        .map(|(date, tasks)| (date, tasks.into_iter().cloned().collect()))
        .collect();

    Ok(Json(grouped))
}
