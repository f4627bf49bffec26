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

//! Decides on which calendar days a task is due and projects those days over a date range.
//!
//! Everything in here is pure: no store access and no clock, so projections can be
//! computed per task or per date on as many workers as needed.

use crate::prelude::*;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Whether `task` is due on `date`.
///
/// Completed and archived tasks never show up. Every other task first shows up on its
/// deadline, except date ranges which cover `start_date..=deadline`. Monthly tasks fire
/// on the day-of-month of their deadline only, so a deadline on the 31st skips every
/// shorter month instead of moving to its last day.
pub fn is_active_on(task: &Task, date: NaiveDate) -> bool {
    if *task.is_archived() || *task.status() == TaskStatus::Completed {
        return false;
    }

    let deadline = *task.deadline();
    if let Frequency::DateRange = task.frequency() {
        let start = task.start_date().unwrap_or(deadline);
        return start <= date && date <= deadline;
    }

    // recurring tasks are never projected before their first deadline
    if date < deadline {
        return false;
    }

    match task.frequency() {
        Frequency::OneTime => date == deadline,
        Frequency::Daily => true,
        Frequency::Weekly => date.weekday() == deadline.weekday(),
        Frequency::WeeklyOn(weekday) => date.weekday() == *weekday,
        Frequency::Monthly => date.day() == deadline.day(),
        Frequency::DateRange | Frequency::Unrecognized(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Occurrence<'a> {
    pub date: NaiveDate,
    pub task: &'a Task,
}

/// Lazy walk over every `(date, task)` pair that is due, by date and then by task order.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    tasks: &'a [Task],
    current: Option<NaiveDate>,
    end: NaiveDate,
    index: usize,
}

impl<'a> Iterator for Occurrences<'a> {
    type Item = Occurrence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let date = self.current?;

            while let Some(task) = self.tasks.get(self.index) {
                self.index += 1;
                if is_active_on(task, date) {
                    return Some(Occurrence { date, task });
                }
            }

            self.index = 0;
            self.current = date.succ_opt().filter(|next| *next <= self.end);
        }
    }
}

/// Projects `tasks` onto every day of `start..=end`. An inverted range is empty.
pub fn project(tasks: &[Task], start: NaiveDate, end: NaiveDate) -> Occurrences<'_> {
    Occurrences {
        tasks,
        current: (start <= end).then_some(start),
        end,
        index: 0,
    }
}

pub fn group_by_date<'a, I>(occurrences: I) -> BTreeMap<NaiveDate, Vec<&'a Task>>
where
    I: IntoIterator<Item = Occurrence<'a>>,
{
    let mut grouped: BTreeMap<NaiveDate, Vec<&'a Task>> = BTreeMap::new();
    for occurrence in occurrences {
        grouped
            .entry(occurrence.date)
            .or_default()
            .push(occurrence.task);
    }

    grouped
}

/// First and last day of a month grid.
pub fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || ApplicationError::ValidationError(format!("invalid month {year}-{month}"));

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next.and_then(|next| next.pred_opt()).ok_or_else(invalid)?;

    Ok((first, last))
}
