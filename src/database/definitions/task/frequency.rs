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

use crate::prelude::*;
use chrono::Weekday;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// How often a task comes due again after its first deadline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    OneTime,
    Daily,
    /// every week on the weekday of the deadline
    Weekly,
    /// every week on a fixed weekday
    WeeklyOn(Weekday),
    /// every month on the day-of-month of the deadline
    Monthly,
    /// every day from the start date up to the deadline
    DateRange,
    /// stored value this version does not understand, never active
    Unrecognized(String),
}

/// Sunday = 0 .. Saturday = 6
pub fn weekday_from_sunday(number: u32) -> Option<Weekday> {
    match number {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Exactly one ASCII digit, no sign and no padding.
fn single_digit(raw: &str) -> Option<u32> {
    match raw.as_bytes() {
        [digit @ b'0'..=b'9'] => Some(u32::from(digit - b'0')),
        _ => None,
    }
}

impl From<&str> for Frequency {
    fn from(raw: &str) -> Self {
        match raw {
            "" | "one_time" => Frequency::OneTime,
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            // legacy spelling of weekly_1
            "monday" => Frequency::WeeklyOn(Weekday::Mon),
            "monthly" => Frequency::Monthly,
            "date_range" => Frequency::DateRange,
            other => other
                .strip_prefix("weekly_")
                .and_then(single_digit)
                .and_then(weekday_from_sunday)
                .map(Frequency::WeeklyOn)
                .unwrap_or_else(|| Frequency::Unrecognized(other.to_owned())),
        }
    }
}

impl Frequency {
    /// Parses user input, rejecting values the evaluator would never match.
    pub fn parse(raw: &str) -> Result<Frequency> {
        match Frequency::from(raw.trim()) {
            Frequency::Unrecognized(value) => Err(ApplicationError::ValidationError(format!(
                "unknown frequency {value:?}"
            ))),
            frequency => Ok(frequency),
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::OneTime => write!(f, "one_time"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::WeeklyOn(weekday) => {
                write!(f, "weekly_{}", weekday.num_days_from_sunday())
            }
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::DateRange => write!(f, "date_range"),
            Frequency::Unrecognized(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // rows written before the column existed carry no frequency at all
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Frequency::from).unwrap_or_default())
    }
}
