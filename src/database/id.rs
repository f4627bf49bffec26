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

use crate::error::ApplicationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use surrealdb::sql::Thing;

/// A record id as it travels over the http surface, `table:key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub table: String,
    pub id: String,
}

impl From<Thing> for Id {
    fn from(thing: Thing) -> Self {
        Self {
            table: thing.tb,
            id: thing.id.to_raw(),
        }
    }
}

impl From<&Thing> for Id {
    fn from(thing: &Thing) -> Self {
        Self {
            table: thing.tb.clone(),
            id: thing.id.to_raw(),
        }
    }
}

impl TryFrom<(&str, &str)> for Id {
    type Error = ApplicationError;

    /// Parses either `table:key` or a bare `key`. The table is forced, so an id of
    /// another table is never accepted.
    fn try_from((force, id): (&str, &str)) -> Result<Self, Self::Error> {
        let invalid = || ApplicationError::ValidationError(format!("invalid {force} id"));

        let key = match id.split_once(':') {
            Some((table, key)) if table.eq(force) => key,
            Some(_) => return Err(invalid()),
            None => id,
        };
        if key.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            table: force.to_string(),
            id: key.to_string(),
        })
    }
}

impl Id {
    pub fn new((table, id): (&str, &str)) -> Self {
        Self {
            table: table.to_string(),
            id: id.to_string(),
        }
    }

    pub fn to_thing(&self) -> Thing {
        Thing::from((self.table.as_str(), self.id.as_str()))
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", &self.table, &self.id)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let (table, id) = raw
            .split_once(':')
            .ok_or_else(|| <D::Error as serde::de::Error>::custom("Invalid id format"))?;

        Ok(Self::new((table, id)))
    }
}

/// Serializes a record id as `table:key` for http responses.
pub fn serialize_thing<S>(thing: &Thing, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Id::from(thing).serialize(serializer)
}

pub fn serialize_optional_thing<S>(thing: &Option<Thing>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    thing.as_ref().map(Id::from).serialize(serializer)
}
