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
use chrono::{DateTime, Utc};
use surrealdb::sql::Thing;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Getters)]
#[get = "pub"]
pub struct Notification {
    #[serde(serialize_with = "serialize_thing")]
    id: Thing,
    #[serde(serialize_with = "serialize_thing")]
    recipient: Thing,
    /// the task this notification was raised for
    #[serde(default, serialize_with = "serialize_optional_thing")]
    task: Option<Thing>,
    message: String,
    #[serde(default)]
    is_read: bool,
    created_at: DateTime<Utc>,
}
