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
use surrealdb::sql::Thing;

pub mod calendar;
pub mod extractor;
pub mod group;
pub mod notification;
pub mod task;

/// Parses a path id of the given table, accepting `table:key` or the bare key.
pub(crate) fn record(table: &str, raw: &str) -> Result<Thing> {
    Id::try_from((table, raw)).map(|id| id.to_thing())
}
