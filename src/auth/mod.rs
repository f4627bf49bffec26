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

pub mod middleware;

/// The authenticated caller of an operation, as resolved by the auth provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: Thing,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Thing, role: Role) -> Self {
        Self { id, role }
    }
}

impl From<&Account> for Actor {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id().clone(),
            role: *account.role(),
        }
    }
}

/// Owners and elevated actors may mutate a task, nobody else.
pub fn can_mutate(actor: &Actor, task: &Task) -> bool {
    actor.role.is_elevated() || task.owner().as_ref().is_some_and(|owner| owner.eq(&actor.id))
}

pub trait Authorize {
    fn authorize(&self, task: &Task) -> Result<()>;
}

impl Authorize for Actor {
    fn authorize(&self, task: &Task) -> Result<()> {
        if can_mutate(self, task) {
            Ok(())
        } else {
            Err(ApplicationError::Unauthorized)
        }
    }
}
