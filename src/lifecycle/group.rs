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

//! Task groups. Admins and editors manage them, everybody may read them.

use crate::database::definitions::group::{GroupDraft, TaskGroup, DEFAULT_COLOR};
use crate::prelude::*;
use surrealdb::sql::Thing;

fn ensure_manager(actor: &Actor) -> Result<()> {
    if actor.role.manages_groups() {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden(
            "only admins and editors manage task groups".to_owned(),
        ))
    }
}

#[derive(Serialize)]
struct NewGroup<'a> {
    name: &'a str,
    description: Option<&'a str>,
    color: Option<&'a str>,
    created_by: &'a Thing,
}

#[instrument(skip(info))]
pub async fn create_group(
    draft: GroupDraft,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<TaskGroup> {
    ensure_manager(actor)?;
    let group = draft.validate(Some(DEFAULT_COLOR))?;

    info.bounded(async {
        let created: Option<TaskGroup> = sql_span!(
            info.connection
                .query("CREATE task_group CONTENT $content")
                .bind((
                    "content",
                    NewGroup {
                        name: &group.name,
                        description: group.description.as_deref(),
                        color: group.color.as_deref(),
                        created_by: &actor.id,
                    },
                ))
                .await?
                .take(0)?,
            "creating task group"
        );

        let created = created.ok_or(ApplicationError::InternalServerError)?;
        info!("Created {}", Id::from(created.id()));

        Ok(created)
    })
    .await
}

/// Replaces name, description and color. A blank color clears it.
#[instrument(skip(info))]
pub async fn update_group(
    id: &Thing,
    draft: GroupDraft,
    actor: &Actor,
    info: &ConnectionInfo,
) -> Result<TaskGroup> {
    ensure_manager(actor)?;
    let group = draft.validate(None)?;
    if TaskGroup::fetch(id, info).await?.is_none() {
        return Err(ApplicationError::NotFound("task group"));
    }

    info.bounded(async {
        let updated: Option<TaskGroup> = sql_span!(
            info.connection
                .query(
                    "UPDATE $group SET name = $content.name, \
                     description = $content.description, color = $content.color",
                )
                .bind(("group", id))
                .bind(("content", &group))
                .await?
                .take(0)?,
            "updating task group"
        );

        updated.ok_or(ApplicationError::NotFound("task group"))
    })
    .await
}

/// Deletes the group. Its tasks stay and lose their group in the same transaction.
#[instrument(skip(info))]
pub async fn delete_group(id: &Thing, actor: &Actor, info: &ConnectionInfo) -> Result<()> {
    ensure_manager(actor)?;
    if TaskGroup::fetch(id, info).await?.is_none() {
        return Err(ApplicationError::NotFound("task group"));
    }

    info.bounded(async {
        sql_span!(
            info.connection
                .query(
                    "BEGIN TRANSACTION;
                    UPDATE task SET task_group = NONE, revision += 1 WHERE task_group = $group;
                    DELETE $group;
                    COMMIT TRANSACTION;",
                )
                .bind(("group", id))
                .await?
                .check()?,
            "deleting task group"
        );
        info!("Deleted {}", Id::from(id));

        Ok(())
    })
    .await
}

pub async fn list_groups(info: &ConnectionInfo) -> Vec<TaskGroup> {
    TaskGroup::list(info).await
}

pub async fn count_groups(info: &ConnectionInfo) -> usize {
    TaskGroup::count(info).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::tests::{draft, TestSuite};

    fn group(name: &str) -> GroupDraft {
        GroupDraft {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_managers_write_groups() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let viewer = suite.account("viewer", Role::Viewer).await?;

        let result = create_group(group("Kitchen"), &Actor::from(&viewer), suite.info()).await;
        assert!(matches!(result, Err(ApplicationError::Forbidden(_))));

        let created = create_group(group("Kitchen"), &Actor::from(&editor), suite.info()).await?;
        assert_eq!("Kitchen", created.name());
        assert_eq!(&Some(DEFAULT_COLOR.to_owned()), created.color());
        assert_eq!(&Some(editor.id().clone()), created.created_by());

        let result = delete_group(created.id(), &Actor::from(&viewer), suite.info()).await;
        assert!(matches!(result, Err(ApplicationError::Forbidden(_))));
        assert_eq!(1, count_groups(suite.info()).await);

        Ok(())
    }

    #[tokio::test]
    async fn test_update_group() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let actor = Actor::from(&admin);
        let created = create_group(group("Kitchen"), &actor, suite.info()).await?;

        let mut change = group("Cellar");
        change.description = Some("below the kitchen".to_owned());
        change.color = Some(" ".to_owned());
        let updated = update_group(created.id(), change, &actor, suite.info()).await?;
        assert_eq!("Cellar", updated.name());
        assert_eq!(&Some("below the kitchen".to_owned()), updated.description());
        assert_eq!(&None, updated.color());
        assert_eq!(created.created_at(), updated.created_at());

        let missing = update_group(
            &Thing::from(("task_group", "missing")),
            group("Attic"),
            &actor,
            suite.info(),
        )
        .await;
        assert!(matches!(missing, Err(ApplicationError::NotFound(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_ungroups_tasks() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let actor = Actor::from(&editor);
        let kitchen = create_group(group("Kitchen"), &actor, suite.info()).await?;
        let cellar = create_group(group("Cellar"), &actor, suite.info()).await?;

        let mut input = draft("Inventario", "2024-03-01");
        input.group = Some(Id::from(kitchen.id()));
        let grouped = suite.task(&editor, input).await?;
        assert_eq!(&Some(kitchen.id().clone()), grouped.task_group());

        let mut input = draft("Wine", "2024-03-02");
        input.group = Some(Id::from(cellar.id()));
        suite.task(&editor, input).await?;

        let listed =
            lifecycle::list_tasks(&actor, false, false, Some(kitchen.id()), suite.info()).await;
        assert_eq!(1, listed.len());
        assert_eq!("Inventario", listed[0].title());

        delete_group(kitchen.id(), &actor, suite.info()).await?;
        let stored = Task::fetch(grouped.id(), suite.info()).await?;
        assert_eq!(&None, stored.task_group());
        assert_eq!(grouped.revision() + 1, *stored.revision());
        assert_eq!(1, list_groups(suite.info()).await.len());

        let again = delete_group(kitchen.id(), &actor, suite.info()).await;
        assert!(matches!(again, Err(ApplicationError::NotFound(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;

        let mut input = draft("Inventario", "2024-03-01");
        input.group = Some(Id::new(("task_group", "missing")));
        let result = suite.task(&editor, input).await;
        assert!(matches!(result, Err(ApplicationError::ValidationError(_))));

        Ok(())
    }
}
