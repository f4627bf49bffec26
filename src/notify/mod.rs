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

//! Fan-out of task events to every elevated account, and the read side the polling
//! client uses to fetch and acknowledge notifications.

use crate::prelude::*;
use surrealdb::sql::Thing;

pub const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TaskCompleted { task: Thing, title: String },
    TaskOverdue { task: Thing, title: String },
}

impl Event {
    pub fn task(&self) -> &Thing {
        match self {
            Event::TaskCompleted { task, .. } | Event::TaskOverdue { task, .. } => task,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Event::TaskCompleted { .. } => "notification.task_completed",
            Event::TaskOverdue { .. } => "notification.task_overdue",
        }
    }

    pub fn message(&self, locale: &str) -> String {
        let title = match self {
            Event::TaskCompleted { title, .. } | Event::TaskOverdue { title, .. } => title,
        };

        t!(self.key(), locale = locale, title = title)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanOutFailure {
    /// none if the recipients could not be resolved at all
    pub recipient: Option<Id>,
    pub error: String,
}

/// Outcome of one fan-out. Succeeded writes stand even if others failed.
#[derive(Debug, Clone, Default, Serialize, Getters)]
#[get = "pub"]
pub struct FanOutReport {
    created: Vec<Id>,
    failed: Vec<FanOutFailure>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn unresolved(error: ApplicationError) -> Self {
        Self {
            created: Vec::new(),
            failed: vec![FanOutFailure {
                recipient: None,
                error: error.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
struct NewNotification<'a> {
    recipient: &'a Thing,
    task: Option<&'a Thing>,
    message: String,
    is_read: bool,
}

/// Writes a single notification.
#[instrument(skip(info, message))]
pub async fn create(
    recipient: &Thing,
    task: Option<&Thing>,
    message: String,
    info: &ConnectionInfo,
) -> Result<Notification> {
    info.bounded(async {
        let notification: Option<Notification> = sql_span!(
            info.connection
                .query("CREATE notification CONTENT $content")
                .bind((
                    "content",
                    NewNotification {
                        recipient,
                        task,
                        message,
                        is_read: false,
                    },
                ))
                .await?
                .take(0)?,
            "creating notification"
        );

        notification.ok_or(ApplicationError::InternalServerError)
    })
    .await
}

/// Writes one notification per elevated account. Recipients are handled one after another,
/// a failed write is recorded and the remaining recipients are still notified.
#[instrument(skip(info))]
pub async fn notify_all(event: &Event, info: &ConnectionInfo) -> Result<FanOutReport> {
    let recipients = Account::elevated(info).await?;
    let mut report = FanOutReport::default();

    for recipient in recipients.iter() {
        let message = event.message(recipient.locale());

        match create(recipient.id(), Some(event.task()), message, info).await {
            Ok(notification) => report.created.push(Id::from(notification.id())),
            Err(error) => {
                error!(
                    "Unable to notify {} about {}: {}",
                    Id::from(recipient.id()),
                    Id::from(event.task()),
                    error
                );
                report.failed.push(FanOutFailure {
                    recipient: Some(Id::from(recipient.id())),
                    error: error.to_string(),
                });
            }
        }
    }

    info!(
        "Fanned out to {} of {} recipients",
        report.created.len(),
        recipients.len()
    );

    Ok(report)
}

/// Newest first. Store failures degrade to an empty list.
#[instrument(skip(info))]
pub async fn list(recipient: &Thing, limit: usize, info: &ConnectionInfo) -> Vec<Notification> {
    let limit = limit.clamp(1, MAX_LIMIT);

    info.best_effort(
        async {
            let notifications: Vec<Notification> = sql_span!(
                info.connection
                    .query(format!(
                        "SELECT * FROM notification WHERE recipient = $recipient \
                         ORDER BY created_at DESC LIMIT {limit}"
                    ))
                    .bind(("recipient", recipient))
                    .await?
                    .take(0)?,
                "listing notifications"
            );

            Ok(notifications)
        },
        "notification list",
    )
    .await
}

#[instrument(skip(info))]
pub async fn unread_count(recipient: &Thing, info: &ConnectionInfo) -> usize {
    info.best_effort(
        async {
            let count: Option<usize> = sql_span!(
                info.connection
                    .query(
                        "SELECT count() FROM notification \
                         WHERE recipient = $recipient AND is_read = false GROUP ALL",
                    )
                    .bind(("recipient", recipient))
                    .await?
                    .take((0, "count"))?,
                "counting unread notifications"
            );

            Ok(count.unwrap_or_default())
        },
        "unread count",
    )
    .await
}

/// Only the recipient may acknowledge a notification.
#[instrument(skip(info))]
pub async fn mark_read(
    id: &Thing,
    recipient: &Thing,
    info: &ConnectionInfo,
) -> Result<Notification> {
    info.bounded(async {
        let notification: Option<Notification> = sql_span!(
            info.connection
                .query("SELECT * FROM $notification")
                .bind(("notification", id))
                .await?
                .take(0)?,
            "fetching notification"
        );
        let notification = notification.ok_or(ApplicationError::NotFound("notification"))?;
        if !notification.recipient().eq(recipient) {
            return Err(ApplicationError::Forbidden(
                "The notification belongs to another account".to_owned(),
            ));
        }

        let updated: Option<Notification> = sql_span!(
            info.connection
                .query("UPDATE $notification SET is_read = true WHERE recipient = $recipient")
                .bind(("notification", id))
                .bind(("recipient", recipient))
                .await?
                .take(0)?,
            "marking notification as read"
        );

        updated.ok_or(ApplicationError::NotFound("notification"))
    })
    .await
}

/// Returns how many notifications changed.
#[instrument(skip(info))]
pub async fn mark_all_read(recipient: &Thing, info: &ConnectionInfo) -> Result<usize> {
    info.bounded(async {
        let updated: Vec<Notification> = sql_span!(
            info.connection
                .query(
                    "UPDATE notification SET is_read = true \
                     WHERE recipient = $recipient AND is_read = false",
                )
                .bind(("recipient", recipient))
                .await?
                .take(0)?,
            "marking all notifications as read"
        );

        Ok(updated.len())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestSuite;

    fn overdue(title: &str) -> Event {
        Event::TaskOverdue {
            task: Thing::from(("task", "fixture")),
            title: title.to_owned(),
        }
    }

    #[test]
    fn test_templates() {
        let completed = Event::TaskCompleted {
            task: Thing::from(("task", "fixture")),
            title: "Inventario".to_owned(),
        };
        assert_eq!(
            "¡Tarea Finalizada! \"Inventario\" ha sido completada.",
            completed.message("es")
        );
        assert_eq!(
            "¡PLAZO VENCIDO! \"Inventario\" ha superado su fecha límite.",
            overdue("Inventario").message("es")
        );
        assert_eq!(
            "DEADLINE MISSED! \"Stock\" is past its deadline.",
            overdue("Stock").message("en")
        );
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_admin() -> Result<()> {
        let suite = TestSuite::init().await?;
        let first = suite.account("first", Role::Admin).await?;
        let second = suite.account("second", Role::Admin).await?;
        let viewer = suite.account("viewer", Role::Viewer).await?;

        let report = notify_all(&overdue("Inventario"), suite.info()).await?;
        assert!(report.is_complete());
        assert_eq!(2, report.created().len());

        for admin in [&first, &second] {
            let notifications = list(admin.id(), DEFAULT_LIMIT, suite.info()).await;
            assert_eq!(1, notifications.len());
            assert_eq!(
                "¡PLAZO VENCIDO! \"Inventario\" ha superado su fecha límite.",
                notifications[0].message()
            );
            assert!(!notifications[0].is_read());
            assert_eq!(&Some(Thing::from(("task", "fixture"))), notifications[0].task());
        }
        assert!(list(viewer.id(), DEFAULT_LIMIT, suite.info()).await.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_fan_out_without_admins() -> Result<()> {
        let suite = TestSuite::init().await?;
        suite.account("viewer", Role::Viewer).await?;

        let report = notify_all(&overdue("Inventario"), suite.info()).await?;
        assert!(report.is_complete());
        assert!(report.created().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_succeeded_writes() -> Result<()> {
        let suite = TestSuite::init().await?;
        let spanish = suite.account("spanish", Role::Admin).await?;
        let english = suite.account_with_locale("english", Role::Admin, "en").await?;
        let last = suite.account("last", Role::Admin).await?;

        // make every english overdue message fail on write
        suite
            .info()
            .connection
            .query("DEFINE FIELD message ON TABLE notification TYPE string ASSERT $value CONTAINSNOT 'MISSED'")
            .await?
            .check()?;

        let report = notify_all(&overdue("Stock"), suite.info()).await?;
        assert_eq!(2, report.created().len());
        assert_eq!(1, report.failed().len());
        assert_eq!(
            Some(Id::from(english.id())),
            report.failed()[0].recipient.clone()
        );

        assert_eq!(1, list(spanish.id(), DEFAULT_LIMIT, suite.info()).await.len());
        assert_eq!(1, list(last.id(), DEFAULT_LIMIT, suite.info()).await.len());
        assert!(list(english.id(), DEFAULT_LIMIT, suite.info()).await.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;

        for index in 0..25 {
            create(admin.id(), None, format!("message {index}"), suite.info()).await?;
        }

        let notifications = list(admin.id(), DEFAULT_LIMIT, suite.info()).await;
        assert_eq!(20, notifications.len());
        assert_eq!("message 24", notifications[0].message());
        assert_eq!("message 5", notifications[19].message());

        assert_eq!(3, list(admin.id(), 3, suite.info()).await.len());

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_read() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let other = suite.account("other", Role::Admin).await?;

        let notification = create(admin.id(), None, "hello".to_owned(), suite.info()).await?;
        create(admin.id(), None, "again".to_owned(), suite.info()).await?;
        assert_eq!(2, unread_count(admin.id(), suite.info()).await);

        let result = mark_read(notification.id(), other.id(), suite.info()).await;
        assert!(matches!(result, Err(ApplicationError::Forbidden(_))));
        assert_eq!(2, unread_count(admin.id(), suite.info()).await);

        let read = mark_read(notification.id(), admin.id(), suite.info()).await?;
        assert!(read.is_read());
        assert_eq!(1, unread_count(admin.id(), suite.info()).await);

        let missing = Thing::from(("notification", "missing"));
        assert!(matches!(
            mark_read(&missing, admin.id(), suite.info()).await,
            Err(ApplicationError::NotFound(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_all_read_only_touches_own() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let other = suite.account("other", Role::Admin).await?;

        notify_all(&overdue("a"), suite.info()).await?;
        notify_all(&overdue("b"), suite.info()).await?;

        assert_eq!(2, mark_all_read(admin.id(), suite.info()).await?);
        assert_eq!(0, mark_all_read(admin.id(), suite.info()).await?);
        assert_eq!(0, unread_count(admin.id(), suite.info()).await);
        assert_eq!(2, unread_count(other.id(), suite.info()).await);

        Ok(())
    }
}
