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

//! The daily overdue sweep. A run first leases a task with a conditional update, then fans
//! out, and only commits `overdue_notified` once every notification was written. A lease
//! that is never committed or released simply expires and the next run takes the task over,
//! so an overdue event is delivered at least once. A commit that fails after a complete
//! fan-out is the remaining window: the task is announced again once its lease expired.

use crate::notify::{self, Event};
use crate::prelude::*;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use surrealdb::sql::Thing;

/// How long a run may hold a task before another run takes it over.
pub const SWEEP_LEASE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub task: Id,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Getters)]
#[get = "pub"]
pub struct SweepReport {
    /// tasks newly flagged as overdue by this run
    flagged: Vec<Id>,
    notifications: usize,
    /// tasks left unflagged, they are retried by the next run
    failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[instrument(skip(info))]
async fn candidates(today: NaiveDate, now: i64, info: &ConnectionInfo) -> Result<Vec<Task>> {
    info.bounded(async {
        let tasks: Vec<Task> = sql_span!(
            info.connection
                .query(
                    "SELECT * FROM task WHERE deadline < $today AND status != $completed \
                     AND is_archived = false AND overdue_notified = false \
                     AND (overdue_lease = NONE OR overdue_lease < $checked_at) ORDER BY deadline ASC",
                )
                .bind(("today", today))
                .bind(("completed", TaskStatus::Completed))
                .bind(("checked_at", now))
                .await?
                .take(0)?,
            "fetching overdue candidates"
        );

        Ok(tasks)
    })
    .await
}

/// Leases the task until `until` if it still qualifies and no live lease exists. `false`
/// means another run holds it or the task changed in between.
#[instrument(skip(info))]
async fn claim(task: &Thing, now: i64, until: i64, info: &ConnectionInfo) -> Result<bool> {
    info.bounded(async {
        let claimed: Vec<Task> = sql_span!(
            info.connection
                .query(
                    "UPDATE $task SET overdue_lease = $until WHERE overdue_notified = false \
                     AND (overdue_lease = NONE OR overdue_lease < $checked_at) \
                     AND status != $completed AND is_archived = false",
                )
                .bind(("task", task))
                .bind(("checked_at", now))
                .bind(("until", until))
                .bind(("completed", TaskStatus::Completed))
                .await?
                .take(0)?,
            "leasing overdue task"
        );

        Ok(!claimed.is_empty())
    })
    .await
}

/// Flags the task, provided the lease is still ours. `false` means it was taken over.
#[instrument(skip(info))]
async fn commit(task: &Thing, until: i64, info: &ConnectionInfo) -> Result<bool> {
    info.bounded(async {
        let committed: Vec<Task> = sql_span!(
            info.connection
                .query(
                    "UPDATE $task SET overdue_notified = true, overdue_lease = NONE \
                     WHERE overdue_lease = $until",
                )
                .bind(("task", task))
                .bind(("until", until))
                .await?
                .take(0)?,
            "flagging overdue task"
        );

        Ok(!committed.is_empty())
    })
    .await
}

#[instrument(skip(info))]
async fn release(task: &Thing, until: i64, info: &ConnectionInfo) -> Result<()> {
    info.bounded(async {
        sql_span!(
            info.connection
                .query("UPDATE $task SET overdue_lease = NONE WHERE overdue_lease = $until")
                .bind(("task", task))
                .bind(("until", until))
                .await?
                .check()?,
            "releasing overdue lease"
        );

        Ok(())
    })
    .await
}

#[instrument(skip(info))]
pub async fn sweep(today: NaiveDate, info: &ConnectionInfo) -> Result<SweepReport> {
    sweep_at(today, Utc::now(), info).await
}

/// Runs the sweep as if the wall clock showed `now`, which only decides lease expiry.
#[instrument(skip(info))]
pub(crate) async fn sweep_at(
    today: NaiveDate,
    now: DateTime<Utc>,
    info: &ConnectionInfo,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let until = (now + Duration::minutes(SWEEP_LEASE_MINUTES)).timestamp_millis();
    let now = now.timestamp_millis();

    for task in candidates(today, now, info).await? {
        let id = Id::from(task.id());

        match claim(task.id(), now, until, info).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{id} is leased by another run");
                continue;
            }
            Err(error) => {
                error!("Unable to lease {id}: {error}");
                report.failures.push(SweepFailure {
                    task: id,
                    error: error.to_string(),
                });
                continue;
            }
        }

        let event = Event::TaskOverdue {
            task: task.id().clone(),
            title: task.title().clone(),
        };
        let fan_out = notify::notify_all(&event, info)
            .await
            .unwrap_or_else(notify::FanOutReport::unresolved);
        report.notifications += fan_out.created().len();

        if !fan_out.is_complete() {
            let error = fan_out
                .failed()
                .iter()
                .map(|failure| failure.error.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            // an unreleased lease expires on its own
            if let Err(release_error) = release(task.id(), until, info).await {
                warn!("Unable to release the lease on {id}, it expires on its own: {release_error}");
            }
            report.failures.push(SweepFailure { task: id, error });
            continue;
        }

        match commit(task.id(), until, info).await {
            Ok(true) => report.flagged.push(id),
            Ok(false) => warn!("The lease on {id} was taken over before it was flagged"),
            Err(error) => {
                error!("Unable to flag {id}: {error}");
                report.failures.push(SweepFailure {
                    task: id,
                    error: error.to_string(),
                });
            }
        }
    }

    info!(
        "Overdue sweep for {today} flagged {} tasks with {} notifications, {} failed",
        report.flagged.len(),
        report.notifications,
        report.failures.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{date, draft, TestSuite};

    #[tokio::test]
    async fn test_sweep_is_idempotent() -> Result<()> {
        let suite = TestSuite::init().await?;
        let first = suite.account("first", Role::Admin).await?;
        suite.account("second", Role::Admin).await?;

        let task = suite.task(&first, draft("Inventario", "2024-03-01")).await?;
        suite.task(&first, draft("Later", "2024-03-10")).await?;

        let report = sweep(date("2024-03-02"), suite.info()).await?;
        assert!(report.is_complete());
        assert_eq!(&vec![Id::from(task.id())], report.flagged());
        assert_eq!(2, *report.notifications());

        let again = sweep(date("2024-03-02"), suite.info()).await?;
        assert!(again.flagged().is_empty());
        assert_eq!(0, *again.notifications());

        let notifications: Vec<Notification> = suite
            .info()
            .connection
            .query("SELECT * FROM notification")
            .await?
            .take(0)?;
        assert_eq!(2, notifications.len());

        assert!(Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_skips_completed_and_archived() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let actor = Actor::from(&admin);

        let completed = suite.task(&admin, draft("done", "2024-03-01")).await?;
        crate::lifecycle::set_status(completed.id(), TaskStatus::Completed, &actor, suite.info())
            .await?;
        let archived = suite.task(&admin, draft("archived", "2024-03-01")).await?;
        crate::lifecycle::archive(archived.id(), &actor, suite.info()).await?;
        let today = suite.task(&admin, draft("today", "2024-03-02")).await?;

        let report = sweep(date("2024-03-02"), suite.info()).await?;
        assert!(report.flagged().is_empty());
        assert!(!Task::fetch(today.id(), suite.info()).await?.overdue_notified());

        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_without_admins_still_flags() -> Result<()> {
        let suite = TestSuite::init().await?;
        let editor = suite.account("editor", Role::Editor).await?;
        let task = suite.task(&editor, draft("alone", "2024-03-01")).await?;

        let report = sweep(date("2024-03-05"), suite.info()).await?;
        assert_eq!(&vec![Id::from(task.id())], report.flagged());
        assert_eq!(0, *report.notifications());
        assert!(Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_fan_out_releases_the_lease() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        suite.account_with_locale("english", Role::Admin, "en").await?;
        let task = suite.task(&admin, draft("Stock", "2024-03-01")).await?;

        suite
            .info()
            .connection
            .query("DEFINE FIELD message ON TABLE notification TYPE string ASSERT $value CONTAINSNOT 'MISSED'")
            .await?
            .check()?;

        let report = sweep(date("2024-03-02"), suite.info()).await?;
        assert!(!report.is_complete());
        assert!(report.flagged().is_empty());
        assert_eq!(1, *report.notifications());
        assert!(!Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        // the next run retries once the store accepts the message again
        suite
            .info()
            .connection
            .query("REMOVE FIELD message ON TABLE notification")
            .await?
            .check()?;
        let retry = sweep(date("2024-03-03"), suite.info()).await?;
        assert_eq!(&vec![Id::from(task.id())], retry.flagged());
        assert_eq!(2, *retry.notifications());

        Ok(())
    }

    #[tokio::test]
    async fn test_stuck_lease_expires() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        suite.account_with_locale("english", Role::Admin, "en").await?;
        let task = suite.task(&admin, draft("Stock", "2024-03-01")).await?;

        // the fan-out fails and so does the release, which cannot clear the lease
        suite
            .info()
            .connection
            .query("DEFINE FIELD message ON TABLE notification TYPE string ASSERT $value CONTAINSNOT 'MISSED'")
            .query("DEFINE FIELD overdue_lease ON TABLE task TYPE int")
            .await?
            .check()?;

        let started = Utc::now();
        let report = sweep_at(date("2024-03-02"), started, suite.info()).await?;
        assert!(!report.is_complete());
        assert!(report.flagged().is_empty());

        suite
            .info()
            .connection
            .query("REMOVE FIELD message ON TABLE notification")
            .query("REMOVE FIELD overdue_lease ON TABLE task")
            .await?
            .check()?;

        // the lease is still held, so a run right after leaves the task alone
        let held = sweep_at(date("2024-03-02"), started + Duration::minutes(1), suite.info()).await?;
        assert!(held.flagged().is_empty());
        assert_eq!(0, *held.notifications());
        assert!(!Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        // once it expired the alert is sent after all
        let later = started + Duration::minutes(SWEEP_LEASE_MINUTES + 1);
        let retry = sweep_at(date("2024-03-02"), later, suite.info()).await?;
        assert_eq!(&vec![Id::from(task.id())], retry.flagged());
        assert_eq!(2, *retry.notifications());
        assert!(Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        Ok(())
    }

    #[tokio::test]
    async fn test_live_lease_is_not_taken_over() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let task = suite.task(&admin, draft("Stock", "2024-03-01")).await?;

        let now = Utc::now();
        let until = (now + Duration::minutes(SWEEP_LEASE_MINUTES)).timestamp_millis();
        assert!(claim(task.id(), now.timestamp_millis(), until, suite.info()).await?);
        assert!(!claim(task.id(), now.timestamp_millis(), until + 1, suite.info()).await?);

        // a commit with a foreign lease changes nothing
        assert!(!commit(task.id(), until + 1, suite.info()).await?);
        assert!(commit(task.id(), until, suite.info()).await?);
        assert!(Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        Ok(())
    }

    #[tokio::test]
    async fn test_moved_deadline_is_flagged_again() -> Result<()> {
        let suite = TestSuite::init().await?;
        let admin = suite.account("admin", Role::Admin).await?;
        let actor = Actor::from(&admin);
        let task = suite.task(&admin, draft("Moved", "2024-03-01")).await?;

        sweep(date("2024-03-02"), suite.info()).await?;
        crate::lifecycle::update(
            task.id(),
            draft("Moved", "2024-03-05"),
            &actor,
            date("2024-03-02"),
            suite.info(),
        )
        .await?;
        assert!(!Task::fetch(task.id(), suite.info()).await?.overdue_notified());

        let early = sweep(date("2024-03-03"), suite.info()).await?;
        assert!(early.flagged().is_empty());
        let report = sweep(date("2024-03-06"), suite.info()).await?;
        assert_eq!(&vec![Id::from(task.id())], report.flagged());

        Ok(())
    }
}
