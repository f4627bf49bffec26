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
use crate::server::Config;
use std::future::Future;
use std::time::Duration;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use version_compare::{Cmp, Version};

pub mod definitions;
pub mod id;

pub type DatabaseConnection = Surreal<Any>;

/// Schema fixes applied to databases created by an older release.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0.1.0",
    "UPDATE task SET overdue_notified = false WHERE overdue_notified = NONE;
    UPDATE task SET frequency = 'one_time' WHERE frequency = NONE OR frequency = '';",
)];

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection: DatabaseConnection,
    pub database: String,
    pub namespace: String,
    /// upper bound for every single store request
    pub timeout: Duration,
}

impl ConnectionInfo {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Awaits the given store request, failing with `StoreUnavailable` once the timeout elapsed.
    pub async fn bounded<F, T>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, request).await?
    }

    /// Read paths stay available even if the store is not: any failure degrades to the default.
    pub async fn best_effort<F, T>(&self, request: F, what: &str) -> T
    where
        F: Future<Output = Result<T>>,
        T: Default,
    {
        match self.bounded(request).await {
            Ok(value) => value,
            Err(error) => {
                warn!("Serving empty {what}: {error}");
                T::default()
            }
        }
    }
}

pub async fn connect(config: &Config) -> Result<ConnectionInfo> {
    // establish the connection
    let client = surrealdb::engine::any::connect(config.surrealdb_endpoint.as_str()).await?;
    info!("Established connection to surrealdb");

    // authenticate, the embedded engines run without users
    if let (Some(username), Some(password)) = (
        config.surrealdb_username.as_deref(),
        config.surrealdb_password.as_deref(),
    ) {
        client.signin(Root { username, password }).await?;
        info!("Authenticated with surrealdb");
    }

    // use namespace and database
    cfg_if::cfg_if! {
        if #[cfg(test)] {
            let namespace = "test".to_owned();
            let database = nanoid::nanoid!();
        } else {
            let namespace = config.surrealdb_namespace.clone();
            let database = config.surrealdb_database.clone();
        }
    }

    client
        .use_ns(namespace.as_str())
        .use_db(database.as_str())
        .await?;

    // execute the up queries
    client
        .query(include_str!("./up.surrealql"))
        .await?
        .check()?;
    info!("Initiated tables");

    // perform the migrations
    migrate(&client, env!("CARGO_PKG_VERSION"), MIGRATIONS).await?;

    Ok(ConnectionInfo {
        connection: client,
        database,
        namespace,
        timeout: Duration::from_millis(config.store_timeout_ms),
    })
}

fn version(raw: &str) -> Result<Version> {
    Version::from(raw).ok_or(ApplicationError::ValidationError(format!(
        "invalid version {raw}"
    )))
}

#[instrument(skip(client, migrations))]
pub async fn migrate(
    client: &DatabaseConnection,
    current_version: &'static str,
    migrations: &[(&'static str, &'static str)],
) -> Result<()> {
    // initiate the migration table and fetch possibly already existing records
    client
        .query(
            "DEFINE TABLE migration SCHEMALESS;
            DEFINE FIELD version     on TABLE migration TYPE string;
            DEFINE FIELD created_at  on TABLE migration TYPE datetime DEFAULT time::now();",
        )
        .await?
        .check()?;
    // the select runs on its own, so its result is always statement 0
    let last = client
        .query("SELECT version, created_at FROM migration ORDER BY created_at DESC LIMIT 1")
        .await?
        .check()?
        .take::<Option<String>>((0, "version"))?;

    if let Some(last) = last {
        // only proceed if the last version is not equal to the current version
        if !last.as_str().eq(current_version) {
            let from = version(last.as_str())?;
            let to = version(current_version)?;

            for (target, migration) in migrations {
                let target_version = version(target)?;
                if target_version.compare_to(&from, Cmp::Gt)
                    && target_version.compare_to(&to, Cmp::Le)
                {
                    info!("Executing surrealdb migration to {target}");
                    client.query(*migration).await?.check()?;
                }
            }

            // mark the current version as done
            client
                .query("CREATE migration SET version = $version")
                .bind(("version", current_version))
                .await?
                .check()?;
        }
    } else {
        // a fresh database is already shaped by the up queries
        client
            .query("CREATE migration SET version = $version")
            .bind(("version", current_version))
            .await?
            .check()?;
    }

    Ok(())
}

/// Runs the store request inside a span. The expression may use `?`, errors are passed on to
/// the caller.
#[macro_export]
macro_rules! sql_span {
    ($expr: expr) => {
        ::tracing::Instrument::instrument(
            async { Ok::<_, $crate::error::ApplicationError>($expr) },
            ::tracing::info_span!("Surrealdb Request"),
        )
        .await?
    };
    ($expr: expr, $title: expr) => {
        ::tracing::Instrument::instrument(
            async { Ok::<_, $crate::error::ApplicationError>($expr) },
            ::tracing::info_span!(concat!("Surrealdb Request: ", $title)),
        )
        .await?
    };
}
