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
use crate::routes;
use axum::Router;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod state;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub surrealdb_endpoint: String,
    #[serde(default)]
    pub surrealdb_username: Option<String>,
    #[serde(default)]
    pub surrealdb_password: Option<String>,
    #[serde(default = "default_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_database")]
    pub surrealdb_database: String,
    /// shared secret of the daily trigger, the trigger is closed without one
    #[serde(default)]
    pub cron_secret: Option<String>,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_endpoint() -> String {
    "mem://".to_owned()
}

fn default_namespace() -> String {
    "production".to_owned()
}

fn default_database() -> String {
    "checkboard".to_owned()
}

fn default_store_timeout() -> u64 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            surrealdb_endpoint: default_endpoint(),
            surrealdb_username: None,
            surrealdb_password: None,
            surrealdb_namespace: default_namespace(),
            surrealdb_database: default_database(),
            cron_secret: None,
            store_timeout_ms: default_store_timeout(),
            bind_address: default_bind_address(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(envy::from_env::<Config>()?)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Config>(vars)?)
    }

    pub fn socket_address(&self) -> Result<SocketAddr> {
        self.bind_address.parse().map_err(|_| {
            ApplicationError::ValidationError(format!(
                "invalid bind address {:?}",
                self.bind_address
            ))
        })
    }
}

pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .nest("/task", routes::task::router(state.clone()))
        .nest("/group", routes::group::router(state.clone()))
        .nest("/notification", routes::notification::router(state.clone()))
        .nest("/calendar", routes::calendar::router(state.clone()))
        .nest("/hook", crate::hook::router(state))
        .layer(CompressionLayer::new().gzip(true))
}

pub fn init() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let address = config.socket_address()?;

    tokio::runtime::Runtime::new()?.block_on(async move {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer())
            .init();

        if config.cron_secret.is_none() {
            warn!("No CRON_SECRET configured, the daily trigger will reject every call");
        }

        let (axum_sender, axum_receiver) = kanal::unbounded_async::<()>();

        let info = crate::database::connect(&config).await?;
        let state = ApplicationState::new(info, config);

        let server = tokio::spawn(async move {
            info!("Listening on {address}");

            axum::Server::bind(&address)
                .serve(router(state).into_make_service())
                .with_graceful_shutdown(async {
                    axum_receiver.recv().await.ok();
                })
                .await
                .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))
        });

        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(error) => error!("Unable to listen for shutdown signal: {}", error),
        }

        info!("Received shutdown signal... Shutting down...");
        // shutdown
        axum_sender.send(()).await?;
        server.await.map_err(std::io::Error::from)??;

        Ok::<(), ApplicationError>(())
    })
}
