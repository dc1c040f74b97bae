//! Connection lifecycle for a data source.
//!
//! The manager owns the booted engine and the single live connection:
//! - `Uninitialized`: nothing booted yet
//! - `EngineLoaded`: engine booted, no connection
//! - `Connected`: connection open but not yet validated
//! - `Ready`: health check passed and extensions loaded

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::engine::{Engine, EngineConnection, EngineProvider};
use crate::error::DataSourceError;

pub(crate) const HEALTH_CHECK_SQL: &str = "SELECT 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Uninitialized,
    EngineLoaded,
    Connected,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::EngineLoaded => "engine-loaded",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
        };
        f.write_str(label)
    }
}

struct Slots {
    state: ConnectionState,
    engine: Option<Arc<dyn Engine>>,
    connection: Option<Arc<dyn EngineConnection>>,
}

pub struct ConnectionManager {
    provider: Arc<dyn EngineProvider>,
    extensions: Vec<String>,
    slots: Mutex<Slots>,
}

impl ConnectionManager {
    pub fn new(provider: Arc<dyn EngineProvider>, extensions: Vec<String>) -> Self {
        Self {
            provider,
            extensions,
            slots: Mutex::new(Slots {
                state: ConnectionState::Uninitialized,
                engine: None,
                connection: None,
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.slots.lock().await.state
    }

    /// The booted engine, if boot has happened.
    pub async fn engine(&self) -> Option<Arc<dyn Engine>> {
        self.slots.lock().await.engine.clone()
    }

    /// Return the live connection, establishing whatever is missing.
    ///
    /// A `Ready` manager returns its connection without touching the engine.
    #[instrument(skip(self))]
    pub async fn ensure_connected(&self) -> Result<Arc<dyn EngineConnection>, DataSourceError> {
        let mut slots = self.slots.lock().await;
        if slots.state == ConnectionState::Ready {
            if let Some(conn) = slots.connection.as_ref() {
                return Ok(Arc::clone(conn));
            }
        }

        let engine = self.ensure_engine(&mut slots).await?;
        let conn = match slots.connection.clone() {
            Some(conn) => conn,
            None => Self::open_connection(&mut slots, &engine).await?,
        };
        self.validate(&mut slots, &conn).await?;
        Ok(conn)
    }

    /// Open a fresh connection (booting the engine only if it never was),
    /// replacing any existing one, then validate it.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<(), DataSourceError> {
        let mut slots = self.slots.lock().await;
        let engine = self.ensure_engine(&mut slots).await?;
        let conn = Self::open_connection(&mut slots, &engine).await?;
        self.validate(&mut slots, &conn).await
    }

    /// Health check; connects first when there is no connection.
    #[instrument(skip(self))]
    pub async fn test(&self) -> Result<(), DataSourceError> {
        let existing = self.slots.lock().await.connection.clone();
        match existing {
            None => self.connect().await,
            Some(conn) => conn
                .execute(HEALTH_CHECK_SQL)
                .await
                .map_err(DataSourceError::connection),
        }
    }

    /// Drop the live connection, keeping the engine booted.
    pub async fn disconnect(&self) {
        let mut slots = self.slots.lock().await;
        if slots.connection.take().is_some() {
            slots.state = ConnectionState::EngineLoaded;
            info!("connection released");
        }
    }

    async fn ensure_engine(&self, slots: &mut Slots) -> Result<Arc<dyn Engine>, DataSourceError> {
        if let Some(engine) = slots.engine.as_ref() {
            return Ok(Arc::clone(engine));
        }
        let engine = self.provider.boot().await.map_err(|err| match err {
            DataSourceError::Connection(msg) => DataSourceError::Connection(msg),
            other => DataSourceError::Connection(format!("engine boot failed: {other}")),
        })?;
        info!(engine = engine.name(), "engine loaded");
        slots.engine = Some(Arc::clone(&engine));
        slots.state = ConnectionState::EngineLoaded;
        Ok(engine)
    }

    async fn open_connection(
        slots: &mut Slots,
        engine: &Arc<dyn Engine>,
    ) -> Result<Arc<dyn EngineConnection>, DataSourceError> {
        let conn = engine.connect().await.map_err(|err| match err {
            DataSourceError::Connection(msg) => DataSourceError::Connection(msg),
            other => DataSourceError::Connection(format!("failed to open connection: {other}")),
        })?;
        slots.connection = Some(Arc::clone(&conn));
        slots.state = ConnectionState::Connected;
        Ok(conn)
    }

    /// Health check then sequential `INSTALL`/`LOAD` of every extension.
    ///
    /// The first failure aborts the rest; the manager stays `Connected` so a
    /// later call retries validation.
    async fn validate(
        &self,
        slots: &mut Slots,
        conn: &Arc<dyn EngineConnection>,
    ) -> Result<(), DataSourceError> {
        conn.execute(HEALTH_CHECK_SQL)
            .await
            .map_err(|err| DataSourceError::Connection(format!("health check failed: {err}")))?;

        for ext in &self.extensions {
            for statement in [format!("INSTALL {ext}"), format!("LOAD {ext}")] {
                if let Err(err) = conn.execute(&statement).await {
                    warn!(extension = %ext, %err, "extension load failed; skipping remaining extensions");
                    return Err(DataSourceError::Connection(format!(
                        "failed to load extension {ext}: {err}"
                    )));
                }
            }
            debug!(extension = %ext, "extension loaded");
        }

        slots.state = ConnectionState::Ready;
        info!(extensions = self.extensions.len(), "connection ready");
        Ok(())
    }
}
