use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use super::schema::{apply_pragmas, init_schema};
use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ConnectionPool {
    path: Option<String>,
    connection: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_pragmas(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_string_lossy().to_string()),
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            path: None,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn get_connection(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().await
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
