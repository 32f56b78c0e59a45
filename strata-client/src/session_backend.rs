//! Pluggable session storage.
//!
//! * [`BinaryFileBackend`]: the [`PersistedSession`] byte format in one file.
//! * [`InMemoryBackend`]: nothing touches the disk.
//! * [`SqliteBackend`]: SQLite (requires the `sqlite-session` Cargo feature).

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::session::PersistedSession;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Where and how a [`PersistedSession`] is kept between runs.
pub trait SessionBackend: Send + Sync {
    fn save(&self, session: &PersistedSession) -> io::Result<()>;

    /// `None` when nothing has been saved yet.
    fn load(&self) -> io::Result<Option<PersistedSession>>;

    fn delete(&self) -> io::Result<()>;

    /// Human-readable name for log messages.
    fn name(&self) -> &str;
}

// ─── BinaryFileBackend ────────────────────────────────────────────────────────

pub struct BinaryFileBackend {
    path: PathBuf,
}

impl BinaryFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionBackend for BinaryFileBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        session.save(&self.path)
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        PersistedSession::load(&self.path).map(Some)
    }

    fn delete(&self) -> io::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn name(&self) -> &str { "binary-file" }
}

// ─── InMemoryBackend ─────────────────────────────────────────────────────────

/// Keeps the session for the life of the process. The default backend.
#[derive(Default)]
pub struct InMemoryBackend {
    data: Mutex<Option<PersistedSession>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> io::Result<std::sync::MutexGuard<'_, Option<PersistedSession>>> {
        self.data
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "session store poisoned"))
    }
}

impl SessionBackend for InMemoryBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        *self.slot()? = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(self.slot()?.clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.slot()? = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── SqliteBackend ────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite-session")]
pub use sqlite_backend::SqliteBackend;

#[cfg(feature = "sqlite-session")]
mod sqlite_backend {
    use super::*;
    use rusqlite::{Connection, OptionalExtension, params};
    use strata_mtproto::ServerSalt;

    fn sql_err(e: rusqlite::Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }

    /// SQLite-backed session store.
    ///
    /// Enable with the `sqlite-session` Cargo feature:
    /// ```toml
    /// [dependencies]
    /// strata-client = { version = "*", features = ["sqlite-session"] }
    /// ```
    pub struct SqliteBackend {
        path: PathBuf,
    }

    impl SqliteBackend {
        pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
            let path = path.into();
            // Create the schema now so a bad path fails here and not on save.
            let conn = Connection::open(&path).map_err(sql_err)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS session (
                    id          INTEGER PRIMARY KEY CHECK (id = 0),
                    dc_id       INTEGER NOT NULL,
                    addr        TEXT    NOT NULL,
                    auth_key    BLOB    NOT NULL,
                    time_offset INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS salts (
                    salt        INTEGER NOT NULL,
                    valid_since INTEGER NOT NULL,
                    valid_until INTEGER NOT NULL
                );",
            )
            .map_err(sql_err)?;
            Ok(Self { path })
        }
    }

    impl SessionBackend for SqliteBackend {
        fn save(&self, session: &PersistedSession) -> io::Result<()> {
            let mut conn = Connection::open(&self.path).map_err(sql_err)?;
            let tx = conn.transaction().map_err(sql_err)?;
            tx.execute(
                "INSERT OR REPLACE INTO session (id, dc_id, addr, auth_key, time_offset)
                 VALUES (0, ?1, ?2, ?3, ?4)",
                params![session.dc_id, session.addr, session.auth_key.to_vec(), session.time_offset],
            )
            .map_err(sql_err)?;
            tx.execute("DELETE FROM salts", []).map_err(sql_err)?;
            for s in &session.salts {
                tx.execute(
                    "INSERT INTO salts (salt, valid_since, valid_until) VALUES (?1, ?2, ?3)",
                    params![s.salt, s.valid_since, s.valid_until],
                )
                .map_err(sql_err)?;
            }
            tx.commit().map_err(sql_err)
        }

        fn load(&self) -> io::Result<Option<PersistedSession>> {
            if !self.path.exists() {
                return Ok(None);
            }
            let conn = Connection::open(&self.path).map_err(sql_err)?;

            let row = conn
                .query_row(
                    "SELECT dc_id, addr, auth_key, time_offset FROM session WHERE id = 0",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, i32>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, i32>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(sql_err)?;
            let Some((dc_id, addr, key_blob, time_offset)) = row else {
                return Ok(None);
            };
            let auth_key: [u8; 256] = key_blob
                .try_into()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "stored auth key is not 256 bytes"))?;

            let mut stmt = conn
                .prepare("SELECT salt, valid_since, valid_until FROM salts ORDER BY valid_since")
                .map_err(sql_err)?;
            let salts = stmt
                .query_map([], |row| {
                    Ok(ServerSalt { salt: row.get(0)?, valid_since: row.get(1)?, valid_until: row.get(2)? })
                })
                .map_err(sql_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_err)?;

            Ok(Some(PersistedSession { dc_id, addr, auth_key, time_offset, salts }))
        }

        fn delete(&self) -> io::Result<()> {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }
}
