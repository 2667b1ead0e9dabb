//! Embedded SQLite store for providers, live backups and universal providers.
//!
//! One database file under the hub directory, WAL journaled. The connection
//! sits behind a mutex so a `&Store` can be shared by the switcher and the
//! command layer.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::AppType;
use crate::error::{Result, io_err};
use crate::providers::{
    LiveBackup, ProviderRecord, UniversalApps, UniversalModels, UniversalProvider,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS providers (
        id TEXT PRIMARY KEY,
        app_type TEXT NOT NULL,
        name TEXT NOT NULL,
        config_json TEXT NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_providers_app ON providers(app_type);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_providers_current_app
        ON providers(app_type) WHERE is_current = 1;

    CREATE TABLE IF NOT EXISTS live_backups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        app_type TEXT NOT NULL,
        backup_json TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_live_backups_app ON live_backups(app_type, id);

    CREATE TABLE IF NOT EXISTS universal_providers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        base_url TEXT NOT NULL,
        api_key TEXT NOT NULL,
        website_url TEXT,
        notes TEXT,
        apps_json TEXT NOT NULL,
        models_json TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
";

const PROVIDER_COLUMNS: &str =
    "id, app_type, name, config_json, is_current, created_at, updated_at";

const UNIVERSAL_COLUMNS: &str =
    "id, name, base_url, api_key, website_url, notes, apps_json, models_json, created_at, updated_at";

impl ToSql for AppType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AppType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Stored JSON that no longer parses is read back as `{}` rather than
/// poisoning every listing
fn parse_json_column(raw: &str, column: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(column, error = %e, "Ignoring unparseable JSON column");
        Value::Object(Default::default())
    })
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderRecord> {
    let config_json: String = row.get(3)?;
    Ok(ProviderRecord {
        id: row.get(0)?,
        app_type: row.get(1)?,
        name: row.get(2)?,
        config: parse_json_column(&config_json, "config_json"),
        is_current: row.get::<_, i64>(4)? == 1,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn backup_from_row(row: &Row<'_>) -> rusqlite::Result<LiveBackup> {
    let backup_json: String = row.get(2)?;
    Ok(LiveBackup {
        id: row.get(0)?,
        app_type: row.get(1)?,
        backup: parse_json_column(&backup_json, "backup_json"),
        created_at: row.get(3)?,
    })
}

fn universal_from_row(row: &Row<'_>) -> rusqlite::Result<UniversalProvider> {
    let apps_json: String = row.get(6)?;
    let models_json: String = row.get(7)?;
    Ok(UniversalProvider {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        api_key: row.get(3)?,
        website_url: row.get(4)?,
        notes: row.get(5)?,
        apps: serde_json::from_str::<UniversalApps>(&apps_json).unwrap_or_default(),
        models: serde_json::from_str::<UniversalModels>(&models_json).unwrap_or_default(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database file, creating its parent directory
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Opening provider store");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -------------------------------------------------------------------------
    // Providers
    // -------------------------------------------------------------------------

    pub fn insert_provider(&self, record: &ProviderRecord) -> Result<()> {
        let config_json = serde_json::to_string(&record.config)?;
        self.conn.lock().execute(
            "INSERT INTO providers (id, app_type, name, config_json, is_current, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.app_type,
                record.name,
                config_json,
                record.is_current as i64,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_provider(&self, id: &str) -> Result<Option<ProviderRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM providers WHERE id = ?1", PROVIDER_COLUMNS),
                params![id],
                provider_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Providers ordered most recently updated first, then by name
    pub fn list_providers(&self, app: Option<AppType>) -> Result<Vec<ProviderRecord>> {
        let conn = self.conn.lock();
        let records = match app {
            Some(app) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM providers WHERE app_type = ?1
                     ORDER BY updated_at DESC, name ASC",
                    PROVIDER_COLUMNS
                ))?;
                stmt.query_map(params![app], provider_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM providers
                     ORDER BY app_type ASC, updated_at DESC, name ASC",
                    PROVIDER_COLUMNS
                ))?;
                stmt.query_map([], provider_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }

    pub fn current_provider(&self, app: AppType) -> Result<Option<ProviderRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM providers WHERE app_type = ?1 AND is_current = 1 LIMIT 1",
                    PROVIDER_COLUMNS
                ),
                params![app],
                provider_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn update_provider(&self, id: &str, name: &str, config: &Value, updated_at: i64) -> Result<bool> {
        let config_json = serde_json::to_string(config)?;
        let rows = self.conn.lock().execute(
            "UPDATE providers SET name = ?1, config_json = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, config_json, updated_at, id],
        )?;
        Ok(rows > 0)
    }

    pub fn update_provider_config(&self, id: &str, config: &Value, updated_at: i64) -> Result<bool> {
        let config_json = serde_json::to_string(config)?;
        let rows = self.conn.lock().execute(
            "UPDATE providers SET config_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![config_json, updated_at, id],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_provider(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM providers WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Make `id` the only current provider for `app`, in one transaction
    ///
    /// Returns `false` (and changes nothing) if no provider `id` exists for
    /// `app`.
    pub fn set_current_provider(&self, app: AppType, id: &str, updated_at: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE providers SET is_current = 0, updated_at = ?1 WHERE app_type = ?2 AND is_current = 1",
            params![updated_at, app],
        )?;
        let rows = tx.execute(
            "UPDATE providers SET is_current = 1, updated_at = ?1 WHERE id = ?2 AND app_type = ?3",
            params![updated_at, id, app],
        )?;
        if rows == 0 {
            // dropping the transaction rolls back the reset above
            return Ok(false);
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn count_current(&self, app: AppType) -> Result<i64> {
        let count = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM providers WHERE app_type = ?1 AND is_current = 1",
            params![app],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Live backups
    // -------------------------------------------------------------------------

    /// Append a backup and return its id
    pub fn add_live_backup(&self, app: AppType, backup: &Value, created_at: i64) -> Result<i64> {
        let backup_json = serde_json::to_string(backup)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO live_backups (app_type, backup_json, created_at) VALUES (?1, ?2, ?3)",
            params![app, backup_json, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_backup(&self, id: i64) -> Result<Option<LiveBackup>> {
        let conn = self.conn.lock();
        let backup = conn
            .query_row(
                "SELECT id, app_type, backup_json, created_at FROM live_backups WHERE id = ?1",
                params![id],
                backup_from_row,
            )
            .optional()?;
        Ok(backup)
    }

    pub fn latest_backup(&self, app: AppType) -> Result<Option<LiveBackup>> {
        let conn = self.conn.lock();
        let backup = conn
            .query_row(
                "SELECT id, app_type, backup_json, created_at FROM live_backups
                 WHERE app_type = ?1 ORDER BY id DESC LIMIT 1",
                params![app],
                backup_from_row,
            )
            .optional()?;
        Ok(backup)
    }

    /// Newest first
    pub fn list_backups(&self, app: AppType, limit: usize) -> Result<Vec<LiveBackup>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, app_type, backup_json, created_at FROM live_backups
             WHERE app_type = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let backups = stmt
            .query_map(params![app, limit as i64], backup_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(backups)
    }

    // -------------------------------------------------------------------------
    // Universal providers
    // -------------------------------------------------------------------------

    pub fn insert_universal(&self, provider: &UniversalProvider) -> Result<()> {
        let apps_json = serde_json::to_string(&provider.apps)?;
        let models_json = serde_json::to_string(&provider.models)?;
        self.conn.lock().execute(
            &format!(
                "INSERT INTO universal_providers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                UNIVERSAL_COLUMNS
            ),
            params![
                provider.id,
                provider.name,
                provider.base_url,
                provider.api_key,
                provider.website_url,
                provider.notes,
                apps_json,
                models_json,
                provider.created_at,
                provider.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_universal(&self, provider: &UniversalProvider) -> Result<bool> {
        let apps_json = serde_json::to_string(&provider.apps)?;
        let models_json = serde_json::to_string(&provider.models)?;
        let rows = self.conn.lock().execute(
            "UPDATE universal_providers
             SET name = ?1, base_url = ?2, api_key = ?3, website_url = ?4, notes = ?5,
                 apps_json = ?6, models_json = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                provider.name,
                provider.base_url,
                provider.api_key,
                provider.website_url,
                provider.notes,
                apps_json,
                models_json,
                provider.updated_at,
                provider.id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_universal(&self, id: &str) -> Result<Option<UniversalProvider>> {
        let conn = self.conn.lock();
        let provider = conn
            .query_row(
                &format!("SELECT {} FROM universal_providers WHERE id = ?1", UNIVERSAL_COLUMNS),
                params![id],
                universal_from_row,
            )
            .optional()?;
        Ok(provider)
    }

    pub fn list_universal(&self) -> Result<Vec<UniversalProvider>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM universal_providers ORDER BY updated_at DESC, name ASC",
            UNIVERSAL_COLUMNS
        ))?;
        let providers = stmt
            .query_map([], universal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(providers)
    }

    pub fn delete_universal(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM universal_providers WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

/// Opens the store on first use so commands that never touch it don't
/// create the database file
pub struct StoreHandle {
    path: PathBuf,
    cell: OnceCell<Store>,
}

impl StoreHandle {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cell: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<&Store> {
        self.cell.get_or_try_init(|| Store::open(&self.path))
    }
}
