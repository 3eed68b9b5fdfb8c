//! SQLite-backed device repository.

use super::{
    DeviceFilter, DeviceId, DeviceRepository, DeviceUpdate, DeviceUpsert, FieldValue,
    PersistedDevice, STALE_STATE,
};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS iot_devices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip TEXT NOT NULL,
        mac TEXT,
        state TEXT,
        avatar TEXT,
        device_id TEXT,
        device_on INTEGER,
        fw_id TEXT,
        fw_ver TEXT,
        has_set_location_info INTEGER,
        hw_id TEXT,
        hw_ver TEXT,
        lang TEXT,
        latitude REAL,
        longitude REAL,
        model TEXT,
        nickname TEXT,
        oem_id TEXT,
        on_time INTEGER,
        region TEXT,
        rssi INTEGER,
        signal_level INTEGER,
        specs TEXT,
        ssid TEXT,
        time_diff INTEGER,
        device_type TEXT,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS ix_ip ON iot_devices (ip);
    CREATE INDEX IF NOT EXISTS ix_nickname ON iot_devices (nickname);
    CREATE INDEX IF NOT EXISTS ix_device_id ON iot_devices (device_id);
";

const SELECT: &str = "SELECT id, ip, mac, state, avatar, device_id, device_on, fw_id, fw_ver, \
    has_set_location_info, hw_id, hw_ver, lang, latitude, longitude, model, nickname, oem_id, \
    on_time, region, rssi, signal_level, specs, ssid, time_diff, device_type, first_seen, \
    last_seen FROM iot_devices";

/// Device repository on a single SQLite connection.
///
/// Statements run on the blocking pool; the connection is shared behind a
/// mutex, so writes are serialised.
#[derive(Clone)]
pub struct SqliteDeviceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDeviceRepository {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        let path = path.to_path_buf();
        info!(path = %path.display(), "opening device database");

        let conn = tokio::task::spawn_blocking(move || -> StorageResult<Connection> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            op(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let idx = row.as_ref().column_index(column)?;
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<PersistedDevice> {
    Ok(PersistedDevice {
        id: DeviceId::new(row.get("id")?),
        ip: row.get("ip")?,
        mac: row.get("mac")?,
        state: row.get("state")?,
        avatar: row.get("avatar")?,
        device_id: row.get("device_id")?,
        device_on: row.get("device_on")?,
        fw_id: row.get("fw_id")?,
        fw_ver: row.get("fw_ver")?,
        has_set_location_info: row.get("has_set_location_info")?,
        hw_id: row.get("hw_id")?,
        hw_ver: row.get("hw_ver")?,
        lang: row.get("lang")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        model: row.get("model")?,
        nickname: row.get("nickname")?,
        oem_id: row.get("oem_id")?,
        on_time: row.get("on_time")?,
        region: row.get("region")?,
        rssi: row.get("rssi")?,
        signal_level: row.get("signal_level")?,
        specs: row.get("specs")?,
        ssid: row.get("ssid")?,
        time_diff: row.get("time_diff")?,
        device_type: row.get("device_type")?,
        first_seen: timestamp(row, "first_seen")?,
        last_seen: timestamp(row, "last_seen")?,
    })
}

fn query_devices(
    conn: &Connection,
    sql: &str,
    values: Vec<FieldValue>,
) -> StorageResult<Vec<PersistedDevice>> {
    let mut stmt = conn.prepare(sql)?;
    let devices = stmt
        .query_map(params_from_iter(values), read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(devices)
}

fn upsert_device(conn: &mut Connection, device: &DeviceUpsert) -> StorageResult<DeviceId> {
    let ip = device.ip.to_string();
    let seen = now();
    let values = device.values();
    let tx = conn.transaction()?;

    let existing: Option<i64> = match &device.info.device_id {
        Some(device_id) => tx
            .query_row(
                "SELECT id FROM iot_devices WHERE device_id = ?1 ORDER BY id LIMIT 1",
                params![device_id],
                |row| row.get(0),
            )
            .optional()?,
        None => tx
            .query_row(
                "SELECT id FROM iot_devices WHERE ip = ?1 AND device_id IS NULL \
                 ORDER BY id LIMIT 1",
                params![ip],
                |row| row.get(0),
            )
            .optional()?,
    };

    let id = match existing {
        Some(id) => {
            let assignments: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
                .collect();
            let sql = format!(
                "UPDATE iot_devices SET {}, last_seen = ?{} WHERE id = ?{}",
                assignments.join(", "),
                values.len() + 1,
                values.len() + 2
            );
            let params = values
                .into_iter()
                .map(|(_, value)| value)
                .chain([FieldValue::from(seen), FieldValue::from(id)]);
            tx.execute(&sql, params_from_iter(params))?;
            debug!(id, %ip, "refreshed device record");
            id
        }
        None => {
            let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
            let placeholders: Vec<String> =
                (1..=values.len() + 2).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO iot_devices ({}, first_seen, last_seen) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            );
            let params = values
                .into_iter()
                .map(|(_, value)| value)
                .chain([FieldValue::from(seen.clone()), FieldValue::from(seen)]);
            tx.execute(&sql, params_from_iter(params))?;
            let id = tx.last_insert_rowid();
            debug!(id, %ip, "inserted device record");
            id
        }
    };

    let displaced = tx.execute(
        "UPDATE iot_devices SET state = ?1 \
         WHERE ip = ?2 AND id != ?3 AND (state IS NULL OR state != ?1)",
        params![STALE_STATE, ip, id],
    )?;
    if displaced > 0 {
        info!(%ip, displaced, "marked records holding a reassigned address as stale");
    }

    tx.commit()?;
    Ok(DeviceId::new(id))
}

#[async_trait]
impl DeviceRepository for SqliteDeviceRepository {
    async fn upsert(&self, device: DeviceUpsert) -> StorageResult<DeviceId> {
        self.with_conn(move |conn| upsert_device(conn, &device)).await
    }

    async fn list(
        &self,
        page: i64,
        page_size: i64,
        filter: &DeviceFilter,
    ) -> StorageResult<Vec<PersistedDevice>> {
        filter.validate()?;

        let mut clauses = Vec::with_capacity(filter.len());
        let mut values = Vec::with_capacity(filter.len() + 2);
        for (column, value) in filter.iter() {
            values.push(value.clone());
            clauses.push(format!("{} = ?{}", column, values.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = page_size.max(0);
        let offset = (page.max(1) - 1).saturating_mul(limit);
        let sql = format!(
            "{}{} ORDER BY id LIMIT ?{} OFFSET ?{}",
            SELECT,
            where_clause,
            values.len() + 1,
            values.len() + 2
        );
        values.push(FieldValue::from(limit));
        values.push(FieldValue::from(offset));

        self.with_conn(move |conn| query_devices(conn, &sql, values))
            .await
    }

    async fn all(&self) -> StorageResult<Vec<PersistedDevice>> {
        let sql = format!("{} ORDER BY id", SELECT);
        self.with_conn(move |conn| query_devices(conn, &sql, Vec::new()))
            .await
    }

    async fn get(&self, id: DeviceId) -> StorageResult<Option<PersistedDevice>> {
        let sql = format!("{} WHERE id = ?1", SELECT);
        let devices = self
            .with_conn(move |conn| query_devices(conn, &sql, vec![FieldValue::from(id.get())]))
            .await?;
        Ok(devices.into_iter().next())
    }

    async fn get_by_address(&self, ip: IpAddr) -> StorageResult<Option<PersistedDevice>> {
        let sql = format!(
            "{} WHERE ip = ?1 ORDER BY (state IS ?2), last_seen DESC, id DESC LIMIT 1",
            SELECT
        );
        let values = vec![
            FieldValue::from(ip.to_string()),
            FieldValue::from(STALE_STATE.to_string()),
        ];
        let devices = self
            .with_conn(move |conn| query_devices(conn, &sql, values))
            .await?;
        Ok(devices.into_iter().next())
    }

    async fn update(&self, id: DeviceId, fields: DeviceUpdate) -> StorageResult<()> {
        fields.validate()?;
        if fields.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len() + 1);
        for (column, value) in fields.iter() {
            values.push(value.clone());
            assignments.push(format!("{} = ?{}", column, values.len()));
        }
        let sql = format!(
            "UPDATE iot_devices SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len() + 1
        );
        values.push(FieldValue::from(id.get()));

        let changed = self
            .with_conn(move |conn| Ok(conn.execute(&sql, params_from_iter(values))?))
            .await?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: DeviceId) -> StorageResult<()> {
        let changed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM iot_devices WHERE id = ?1", params![id.get()])?)
            })
            .await?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        info!(%id, "deleted device record");
        Ok(())
    }
}
