//! Shared access to the on-device SQLite stores.
//!
//! Both stores are opened read-only for the duration of a single call and
//! closed before the call returns. SQLite columns are dynamically typed, so
//! values are decoded by their runtime storage class into [`ColumnValue`].

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Row, SqliteConnection, TypeInfo, ValueRef};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the local stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("No device record found in table {0}")]
    NoDeviceRecord(String),

    #[error("Expected a single device record in table {table}, found {rows}")]
    AmbiguousDeviceRecord { table: String, rows: usize },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

/// A single SQLite value, tagged with its storage class
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "NULL"),
            ColumnValue::Integer(v) => write!(f, "{}", v),
            ColumnValue::Real(v) => write!(f, "{}", v),
            ColumnValue::Text(v) => write!(f, "{}", v),
            ColumnValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Integer(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Real(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

/// Open a store read-only. A missing file is reported as unavailable rather
/// than silently creating an empty database.
pub(crate) async fn open_read_only(path: &Path) -> Result<SqliteConnection, StoreError> {
    let conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await
        .map_err(|source| StoreError::StorageUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), "Opened local store");
    Ok(conn)
}

/// Close a store connection, logging rather than failing on close errors
pub(crate) async fn close(conn: SqliteConnection, path: &Path) {
    use sqlx::Connection;

    if let Err(e) = conn.close().await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to close local store");
    } else {
        debug!(path = %path.display(), "Closed local store");
    }
}

/// Decode column `index` of `row` by the value's runtime storage class
pub(crate) fn column_value(row: &SqliteRow, index: usize) -> Result<ColumnValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(ColumnValue::Null);
    }

    let class = raw.type_info().name().to_ascii_uppercase();
    let value = if class.contains("INT") || class == "BOOLEAN" {
        ColumnValue::Integer(row.try_get::<i64, _>(index)?)
    } else if class == "REAL" || class == "FLOAT" || class == "DOUBLE" {
        ColumnValue::Real(row.try_get::<f64, _>(index)?)
    } else if class == "BLOB" {
        ColumnValue::Blob(row.try_get::<Vec<u8>, _>(index)?)
    } else {
        ColumnValue::Text(row.try_get::<String, _>(index)?)
    };

    Ok(value)
}
