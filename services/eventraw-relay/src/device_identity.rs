//! Device identity lookup.
//!
//! The device database holds one identity row for the camera. Its company
//! serial decides where records are routed; the hardware chip serial is
//! attached to every outgoing record as `CameraSerial`.

use crate::config::{DeviceConfig, StorageConfig};
use crate::routing::DeviceClass;
use crate::store::{self, ColumnValue, StoreError};
use sqlx::{Column, Row};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Serial reported when the hardware serial cannot be read
pub const UNKNOWN_CHIP_SERIAL: &str = "ERROR000000000";

/// Identity of the device this relay runs on
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// Full identity row as (column, value) pairs, kept for logging
    pub row: Vec<(String, ColumnValue)>,
    /// Company serial; its prefix decides the device class
    pub company_serial: String,
    pub class: DeviceClass,
}

impl DeviceIdentity {
    pub fn new(row: Vec<(String, ColumnValue)>, company_serial: impl Into<String>) -> Self {
        let company_serial = company_serial.into();
        let class = DeviceClass::from_company_serial(&company_serial);
        Self {
            row,
            company_serial,
            class,
        }
    }

    /// Identity used when the device table is empty
    pub fn unclassified() -> Self {
        Self::new(Vec::new(), String::new())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (column, value)) in self.row.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", column, value)?;
        }
        write!(f, ")")
    }
}

/// Reads the device identity from the local device database
pub struct DeviceIdentityResolver {
    db_path: PathBuf,
    table: String,
    company_serial_column: String,
    require_single_row: bool,
}

impl DeviceIdentityResolver {
    pub fn new(storage: &StorageConfig, device: &DeviceConfig) -> Self {
        Self {
            db_path: storage.device_db_path.clone(),
            table: storage.device_table.clone(),
            company_serial_column: storage.company_serial_column.clone(),
            require_single_row: device.require_single_row,
        }
    }

    /// Load the identity row and company serial.
    ///
    /// When the table holds several rows the last one returned by SQLite is
    /// used. SQLite does not promise a row order without `ORDER BY`, so set
    /// `require_single_row` where that matters.
    #[instrument(skip(self), fields(path = %self.db_path.display(), table = %self.table))]
    pub async fn resolve(&self) -> Result<DeviceIdentity, StoreError> {
        let mut conn = store::open_read_only(&self.db_path).await?;
        let result = self.query_identity(&mut conn).await;
        store::close(conn, &self.db_path).await;

        let identity = result?;
        info!(
            company_serial = %identity.company_serial,
            class = %identity.class,
            "Resolved device identity"
        );
        Ok(identity)
    }

    async fn query_identity(
        &self,
        conn: &mut sqlx::SqliteConnection,
    ) -> Result<DeviceIdentity, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM {}", self.table))
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NoDeviceRecord(self.table.clone()));
        }
        if rows.len() > 1 {
            if self.require_single_row {
                return Err(StoreError::AmbiguousDeviceRecord {
                    table: self.table.clone(),
                    rows: rows.len(),
                });
            }
            warn!(rows = rows.len(), "Device table has several rows, using the last one");
        }

        let mut full_row = Vec::new();
        if let Some(last) = rows.last() {
            for (index, column) in last.columns().iter().enumerate() {
                full_row.push((column.name().to_string(), store::column_value(last, index)?));
            }
        }

        let serials = sqlx::query(&format!(
            "SELECT {} FROM {}",
            self.company_serial_column, self.table
        ))
        .fetch_all(&mut *conn)
        .await?;

        let company_serial = match serials.last() {
            Some(row) => match store::column_value(row, 0)? {
                ColumnValue::Null => String::new(),
                value => value.to_string(),
            },
            None => String::new(),
        };

        Ok(DeviceIdentity::new(full_row, company_serial))
    }
}

/// Chip serial for outgoing records: the configured override, else the
/// hardware serial from cpuinfo, else [`UNKNOWN_CHIP_SERIAL`].
pub fn resolve_chip_serial(config: &DeviceConfig) -> String {
    if let Some(serial) = config.chip_serial.as_ref().filter(|s| !s.is_empty()) {
        debug!(chip_serial = %serial, "Using configured chip serial");
        return serial.clone();
    }

    match read_chip_serial(&config.cpuinfo_path) {
        Some(serial) => serial,
        None => {
            warn!(
                path = %config.cpuinfo_path.display(),
                "Could not read hardware serial, using placeholder"
            );
            UNKNOWN_CHIP_SERIAL.to_string()
        }
    }
}

/// Read the `Serial` line of a cpuinfo-style file
pub fn read_chip_serial(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Serial" {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::create_db;

    fn resolver(path: &Path, require_single_row: bool) -> DeviceIdentityResolver {
        let storage = StorageConfig {
            device_db_path: path.to_path_buf(),
            ..StorageConfig::default()
        };
        let device = DeviceConfig {
            require_single_row,
            ..DeviceConfig::default()
        };
        DeviceIdentityResolver::new(&storage, &device)
    }

    #[tokio::test]
    async fn test_resolve_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raspicam");
        create_db(
            &path,
            &[
                "CREATE TABLE camera (id INTEGER, name TEXT, companyserial TEXT)",
                "INSERT INTO camera VALUES (1, 'entrance', '15F001234')",
            ],
        )
        .await;

        let identity = resolver(&path, false).resolve().await.unwrap();
        assert_eq!(identity.company_serial, "15F001234");
        assert_eq!(identity.class, DeviceClass::Series15F);
        assert_eq!(
            identity.row,
            vec![
                ("id".to_string(), ColumnValue::Integer(1)),
                ("name".to_string(), ColumnValue::from("entrance")),
                ("companyserial".to_string(), ColumnValue::from("15F001234")),
            ]
        );
        assert_eq!(
            identity.to_string(),
            "(id=1, name=entrance, companyserial=15F001234)"
        );
    }

    #[tokio::test]
    async fn test_empty_table_is_no_device_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raspicam");
        create_db(&path, &["CREATE TABLE camera (id INTEGER, companyserial TEXT)"]).await;

        let result = resolver(&path, false).resolve().await;
        assert!(matches!(result, Err(StoreError::NoDeviceRecord(_))));
        assert_eq!(DeviceIdentity::unclassified().class, DeviceClass::Unclassified);
    }

    #[tokio::test]
    async fn test_multiple_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raspicam");
        create_db(
            &path,
            &[
                "CREATE TABLE camera (id INTEGER, companyserial TEXT)",
                "INSERT INTO camera VALUES (1, '15F000001'), (2, '25F000002')",
            ],
        )
        .await;

        let identity = resolver(&path, false).resolve().await.unwrap();
        assert_eq!(identity.company_serial, "25F000002");
        assert_eq!(identity.class, DeviceClass::Series25F);

        let result = resolver(&path, true).resolve().await;
        assert!(matches!(
            result,
            Err(StoreError::AmbiguousDeviceRecord { rows: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolver(&dir.path().join("absent"), false).resolve().await;
        assert!(matches!(result, Err(StoreError::StorageUnavailable { .. })));
    }

    #[test]
    fn test_read_chip_serial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpuinfo");
        std::fs::write(
            &path,
            "processor\t: 0\nHardware\t: BCM2835\nRevision\t: a02082\nSerial\t\t: 00000000f1e2d3c4\nModel\t\t: Raspberry Pi\n",
        )
        .unwrap();

        assert_eq!(read_chip_serial(&path), Some("00000000f1e2d3c4".to_string()));
        assert_eq!(read_chip_serial(&dir.path().join("absent")), None);
    }

    #[test]
    fn test_resolve_chip_serial_prefers_override() {
        let config = DeviceConfig {
            chip_serial: Some("abc123".to_string()),
            cpuinfo_path: PathBuf::from("/nonexistent/cpuinfo"),
            ..DeviceConfig::default()
        };
        assert_eq!(resolve_chip_serial(&config), "abc123");

        let config = DeviceConfig {
            chip_serial: None,
            cpuinfo_path: PathBuf::from("/nonexistent/cpuinfo"),
            ..DeviceConfig::default()
        };
        assert_eq!(resolve_chip_serial(&config), UNKNOWN_CHIP_SERIAL);
    }
}
