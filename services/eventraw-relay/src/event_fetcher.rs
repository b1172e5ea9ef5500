//! Range queries over the raw event table.

use crate::config::StorageConfig;
use crate::store::{self, ColumnValue, StoreError};
use serde::Serialize;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::Sqlite;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// One row of the raw event table.
///
/// Serialized field names match what the backhaul consumers expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(rename = "RoiId")]
    pub region_id: ColumnValue,
    #[serde(rename = "MetricId")]
    pub metric_id: ColumnValue,
    #[serde(rename = "PeopleTypeId")]
    pub people_type_id: ColumnValue,
    #[serde(rename = "PeopleId")]
    pub people_id: ColumnValue,
    #[serde(rename = "EventStartTime")]
    pub event_start_time: ColumnValue,
    #[serde(rename = "EventEndTime")]
    pub event_end_time: ColumnValue,
    #[serde(rename = "CombineObjectTypeId")]
    pub combine_object_type_id: ColumnValue,
}

impl EventRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            region_id: store::column_value(row, 0)?,
            metric_id: store::column_value(row, 1)?,
            people_type_id: store::column_value(row, 2)?,
            people_id: store::column_value(row, 3)?,
            event_start_time: store::column_value(row, 4)?,
            event_end_time: store::column_value(row, 5)?,
            combine_object_type_id: store::column_value(row, 6)?,
        })
    }
}

/// One end of an inclusive timestamp range, typed the way it is bound
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl RangeBound {
    /// Parse a command-line bound: integer, then float, otherwise text
    pub fn parse(input: &str) -> Self {
        if let Ok(value) = input.parse::<i64>() {
            RangeBound::Integer(value)
        } else if let Some(value) = input.parse::<f64>().ok().filter(|v| v.is_finite()) {
            RangeBound::Real(value)
        } else {
            RangeBound::Text(input.to_string())
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, RangeBound::Text(_))
    }

    fn bind_to<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            RangeBound::Integer(v) => query.bind(*v),
            RangeBound::Real(v) => query.bind(*v),
            RangeBound::Text(v) => query.bind(v.clone()),
        }
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Integer(v) => write!(f, "{}", v),
            RangeBound::Real(v) => write!(f, "{}", v),
            RangeBound::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Inclusive `[start, end]` range over `EventStartTimeStamp`
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: RangeBound,
    pub end: RangeBound,
}

impl TimeRange {
    pub fn new(start: RangeBound, end: RangeBound) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Self {
        Self::new(RangeBound::parse(start), RangeBound::parse(end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Fetches raw event rows by start-timestamp range
pub struct EventRecordFetcher {
    db_path: PathBuf,
    table: String,
}

impl EventRecordFetcher {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            db_path: storage.event_db_path.clone(),
            table: storage.event_table.clone(),
        }
    }

    /// Return every row with `start <= EventStartTimeStamp <= end`, in the
    /// store's native row order. The whole result set is loaded at once.
    #[instrument(skip(self, range), fields(path = %self.db_path.display(), range = %range))]
    pub async fn fetch(&self, range: &TimeRange) -> Result<Vec<EventRecord>, StoreError> {
        if range.start.is_numeric() != range.end.is_numeric() {
            return Err(StoreError::Query(format!(
                "range bounds are not comparable: {}",
                range
            )));
        }

        let mut conn = store::open_read_only(&self.db_path).await?;
        info!("Fetching records between {} and {}", range.start, range.end);

        let sql = format!(
            "SELECT RegionID, MetricID, PeopleTypeID, PeopleID, \
                    EventStartTimeStamp, EventEndTimeStamp, CombineObjectTypeID \
             FROM {} \
             WHERE EventStartTimeStamp >= ? AND EventStartTimeStamp <= ?",
            self.table
        );
        let query = range.end.bind_to(range.start.bind_to(sqlx::query(&sql)));
        let result = query.fetch_all(&mut conn).await;
        store::close(conn, &self.db_path).await;

        let records = result?
            .iter()
            .map(EventRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(rows = records.len(), "Fetched records");
        Ok(records)
    }
}
