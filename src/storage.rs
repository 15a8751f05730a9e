use std::{io::ErrorKind, str::FromStr};

use chrono::NaiveDateTime;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use tracing::{debug, error, info, warn};

use crate::{
    detection::{DetectionRecord, NewDetection},
    error::StorageError,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    ripe INTEGER NOT NULL DEFAULT 0,
    unripe INTEGER NOT NULL DEFAULT 0,
    overripe INTEGER NOT NULL DEFAULT 0,
    image_path TEXT NOT NULL
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections (timestamp)";

/// Gateway over the `detections` table.
#[derive(Clone)]
pub struct DetectionStore {
    pool: SqlitePool,
}

fn row_to_record(row: &SqliteRow) -> Result<DetectionRecord, StorageError> {
    let timestamp: String = row.try_get("timestamp")?;
    let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| StorageError::InvalidTimestamp(timestamp.clone()))?;

    Ok(DetectionRecord {
        id: row.try_get("id")?,
        timestamp,
        ripe: row.try_get("ripe")?,
        unripe: row.try_get("unripe")?,
        overripe: row.try_get("overripe")?,
        image_path: row.try_get("image_path")?,
    })
}

impl DetectionStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("Connected to database {}", url);
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Appends a detection and returns its id.
    pub async fn insert(&self, detection: &NewDetection) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO detections (ripe, unripe, overripe, image_path) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(detection.ripe)
        .bind(detection.unripe)
        .bind(detection.overripe)
        .bind(&detection.image_path)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            error!("Insert error: {err}");
            StorageError::from(err)
        })?;

        let id = result.last_insert_rowid();
        debug!("Inserted detection {id} for {}", detection.image_path);
        Ok(id)
    }

    /// All detections, newest first.
    pub async fn list_all(&self) -> Result<Vec<DetectionRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, timestamp, ripe, unripe, overripe, image_path
             FROM detections
             ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| {
            error!("Fetch error: {err}");
            StorageError::from(err)
        })?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<DetectionRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT id, timestamp, ripe, unripe, overripe, image_path
             FROM detections
             WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Removes the row and, best effort, the image it points at.
    pub async fn delete_by_id(&self, id: i64) -> Result<(), StorageError> {
        let image_path: Option<String> =
            sqlx::query_scalar("SELECT image_path FROM detections WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|err| {
                    error!("Delete error: {err}");
                    StorageError::from(err)
                })?;

        let Some(image_path) = image_path else {
            warn!("Delete requested for missing detection {id}");
            return Err(StorageError::NotFound(id));
        };

        if !image_path.is_empty() {
            match tokio::fs::remove_file(&image_path).await {
                Ok(()) => debug!("Removed image {image_path}"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("Failed to remove image {image_path}: {err}"),
            }
        }

        let result = sqlx::query("DELETE FROM detections WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                error!("Delete error: {err}");
                StorageError::from(err)
            })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }

        info!("Deleted detection {id}");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
