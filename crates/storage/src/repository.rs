//! Event repository over SQLite

use crate::event::DrowsinessEvent;
use crate::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS drowsiness_events (
    id TEXT PRIMARY KEY,
    vehicle_identification TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    image TEXT NOT NULL,
    ear REAL,
    mar REAL,
    event_type TEXT NOT NULL
)";

const COLUMNS: &str = "id, vehicle_identification, timestamp, image, ear, mar, event_type";

/// Fixed-width UTC text so that column order equals time order
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_row(row: &SqliteRow) -> Result<DrowsinessEvent, StorageError> {
    let id: String = row.try_get("id")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(DrowsinessEvent {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::SerializationError(e.to_string()))?,
        vehicle_identification: row.try_get("vehicle_identification")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?
            .with_timezone(&Utc),
        image: row.try_get("image")?,
        ear: row.try_get("ear")?,
        mar: row.try_get("mar")?,
        event_type: row.try_get("event_type")?,
    })
}

/// Repository for drowsiness events
#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    /// Open a database by `sqlite:` URL or file path and create the schema
    pub async fn connect(database: &str) -> Result<Self, StorageError> {
        let (options, max_connections) = if database.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(database)?;
            // Each connection to `:memory:` is its own database
            let max = if database.contains(":memory:") { 1 } else { 4 };
            (options, max)
        } else {
            if let Some(parent) = Path::new(database).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
            }
            (SqliteConnectOptions::new().filename(database), 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options.create_if_missing(true))
            .await?;

        info!("Connected to event database {}", database);
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Wrap an existing pool; call [`EventRepository::migrate`] before use
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON drowsiness_events (timestamp)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create(&self, event: &DrowsinessEvent) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO drowsiness_events ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(event.id.to_string())
        .bind(&event.vehicle_identification)
        .bind(encode_timestamp(&event.timestamp))
        .bind(&event.image)
        .bind(event.ear)
        .bind(event.mar)
        .bind(&event.event_type)
        .execute(&self.pool)
        .await?;

        debug!("Inserted event {} ({})", event.id, event.event_type);
        Ok(())
    }

    /// All events, oldest first
    pub async fn get_all(&self) -> Result<Vec<DrowsinessEvent>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM drowsiness_events ORDER BY timestamp ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_row).collect()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<DrowsinessEvent>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM drowsiness_events WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    /// Delete an event; `false` when no such event existed
    pub async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM drowsiness_events WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM drowsiness_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(secs: i64, event_type: &str) -> DrowsinessEvent {
        DrowsinessEvent {
            id: Uuid::now_v7(),
            vehicle_identification: "VH-001".into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            image: format!("images/{secs}.jpg"),
            ear: Some(0.15),
            mar: None,
            event_type: event_type.into(),
        }
    }

    async fn repo() -> EventRepository {
        EventRepository::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let event = event_at(1_700_000_000, "drowsiness_stage_1");
        repo.create(&event).await.unwrap();

        let loaded = repo.get_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(loaded, event);
        assert!(repo.get_by_id(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_sorted_by_timestamp() {
        let repo = repo().await;
        for secs in [1_700_000_300, 1_700_000_100, 1_700_000_200] {
            repo.create(&event_at(secs, "yawning")).await.unwrap();
        }

        let events = repo.get_all().await.unwrap();
        let times: Vec<i64> = events.iter().map(|e| e.timestamp.timestamp()).collect();
        assert_eq!(times, vec![1_700_000_100, 1_700_000_200, 1_700_000_300]);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let repo = repo().await;
        let event = event_at(1_700_000_000, "drowsiness_stage_2");
        repo.create(&event).await.unwrap();

        assert!(repo.delete(event.id).await.unwrap());
        assert!(!repo.delete(event.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_database_error() {
        let repo = repo().await;
        let event = event_at(1_700_000_000, "yawning");
        repo.create(&event).await.unwrap();
        assert!(matches!(repo.create(&event).await, Err(StorageError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/events.db");
        let path = path.to_str().unwrap();

        let event = event_at(1_700_000_000, "yawning");
        {
            let repo = EventRepository::connect(path).await.unwrap();
            repo.create(&event).await.unwrap();
            repo.close().await;
        }
        let repo = EventRepository::connect(path).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap(), vec![event]);
    }
}
