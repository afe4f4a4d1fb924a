//! services/api/src/adapters/store/pg.rs
//!
//! This module contains the PostgreSQL adapter, which implements both the
//! `CourseStore` and `BlobStore` ports from the `core` crate using `sqlx`.
//! Courses are kept as one JSON document per row next to a version counter
//! that makes every write a compare-and-swap; raw uploads live in a plain
//! key/value blob table.

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{FromRow, PgPool};
use studyforge_core::domain::Course;
use studyforge_core::ports::{BlobStore, CourseStore, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CourseStore` and `BlobStore` ports.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::StorageUnavailable(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CourseRecord {
    doc: String,
    version: i64,
}

impl CourseRecord {
    fn to_domain(self) -> PortResult<Course> {
        let mut course: Course = serde_json::from_str(&self.doc)
            .map_err(|e| PortError::Unexpected(format!("stored course is not valid JSON: {e}")))?;
        // The column is authoritative even if an older writer embedded a
        // different number in the document.
        course.version = self.version as u64;
        Ok(course)
    }
}

//=========================================================================================
// `CourseStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CourseStore for PgStore {
    async fn list_all(&self, user_id: Uuid) -> PortResult<Vec<Course>> {
        let records = sqlx::query_as::<_, CourseRecord>(
            "SELECT doc, version FROM courses WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        records.into_iter().map(CourseRecord::to_domain).collect()
    }

    async fn upsert(&self, user_id: Uuid, course: &Course) -> PortResult<u64> {
        let expected = course.version;
        let next = expected + 1;
        let mut stored = course.clone();
        stored.version = next;
        let doc = serde_json::to_string(&stored)
            .map_err(|e| PortError::Unexpected(format!("course could not be serialized: {e}")))?;

        // A single statement so create-or-replace stays atomic: a fresh row
        // inserts, an existing row only updates when the caller saw the
        // version currently on disk.
        let result = sqlx::query(
            "INSERT INTO courses (user_id, id, doc, version) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, id) DO UPDATE SET doc = EXCLUDED.doc, version = EXCLUDED.version \
             WHERE courses.version = $5",
        )
        .bind(user_id)
        .bind(course.id)
        .bind(&doc)
        .bind(next as i64)
        .bind(expected as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::Conflict {
                course_id: course.id,
                version: expected,
            });
        }
        Ok(next)
    }

    async fn delete(&self, user_id: Uuid, course_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM courses WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

//=========================================================================================
// `BlobStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl BlobStore for PgStore {
    async fn put(&self, key: &str, data: Bytes) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO blobs (key, data) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(key)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Option<Bytes>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT data FROM blobs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(|(data,)| Bytes::from(data)))
    }

    async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM blobs WHERE key = ANY($1)")
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
