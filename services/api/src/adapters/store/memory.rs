//! services/api/src/adapters/store/memory.rs
//!
//! This module contains an in-memory implementation of the `CourseStore` and
//! `BlobStore` ports. It backs the server when no database is configured and
//! every test that exercises the pipeline. Course documents go through the
//! same serialize/deserialize round trip as the PostgreSQL adapter so the two
//! stay behaviorally interchangeable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use studyforge_core::domain::Course;
use studyforge_core::ports::{BlobStore, CourseStore, PortError, PortResult};
use tokio::sync::RwLock;
use uuid::Uuid;

struct CourseSlot {
    doc: String,
    version: u64,
    inserted: u64,
}

#[derive(Default)]
struct MemoryInner {
    courses: HashMap<(Uuid, Uuid), CourseSlot>,
    blobs: HashMap<String, Bytes>,
    next_seq: u64,
}

/// An in-memory adapter that implements the `CourseStore` and `BlobStore`
/// ports.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the keys currently held in the blob table, for tests that
    /// check cascade deletion.
    pub async fn blob_keys(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner.blobs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn list_all(&self, user_id: Uuid) -> PortResult<Vec<Course>> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&CourseSlot> = inner
            .courses
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|(_, slot)| slot)
            .collect();
        slots.sort_by_key(|slot| slot.inserted);

        slots
            .into_iter()
            .map(|slot| {
                let mut course: Course = serde_json::from_str(&slot.doc).map_err(|e| {
                    PortError::Unexpected(format!("stored course is not valid JSON: {e}"))
                })?;
                course.version = slot.version;
                Ok(course)
            })
            .collect()
    }

    async fn upsert(&self, user_id: Uuid, course: &Course) -> PortResult<u64> {
        let expected = course.version;
        let next = expected + 1;
        let mut stored = course.clone();
        stored.version = next;
        let doc = serde_json::to_string(&stored)
            .map_err(|e| PortError::Unexpected(format!("course could not be serialized: {e}")))?;

        let mut inner = self.inner.write().await;
        match inner.courses.get_mut(&(user_id, course.id)) {
            Some(slot) => {
                if slot.version != expected {
                    return Err(PortError::Conflict {
                        course_id: course.id,
                        version: expected,
                    });
                }
                slot.doc = doc;
                slot.version = next;
            }
            None => {
                let inserted = inner.next_seq;
                inner.next_seq += 1;
                inner.courses.insert(
                    (user_id, course.id),
                    CourseSlot {
                        doc,
                        version: next,
                        inserted,
                    },
                );
            }
        }
        Ok(next)
    }

    async fn delete(&self, user_id: Uuid, course_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner.courses.remove(&(user_id, course_id));
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Option<Bytes>> {
        let inner = self.inner.read().await;
        Ok(inner.blobs.get(key).cloned())
    }

    async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        for key in keys {
            inner.blobs.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyforge_core::domain::Chapter;

    #[tokio::test]
    async fn upsert_bumps_the_version_and_list_all_reflects_it() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut course = Course::new("Biology");

        let v1 = store.upsert(user, &course).await.unwrap();
        assert_eq!(v1, 1);

        course.version = v1;
        course.chapters.push(Chapter::new("Cells"));
        let v2 = store.upsert(user, &course).await.unwrap();
        assert_eq!(v2, 2);

        let listed = store.list_all(user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].version, 2);
        assert_eq!(listed[0].chapters.len(), 1);
    }

    #[tokio::test]
    async fn stale_writes_are_rejected_with_a_conflict() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let course = Course::new("Chemistry");

        store.upsert(user, &course).await.unwrap();

        // A second writer that never saw version 1 must not clobber it.
        let err = store.upsert(user, &course).await.unwrap_err();
        assert!(matches!(
            err,
            PortError::Conflict { course_id, version: 0 } if course_id == course.id
        ));

        let listed = store.list_all(user).await.unwrap();
        assert_eq!(listed[0].version, 1);
    }

    #[tokio::test]
    async fn courses_are_scoped_per_user() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.upsert(alice, &Course::new("Physics")).await.unwrap();

        assert_eq!(store.list_all(alice).await.unwrap().len(), 1);
        assert!(store.list_all(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_keeps_insertion_order() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for name in ["First", "Second", "Third"] {
            store.upsert(user, &Course::new(name)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_all(user)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn blobs_round_trip_and_delete_many_removes_them() {
        let store = MemoryStore::new();
        store
            .put("resource-a", Bytes::from_static(b"alpha"))
            .await
            .unwrap();
        store
            .put("resource-b", Bytes::from_static(b"beta"))
            .await
            .unwrap();

        assert_eq!(
            store.get("resource-a").await.unwrap(),
            Some(Bytes::from_static(b"alpha"))
        );
        assert_eq!(store.get("resource-missing").await.unwrap(), None);

        store
            .delete_many(&["resource-a".to_string(), "resource-missing".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get("resource-a").await.unwrap(), None);
        assert_eq!(store.blob_keys().await, ["resource-b"]);
    }
}
