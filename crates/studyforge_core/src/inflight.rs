//! crates/studyforge_core/src/inflight.rs
//!
//! Tracks generation runs that are currently in flight. At most one run may
//! exist per (owner, artifact) slot — owner being a resource for study
//! artifacts and a chapter for chat — and the lock is enforced here rather
//! than by whatever surface happens to trigger the run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::domain::{ArtifactKind, GenerationPhase};

type SlotMap = HashMap<(Uuid, ArtifactKind), GenerationPhase>;

/// One occupied slot, as reported by [`InFlightRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightEntry {
    pub owner_id: Uuid,
    pub artifact: ArtifactKind,
    pub phase: GenerationPhase,
}

/// Cheap-to-clone registry of in-flight generation slots.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    slots: Arc<Mutex<SlotMap>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `(owner_id, artifact)`. Returns `None` when a run
    /// for that slot is already in flight. The returned guard releases the
    /// slot when dropped, including on error paths and panics.
    pub fn begin(
        &self,
        owner_id: Uuid,
        artifact: ArtifactKind,
        phase: GenerationPhase,
    ) -> Option<InFlightGuard> {
        let mut slots = lock(&self.slots);
        if slots.contains_key(&(owner_id, artifact)) {
            return None;
        }
        slots.insert((owner_id, artifact), phase);
        Some(InFlightGuard {
            slots: Arc::clone(&self.slots),
            key: (owner_id, artifact),
        })
    }

    pub fn is_running(&self, owner_id: Uuid, artifact: ArtifactKind) -> bool {
        lock(&self.slots).contains_key(&(owner_id, artifact))
    }

    /// Every occupied slot with its current phase.
    pub fn snapshot(&self) -> Vec<InFlightEntry> {
        lock(&self.slots)
            .iter()
            .map(|(&(owner_id, artifact), &phase)| InFlightEntry {
                owner_id,
                artifact,
                phase,
            })
            .collect()
    }
}

/// RAII claim on one generation slot.
pub struct InFlightGuard {
    slots: Arc<Mutex<SlotMap>>,
    key: (Uuid, ArtifactKind),
}

impl InFlightGuard {
    /// Records the phase the run has reached, for the status snapshot.
    pub fn set_phase(&self, phase: GenerationPhase) {
        lock(&self.slots).insert(self.key, phase);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.slots).remove(&self.key);
    }
}

// The map stays consistent even if a holder panicked mid-update, so a
// poisoned lock is safe to recover.
fn lock(slots: &Mutex<SlotMap>) -> MutexGuard<'_, SlotMap> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_a_busy_slot_fails() {
        let registry = InFlightRegistry::new();
        let owner = Uuid::new_v4();
        let guard = registry.begin(owner, ArtifactKind::Quiz, GenerationPhase::LoadingSource);
        assert!(guard.is_some());
        assert!(registry
            .begin(owner, ArtifactKind::Quiz, GenerationPhase::LoadingSource)
            .is_none());
    }

    #[test]
    fn different_artifacts_of_one_owner_run_side_by_side() {
        let registry = InFlightRegistry::new();
        let owner = Uuid::new_v4();
        let _summary = registry
            .begin(owner, ArtifactKind::Summary, GenerationPhase::LoadingSource)
            .unwrap();
        let _quiz = registry
            .begin(owner, ArtifactKind::Quiz, GenerationPhase::LoadingSource)
            .unwrap();
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn dropping_the_guard_frees_the_slot() {
        let registry = InFlightRegistry::new();
        let owner = Uuid::new_v4();
        {
            let _guard = registry
                .begin(owner, ArtifactKind::Manga, GenerationPhase::LoadingSource)
                .unwrap();
            assert!(registry.is_running(owner, ArtifactKind::Manga));
        }
        assert!(!registry.is_running(owner, ArtifactKind::Manga));
        assert!(registry
            .begin(owner, ArtifactKind::Manga, GenerationPhase::LoadingSource)
            .is_some());
    }

    #[test]
    fn phases_show_up_in_the_snapshot() {
        let registry = InFlightRegistry::new();
        let owner = Uuid::new_v4();
        let guard = registry
            .begin(owner, ArtifactKind::Summary, GenerationPhase::LoadingSource)
            .unwrap();
        guard.set_phase(GenerationPhase::AwaitingModel);

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot,
            vec![InFlightEntry {
                owner_id: owner,
                artifact: ArtifactKind::Summary,
                phase: GenerationPhase::AwaitingModel,
            }]
        );
    }

    #[test]
    fn slot_is_freed_even_when_the_holder_panics() {
        let registry = InFlightRegistry::new();
        let owner = Uuid::new_v4();
        let registry_clone = registry.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = registry_clone
                .begin(owner, ArtifactKind::Chat, GenerationPhase::AwaitingModel)
                .unwrap();
            panic!("model blew up");
        });
        assert!(result.is_err());
        assert!(!registry.is_running(owner, ArtifactKind::Chat));
    }
}
