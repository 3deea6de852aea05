use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of the job this worker is executing right now.
///
/// Written by the worker loop, read by the cancellation listener. At most one
/// id is held since a worker runs one job at a time.
#[derive(Default, Clone)]
pub struct CurrentJob {
    slot: Arc<Mutex<Option<Uuid>>>,
}

impl CurrentJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Uuid> {
        self.slot.lock().map(|slot| *slot).unwrap_or_default()
    }

    pub fn is(&self, id: Uuid) -> bool {
        self.get() == Some(id)
    }

    /// Mark `id` as current until the returned guard drops.
    pub fn enter(&self, id: Uuid) -> CurrentJobGuard {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(id);
        }
        CurrentJobGuard {
            id,
            slot: Arc::clone(&self.slot),
        }
    }
}

pub struct CurrentJobGuard {
    id: Uuid,
    slot: Arc<Mutex<Option<Uuid>>>,
}

impl Drop for CurrentJobGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock()
            && *slot == Some(self.id)
        {
            *slot = None;
        }
    }
}

/// Tracks posters with a job currently executing in this process.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    posters: Arc<DashMap<Uuid, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("render already in progress for poster {poster_id}")]
    AlreadyRunning { poster_id: Uuid },
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, poster_id: Uuid) -> Result<RenderGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.posters.entry(poster_id) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(RenderGuard {
                    poster_id,
                    posters: Arc::clone(&self.posters),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning { poster_id }),
        }
    }

    pub fn contains(&self, poster_id: Uuid) -> bool {
        self.posters.contains_key(&poster_id)
    }
}

pub struct RenderGuard {
    poster_id: Uuid,
    posters: Arc<DashMap<Uuid, ()>>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.posters.remove(&self.poster_id);
    }
}
