use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::container::instance::ComponentInstance;
use crate::container::key::ComponentKey;
use crate::errors::{CompositionError, CompositionResult};

/// Observable state of a singleton scope record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeState {
    NotStarted,
    InProgress,
    Ready,
}

enum RecordState {
    NotStarted,
    InProgress(ThreadId),
    Ready(ComponentInstance),
}

impl RecordState {
    fn observable(&self) -> ScopeState {
        match self {
            RecordState::NotStarted => ScopeState::NotStarted,
            RecordState::InProgress(_) => ScopeState::InProgress,
            RecordState::Ready(_) => ScopeState::Ready,
        }
    }
}

struct ScopeRecord {
    state: Mutex<RecordState>,
    changed: Condvar,
}

impl ScopeRecord {
    fn new() -> Self {
        Self {
            state: Mutex::new(RecordState::NotStarted),
            changed: Condvar::new(),
        }
    }
}

/// Outcome of asking the registry for a singleton
pub enum Acquisition {
    /// Already constructed
    Ready(ComponentInstance),
    /// The caller now owns construction and must complete or drop the guard
    Construct(ConstructionGuard),
    /// The calling thread is already constructing this key
    Reentrant,
}

/// Exclusive right to construct one singleton.
///
/// Dropping the guard without completing it resets the record so waiting
/// threads can make their own attempt.
pub struct ConstructionGuard {
    record: Arc<ScopeRecord>,
    completed: bool,
}

impl ConstructionGuard {
    pub fn complete(mut self, instance: ComponentInstance) -> CompositionResult<()> {
        let mut state = self
            .record
            .state
            .lock()
            .map_err(|_| CompositionError::lock("scope_record"))?;
        *state = RecordState::Ready(instance);
        self.completed = true;
        self.record.changed.notify_all();
        Ok(())
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Ok(mut state) = self.record.state.lock() {
            *state = RecordState::NotStarted;
        }
        self.record.changed.notify_all();
    }
}

/// Singleton cache keyed by component key.
///
/// Each key moves NOT_STARTED -> IN_PROGRESS -> READY under its own lock, so
/// at most one construction per key runs at a time and other threads asking
/// for it block until it is ready.
#[derive(Default)]
pub struct ScopeRegistry {
    records: Mutex<HashMap<ComponentKey, Arc<ScopeRecord>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: &ComponentKey) -> CompositionResult<Arc<ScopeRecord>> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CompositionError::lock("scope_registry"))?;
        Ok(records
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ScopeRecord::new()))
            .clone())
    }

    pub fn acquire(&self, key: &ComponentKey) -> CompositionResult<Acquisition> {
        let record = self.record(key)?;
        let current = thread::current().id();

        let mut state = record
            .state
            .lock()
            .map_err(|_| CompositionError::lock("scope_record"))?;
        loop {
            let owner = match &*state {
                RecordState::Ready(instance) => return Ok(Acquisition::Ready(instance.clone())),
                RecordState::InProgress(owner) => Some(*owner),
                RecordState::NotStarted => None,
            };

            match owner {
                Some(owner) if owner == current => return Ok(Acquisition::Reentrant),
                Some(_) => {
                    tracing::trace!(key = %key, "waiting for singleton constructed on another thread");
                    state = record
                        .changed
                        .wait(state)
                        .map_err(|_| CompositionError::lock("scope_record"))?;
                }
                None => {
                    *state = RecordState::InProgress(current);
                    break;
                }
            }
        }
        drop(state);

        Ok(Acquisition::Construct(ConstructionGuard {
            record,
            completed: false,
        }))
    }

    /// Cached instance for `key`, if it is ready
    pub fn cached(&self, key: &ComponentKey) -> Option<ComponentInstance> {
        let record = {
            let records = self.records.lock().ok()?;
            records.get(key)?.clone()
        };
        let state = record.state.lock().ok()?;
        match &*state {
            RecordState::Ready(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    pub fn state(&self, key: &ComponentKey) -> ScopeState {
        let record = match self.records.lock() {
            Ok(records) => records.get(key).cloned(),
            Err(_) => None,
        };
        record
            .and_then(|record| record.state.lock().ok().map(|state| state.observable()))
            .unwrap_or(ScopeState::NotStarted)
    }

    /// Snapshot of every known record
    pub fn states(&self) -> Vec<(ComponentKey, ScopeState)> {
        let records: Vec<(ComponentKey, Arc<ScopeRecord>)> = match self.records.lock() {
            Ok(records) => records
                .iter()
                .map(|(key, record)| (key.clone(), record.clone()))
                .collect(),
            Err(_) => return Vec::new(),
        };

        records
            .into_iter()
            .filter_map(|(key, record)| {
                let state = record.state.lock().ok()?.observable();
                Some((key, state))
            })
            .collect()
    }

    /// Number of ready singletons
    pub fn ready_count(&self) -> usize {
        self.states()
            .iter()
            .filter(|(_, state)| *state == ScopeState::Ready)
            .count()
    }

    /// Drop the cached instance of one key so the next request rebuilds it
    pub fn evict(&self, key: &ComponentKey) -> CompositionResult<bool> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CompositionError::lock("scope_registry"))?;
        let ready = records
            .get(key)
            .and_then(|record| {
                record
                    .state
                    .lock()
                    .ok()
                    .map(|state| matches!(&*state, RecordState::Ready(_)))
            })
            .unwrap_or(false);
        if ready {
            records.remove(key);
        }
        Ok(ready)
    }

    /// Forget every ready singleton; records under construction are left alone
    pub fn clear(&self) -> CompositionResult<usize> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CompositionError::lock("scope_registry"))?;
        let before = records.len();
        records.retain(|_, record| {
            record
                .state
                .lock()
                .map(|state| matches!(&*state, RecordState::InProgress(_)))
                .unwrap_or(false)
        });
        Ok(before - records.len())
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("ready", &self.ready_count())
            .finish()
    }
}
