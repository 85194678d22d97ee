//! Quiz session store: SessionKey → QuizQuestionSet.
//!
//! The in-memory implementation keeps one async mutex per key. `get_or_create`
//! holds that mutex across generation, so concurrent requests for the same
//! (level, goal) pair wait for the first one instead of generating again.
//! Failed generations store nothing and the next caller retries. Slots that are
//! empty or expired are dropped from the map so it only holds live keys.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::domain::{QuizQuestionSet, SessionKey};
use crate::error::AppError;

/// Lazily-polled generator handed to `get_or_create`; only awaited on a miss.
pub type QuizGenerator<'a> = BoxFuture<'a, Result<QuizQuestionSet, AppError>>;

#[async_trait]
pub trait QuizStore: Send + Sync {
  async fn get(&self, key: &SessionKey) -> Option<QuizQuestionSet>;

  async fn put(&self, key: SessionKey, set: QuizQuestionSet);

  /// Return the stored set, or await `generator`, store its result and return it.
  async fn get_or_create(&self, key: &SessionKey, generator: QuizGenerator<'_>) -> Result<QuizQuestionSet, AppError>;

  /// Number of live (non-expired) entries.
  async fn len(&self) -> usize;
}

struct Entry {
  set: QuizQuestionSet,
  created: Instant,
}

type Slot = Arc<Mutex<Option<Entry>>>;

pub struct InMemoryQuizStore {
  slots: RwLock<HashMap<SessionKey, Slot>>,
  ttl: Option<Duration>,
}

impl InMemoryQuizStore {
  /// `ttl = None` keeps entries for the lifetime of the process.
  pub fn new(ttl: Option<Duration>) -> Self {
    Self { slots: RwLock::new(HashMap::new()), ttl }
  }

  fn is_fresh(&self, entry: &Entry) -> bool {
    self.ttl.map_or(true, |ttl| entry.created.elapsed() < ttl)
  }

  async fn existing_slot(&self, key: &SessionKey) -> Option<Slot> {
    self.slots.read().await.get(key).cloned()
  }

  async fn slot(&self, key: &SessionKey) -> Slot {
    if let Some(slot) = self.existing_slot(key).await {
      return slot;
    }
    self.slots.write().await.entry(key.clone()).or_default().clone()
  }

  async fn is_current(&self, key: &SessionKey, slot: &Slot) -> bool {
    self.slots.read().await.get(key).is_some_and(|s| Arc::ptr_eq(s, slot))
  }

  /// Lock the slot mapped to `key`. A slot removed while we waited is stale; retry on the new one.
  async fn lock_current(&self, key: &SessionKey) -> (Slot, OwnedMutexGuard<Option<Entry>>) {
    loop {
      let slot = self.slot(key).await;
      let guard = Arc::clone(&slot).lock_owned().await;
      if self.is_current(key, &slot).await {
        return (slot, guard);
      }
    }
  }

  /// Remove `slot` from the map if it is still the one mapped to `key`. Caller holds its lock.
  async fn forget(&self, key: &SessionKey, slot: &Slot) {
    let mut slots = self.slots.write().await;
    if slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
      slots.remove(key);
    }
  }

  /// Drop idle slots that are empty or expired. Locked slots are in use and kept.
  async fn prune(&self) {
    let mut slots = self.slots.write().await;
    let before = slots.len();
    slots.retain(|_, slot| match slot.try_lock() {
      Ok(guard) => guard.as_ref().is_some_and(|e| self.is_fresh(e)),
      Err(_) => true,
    });
    if slots.len() < before {
      debug!(target: "quiz", removed = before - slots.len(), "Pruned stale quiz slots");
    }
  }
}

impl Default for InMemoryQuizStore {
  fn default() -> Self { Self::new(None) }
}

#[async_trait]
impl QuizStore for InMemoryQuizStore {
  async fn get(&self, key: &SessionKey) -> Option<QuizQuestionSet> {
    let slot = self.existing_slot(key).await?;
    let guard = slot.lock().await;
    guard.as_ref().filter(|e| self.is_fresh(e)).map(|e| e.set.clone())
  }

  async fn put(&self, key: SessionKey, set: QuizQuestionSet) {
    let (_slot, mut guard) = self.lock_current(&key).await;
    *guard = Some(Entry { set, created: Instant::now() });
  }

  #[instrument(level = "debug", skip(self, generator), fields(%key))]
  async fn get_or_create(&self, key: &SessionKey, generator: QuizGenerator<'_>) -> Result<QuizQuestionSet, AppError> {
    let (slot, mut guard) = self.lock_current(key).await;

    if let Some(entry) = guard.as_ref().filter(|e| self.is_fresh(e)) {
      debug!(target: "quiz", %key, "Quiz cache hit");
      return Ok(entry.set.clone());
    }

    debug!(target: "quiz", %key, expired = guard.is_some(), "Quiz cache miss; generating");
    *guard = None;
    self.prune().await;

    match generator.await {
      Ok(set) => {
        *guard = Some(Entry { set: set.clone(), created: Instant::now() });
        Ok(set)
      }
      Err(e) => {
        self.forget(key, &slot).await;
        Err(e)
      }
    }
  }

  async fn len(&self) -> usize {
    let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
    let mut live = 0;
    for slot in slots {
      if slot.lock().await.as_ref().is_some_and(|e| self.is_fresh(e)) {
        live += 1;
      }
    }
    live
  }
}
