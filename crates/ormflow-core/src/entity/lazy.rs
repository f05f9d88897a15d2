//! Deferred relation values.
//!
//! A [`LazyRelation`] moves through `Unresolved -> Resolving -> Resolved`
//! exactly once. Concurrent callers that arrive while a load is in flight wait
//! for it instead of issuing their own query. A failed or cancelled load
//! returns to `Unresolved` so the next access retries.

use std::fmt;
use std::sync::Arc;

use ormflow_proto::Value;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::Related;
use crate::error::Result;
use crate::manager::EntityManager;

/// Loads one relation of one owner.
pub(crate) struct LazyLoader {
    manager: EntityManager,
    entity: String,
    relation: String,
    owner_id: Vec<Value>,
}

impl LazyLoader {
    pub(crate) fn new(
        manager: EntityManager,
        entity: impl Into<String>,
        relation: impl Into<String>,
        owner_id: Vec<Value>,
    ) -> Self {
        Self {
            manager,
            entity: entity.into(),
            relation: relation.into(),
            owner_id,
        }
    }

    async fn fetch(&self) -> Result<Related> {
        debug!(
            entity = %self.entity,
            relation = %self.relation,
            "resolving lazy relation"
        );
        self.manager
            .load_relation(&self.entity, &self.relation, &self.owner_id)
            .await
    }
}

/// Observable state of a lazy relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyState {
    Unresolved,
    Resolving,
    Resolved,
}

enum Slot {
    Unresolved(Arc<LazyLoader>),
    Resolving,
    Resolved(Related),
}

struct LazyInner {
    slot: Mutex<Slot>,
    notify: Notify,
}

/// Held by the caller running a load. Dropping it before
/// [`resolve`](Self::resolve), on error or when the load future is dropped,
/// puts the loader back and wakes the waiters so one of them retries.
struct PendingLoad<'a> {
    inner: &'a LazyInner,
    loader: Option<Arc<LazyLoader>>,
}

impl PendingLoad<'_> {
    fn resolve(mut self, value: Related) {
        self.loader = None;
        *self.inner.slot.lock() = Slot::Resolved(value);
    }
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.take() {
            *self.inner.slot.lock() = Slot::Unresolved(loader);
        }
        self.inner.notify.notify_waiters();
    }
}

/// Deferred, memoized relation value.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct LazyRelation {
    inner: Arc<LazyInner>,
}

impl LazyRelation {
    pub(crate) fn unresolved(loader: LazyLoader) -> Self {
        Self::with_slot(Slot::Unresolved(Arc::new(loader)))
    }

    /// A lazy value that is already resolved. Assigning one to a lazy
    /// relation property is how application code sets its value.
    pub fn resolved(value: Related) -> Self {
        Self::with_slot(Slot::Resolved(value))
    }

    fn with_slot(slot: Slot) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                slot: Mutex::new(slot),
                notify: Notify::new(),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> LazyState {
        match &*self.inner.slot.lock() {
            Slot::Unresolved(_) => LazyState::Unresolved,
            Slot::Resolving => LazyState::Resolving,
            Slot::Resolved(_) => LazyState::Resolved,
        }
    }

    /// Check if the value has been loaded.
    pub fn is_resolved(&self) -> bool {
        self.state() == LazyState::Resolved
    }

    /// The cached value, without loading.
    pub fn peek(&self) -> Option<Related> {
        match &*self.inner.slot.lock() {
            Slot::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolve the value, querying the database on first access only.
    pub async fn load(&self) -> Result<Related> {
        loop {
            let notified = self.inner.notify.notified();
            let loader = {
                let mut slot = self.inner.slot.lock();
                match std::mem::replace(&mut *slot, Slot::Resolving) {
                    Slot::Resolved(value) => {
                        *slot = Slot::Resolved(value.clone());
                        return Ok(value);
                    }
                    Slot::Resolving => None,
                    Slot::Unresolved(loader) => Some(loader),
                }
            };

            let Some(loader) = loader else {
                notified.await;
                continue;
            };

            let pending = PendingLoad {
                inner: &self.inner,
                loader: Some(loader.clone()),
            };
            let value = loader.fetch().await?;
            pending.resolve(value.clone());
            return Ok(value);
        }
    }

    /// Resolve and return the single related entity.
    pub async fn load_one(&self) -> Result<Option<super::EntityRef>> {
        Ok(self.load().await?.into_one())
    }

    /// Resolve and return the related entities.
    pub async fn load_many(&self) -> Result<Vec<super::EntityRef>> {
        Ok(self.load().await?.into_many())
    }
}

impl fmt::Debug for LazyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LazyRelation").field(&self.state()).finish()
    }
}
