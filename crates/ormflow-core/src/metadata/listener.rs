//! Entity lifecycle listeners.

use std::fmt;
use std::sync::Arc;

use crate::entity::EntityData;
use crate::reporter::Reporter;

/// Lifecycle events a listener can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeRemove,
    AfterRemove,
    AfterLoad,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerKind::BeforeInsert => "before-insert",
            ListenerKind::AfterInsert => "after-insert",
            ListenerKind::BeforeUpdate => "before-update",
            ListenerKind::AfterUpdate => "after-update",
            ListenerKind::BeforeRemove => "before-remove",
            ListenerKind::AfterRemove => "after-remove",
            ListenerKind::AfterLoad => "after-load",
        };
        f.write_str(name)
    }
}

/// What a listener sees besides the entity itself.
pub struct HookContext<'a> {
    entity: &'a str,
    event: ListenerKind,
    reporter: &'a dyn Reporter,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(entity: &'a str, event: ListenerKind, reporter: &'a dyn Reporter) -> Self {
        Self {
            entity,
            event,
            reporter,
        }
    }

    /// Entity name the listener is bound to.
    pub fn entity(&self) -> &str {
        self.entity
    }

    /// Event being handled.
    pub fn event(&self) -> ListenerKind {
        self.event
    }

    /// Send a message to the connection's reporter.
    pub fn report(&self, message: impl AsRef<str>) {
        self.reporter
            .report(self.entity, self.event, message.as_ref());
    }
}

/// Listener callback. Returning `Err` aborts the enclosing operation.
pub type ListenerFn =
    Arc<dyn Fn(&mut EntityData, &HookContext<'_>) -> Result<(), String> + Send + Sync>;

/// Listeners bound to one entity, in registration order.
#[derive(Clone, Default)]
pub struct Listeners {
    entries: Vec<(ListenerKind, ListenerFn)>,
}

impl Listeners {
    /// Create an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a listener to an event.
    pub fn add<F>(&mut self, kind: ListenerKind, listener: F)
    where
        F: Fn(&mut EntityData, &HookContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.entries.push((kind, Arc::new(listener)));
    }

    /// Check if any listener is bound to the event.
    pub fn has(&self, kind: ListenerKind) -> bool {
        self.entries.iter().any(|(k, _)| *k == kind)
    }

    /// Number of bound listeners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no listener is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every listener bound to `kind`, stopping at the first failure.
    pub(crate) fn run(
        &self,
        kind: ListenerKind,
        data: &mut EntityData,
        ctx: &HookContext<'_>,
    ) -> Result<(), String> {
        for (_, listener) in self.entries.iter().filter(|(k, _)| *k == kind) {
            listener(data, ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(kind, _)| kind))
            .finish()
    }
}
