//! Per-user document collections with push-based snapshot delivery.
//!
//! A collection is named by the owning user's id. Every change to a
//! collection pushes its full ordered document sequence to all listeners
//! of that collection, including the writer's own.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::todo::TodoId;
use crate::error::{RemoteError, SubscriptionError};

pub mod memory;
pub mod sqlite;

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: TodoId,
    pub fields: Fields,
}

pub type SnapshotEvent = Result<Vec<Document>, SubscriptionError>;
pub type SnapshotSender = mpsc::UnboundedSender<SnapshotEvent>;
pub type SnapshotReceiver = mpsc::UnboundedReceiver<SnapshotEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

pub trait RemoteCollection {
    /// Register a listener. The current snapshot is pushed right away.
    fn listen(
        &mut self,
        collection: &str,
        tx: SnapshotSender,
    ) -> Result<ListenerId, RemoteError>;

    fn unlisten(&mut self, listener: ListenerId);

    fn add(&mut self, collection: &str, fields: Fields) -> Result<TodoId, RemoteError>;

    fn update(
        &mut self,
        collection: &str,
        id: &TodoId,
        field: &str,
        value: Value,
    ) -> Result<(), RemoteError>;

    /// Deleting an absent document succeeds without pushing.
    fn delete(&mut self, collection: &str, id: &TodoId) -> Result<(), RemoteError>;

    /// Give the backend a chance to push changes made elsewhere.
    fn pump(&mut self) {}
}

impl<T: RemoteCollection + ?Sized> RemoteCollection for Box<T> {
    fn listen(
        &mut self,
        collection: &str,
        tx: SnapshotSender,
    ) -> Result<ListenerId, RemoteError> {
        (**self).listen(collection, tx)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        (**self).unlisten(listener)
    }

    fn add(&mut self, collection: &str, fields: Fields) -> Result<TodoId, RemoteError> {
        (**self).add(collection, fields)
    }

    fn update(
        &mut self,
        collection: &str,
        id: &TodoId,
        field: &str,
        value: Value,
    ) -> Result<(), RemoteError> {
        (**self).update(collection, id, field, value)
    }

    fn delete(&mut self, collection: &str, id: &TodoId) -> Result<(), RemoteError> {
        (**self).delete(collection, id)
    }

    fn pump(&mut self) {
        (**self).pump()
    }
}

pub fn new_document_id() -> TodoId {
    TodoId::new(uuid::Uuid::new_v4().simple().to_string())
}

/// Listener bookkeeping shared by the backends.
#[derive(Debug, Default)]
pub struct Listeners {
    next_id: u64,
    by_id: BTreeMap<ListenerId, (String, SnapshotSender)>,
}

impl Listeners {
    pub fn register(&mut self, collection: &str, tx: SnapshotSender) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_id.insert(id, (collection.to_owned(), tx));
        debug!(listener = id.0, collection, "listener registered");
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let removed = self.by_id.remove(&id).is_some();
        if removed {
            debug!(listener = id.0, "listener removed");
        }
        removed
    }

    /// Deliver to one listener, dropping it if its receiver is gone.
    pub fn send_to(&mut self, id: ListenerId, event: SnapshotEvent) {
        let Some((_, tx)) = self.by_id.get(&id) else {
            return;
        };
        if tx.send(event).is_err() {
            debug!(listener = id.0, "dropping closed listener");
            self.by_id.remove(&id);
        }
    }

    /// Push an event to every listener of `collection`, dropping listeners
    /// whose receiving side has gone away.
    pub fn notify(&mut self, collection: &str, event: &SnapshotEvent) {
        self.by_id.retain(|id, (name, tx)| {
            if name.as_str() != collection {
                return true;
            }
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(listener = id.0, "dropping closed listener");
            }
            alive
        });
    }

    /// Collections that currently have at least one listener.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_id.values().map(|(name, _)| name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}
