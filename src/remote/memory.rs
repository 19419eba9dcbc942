use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;

use super::{
    Document, Fields, ListenerId, Listeners, RemoteCollection, SnapshotEvent, SnapshotSender,
    new_document_id,
};
use crate::domain::todo::{NewTodo, TodoId};
use crate::error::RemoteError;

#[derive(Default)]
struct Shared {
    collections: HashMap<String, Vec<Document>>,
    listeners: Listeners,
    seed: Vec<String>,
    seeded: HashSet<String>,
}

impl Shared {
    fn snapshot(&mut self, collection: &str) -> Vec<Document> {
        if !self.seed.is_empty() && self.seeded.insert(collection.to_owned()) {
            let docs = self.collections.entry(collection.to_owned()).or_default();
            for text in &self.seed {
                docs.push(Document {
                    id: new_document_id(),
                    fields: NewTodo::new(text.clone()).into_fields(),
                });
            }
        }
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    fn push(&mut self, collection: &str) {
        let event: SnapshotEvent = Ok(self.snapshot(collection));
        self.listeners.notify(collection, &event);
    }
}

/// Process-local collection store. Clones share the same documents and
/// listeners, so several stores can observe each other's writes.
#[derive(Clone, Default)]
pub struct InMemoryCollection {
    shared: Rc<RefCell<Shared>>,
}

impl InMemoryCollection {
    /// Collections seen for the first time start out with these items.
    pub fn with_seed<S: Into<String>>(seed: impl IntoIterator<Item = S>) -> Self {
        let repo = Self::default();
        repo.shared
            .borrow_mut()
            .seed
            .extend(seed.into_iter().map(Into::into));
        repo
    }

    #[cfg(test)]
    pub fn push_error(&self, collection: &str, message: &str) {
        let event: SnapshotEvent = Err(crate::error::SubscriptionError {
            collection: collection.to_owned(),
            message: message.to_owned(),
        });
        self.shared.borrow_mut().listeners.notify(collection, &event);
    }

    #[cfg(test)]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.shared
            .borrow()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.shared.borrow().listeners.len()
    }
}

impl RemoteCollection for InMemoryCollection {
    fn listen(
        &mut self,
        collection: &str,
        tx: SnapshotSender,
    ) -> Result<ListenerId, RemoteError> {
        let mut shared = self.shared.borrow_mut();
        let id = shared.listeners.register(collection, tx);
        let docs = shared.snapshot(collection);
        shared.listeners.send_to(id, Ok(docs));
        Ok(id)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        self.shared.borrow_mut().listeners.remove(listener);
    }

    fn add(&mut self, collection: &str, fields: Fields) -> Result<TodoId, RemoteError> {
        let mut shared = self.shared.borrow_mut();
        // materialize seed items before the new document so ordering stays stable
        shared.snapshot(collection);
        let id = new_document_id();
        shared
            .collections
            .entry(collection.to_owned())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        shared.push(collection);
        Ok(id)
    }

    fn update(
        &mut self,
        collection: &str,
        id: &TodoId,
        field: &str,
        value: Value,
    ) -> Result<(), RemoteError> {
        let mut shared = self.shared.borrow_mut();
        let doc = shared
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| &d.id == id))
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.to_owned(),
                id: id.clone(),
            })?;
        doc.fields.insert(field.to_owned(), value);
        shared.push(collection);
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &TodoId) -> Result<(), RemoteError> {
        let mut shared = self.shared.borrow_mut();
        let removed = match shared.collections.get_mut(collection) {
            Some(docs) => match docs.iter().position(|d| &d.id == id) {
                Some(pos) => {
                    docs.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            shared.push(collection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::todo::Todo;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn todos(event: SnapshotEvent) -> Vec<Todo> {
        event.unwrap().iter().map(Todo::from_document).collect()
    }

    #[test]
    fn listen_pushes_initial_snapshot() {
        let mut repo = InMemoryCollection::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repo.listen("alice", tx).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());
    }

    #[test]
    fn writes_are_echoed_to_listeners() {
        let mut repo = InMemoryCollection::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repo.listen("alice", tx).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());

        let id = repo
            .add("alice", NewTodo::new("buy milk").into_fields())
            .unwrap();
        let after_add = todos(rx.try_recv().unwrap());
        assert_eq!(after_add.len(), 1);
        assert_eq!(after_add[0].text, "buy milk");

        repo.update("alice", &id, "isDone", json!(true)).unwrap();
        assert!(todos(rx.try_recv().unwrap())[0].is_done);

        repo.delete("alice", &id).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());
    }

    #[test]
    fn collections_are_isolated_per_user() {
        let mut repo = InMemoryCollection::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repo.listen("bob", tx).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());

        repo.add("alice", NewTodo::new("secret").into_fields())
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert!(repo.documents("bob").is_empty());
    }

    #[test]
    fn deleting_absent_document_is_silent() {
        let mut repo = InMemoryCollection::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repo.listen("alice", tx).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());

        repo.delete("alice", &TodoId::new("missing")).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn updating_absent_document_fails() {
        let mut repo = InMemoryCollection::default();
        let err = repo
            .update("alice", &TodoId::new("missing"), "isDone", json!(true))
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[test]
    fn seed_applies_once_per_collection() {
        let mut repo = InMemoryCollection::with_seed(["one", "two"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        repo.listen("alice", tx.clone()).unwrap();
        assert_eq!(todos(rx.try_recv().unwrap()).len(), 2);

        repo.listen("alice", tx).unwrap();
        assert_eq!(todos(rx.try_recv().unwrap()).len(), 2);
    }

    #[test]
    fn clones_share_listeners() {
        let mut writer = InMemoryCollection::default();
        let mut reader = writer.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        reader.listen("alice", tx).unwrap();
        assert!(todos(rx.try_recv().unwrap()).is_empty());

        writer
            .add("alice", NewTodo::new("from elsewhere").into_fields())
            .unwrap();
        assert_eq!(todos(rx.try_recv().unwrap())[0].text, "from elsewhere");
    }
}
