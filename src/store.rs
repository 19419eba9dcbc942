//! Single source of truth for the list the UI shows.
//!
//! `SyncStore` keeps one live listener on the signed-in user's collection
//! and republishes every pushed snapshot through a watch channel. Mutations
//! are fire-and-forget: their effect is only observed through a later push.

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::auth::{SessionHandle, UserId};
use crate::domain::todo::{IS_DONE_FIELD, NewTodo, Todo, TodoId};
use crate::remote::{ListenerId, RemoteCollection, SnapshotReceiver};

/// What happens when a listener delivers an error instead of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log and drop; observers are not notified.
    #[default]
    Silent,
    /// Keep the last snapshot but mark the published view stale.
    Surface,
}

/// Published state observed by the presenter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncView {
    pub todos: Vec<Todo>,
    pub stale: Option<String>,
}

struct Subscription {
    user: UserId,
    listener: ListenerId,
    rx: SnapshotReceiver,
}

pub struct SyncStore<R: RemoteCollection> {
    remote: R,
    session: SessionHandle,
    policy: ErrorPolicy,
    active: Option<Subscription>,
    published: watch::Sender<SyncView>,
}

impl<R: RemoteCollection> SyncStore<R> {
    pub fn new(remote: R, session: SessionHandle, policy: ErrorPolicy) -> Self {
        let (published, _) = watch::channel(SyncView::default());
        Self {
            remote,
            session,
            policy,
            active: None,
            published,
        }
    }

    /// Observe published views. Dropping the receiver ends the observation.
    pub fn watch(&self) -> watch::Receiver<SyncView> {
        self.published.subscribe()
    }

    pub fn view(&self) -> SyncView {
        self.published.borrow().clone()
    }

    pub fn subscribed_user(&self) -> Option<&UserId> {
        self.active.as_ref().map(|s| &s.user)
    }

    /// Start listening on `user`'s collection. Repeated calls for the user
    /// that is already active keep the existing listener.
    pub fn subscribe(&mut self, user: &UserId) {
        if self.subscribed_user() == Some(user) {
            debug!(uid = %user, "already subscribed");
            return;
        }
        self.unsubscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        match self.remote.listen(user.as_str(), tx) {
            Ok(listener) => {
                info!(uid = %user, "subscribed to collection");
                self.active = Some(Subscription {
                    user: user.clone(),
                    listener,
                    rx,
                });
            }
            Err(e) => warn!(uid = %user, "failed to subscribe: {e}"),
        }
    }

    /// Drop the live listener and clear the published list.
    pub fn unsubscribe(&mut self) {
        let Some(sub) = self.active.take() else {
            return;
        };
        self.remote.unlisten(sub.listener);
        self.published.send_replace(SyncView::default());
        info!(uid = %sub.user, "unsubscribed from collection");
    }

    /// Bring the listener in line with the session, then publish whatever
    /// the remote pushed since the last call. Returns whether a new view
    /// was published.
    pub fn poll(&mut self) -> bool {
        self.remote.pump();

        match self.session.current_uid() {
            Some(uid) => self.subscribe(&uid),
            None => self.unsubscribe(),
        }

        let Some(sub) = self.active.as_mut() else {
            return false;
        };
        let mut published = false;
        while let Ok(event) = sub.rx.try_recv() {
            match event {
                Ok(docs) => {
                    let todos: Vec<Todo> = docs.iter().map(Todo::from_document).collect();
                    debug!(count = todos.len(), "snapshot received");
                    self.published.send_replace(SyncView { todos, stale: None });
                    published = true;
                }
                Err(e) => {
                    warn!("snapshot listener error: {e}");
                    if self.policy == ErrorPolicy::Surface {
                        self.published
                            .send_modify(|view| view.stale = Some(e.message.clone()));
                        published = true;
                    }
                }
            }
        }
        published
    }

    pub fn add_todo(&mut self, text: &str) {
        let Some(uid) = self.session.current_uid() else {
            debug!("add ignored while signed out");
            return;
        };
        let fields = NewTodo::new(text).into_fields();
        match self.remote.add(uid.as_str(), fields) {
            Ok(id) => debug!(%id, "add requested"),
            Err(e) => warn!("add failed: {e}"),
        }
    }

    pub fn toggle_todo(&mut self, id: &TodoId) {
        let Some(uid) = self.session.current_uid() else {
            debug!("toggle ignored while signed out");
            return;
        };
        let current = self
            .published
            .borrow()
            .todos
            .iter()
            .find(|t| &t.id == id)
            .map(|t| t.is_done);
        let Some(is_done) = current else {
            debug!(%id, "toggle ignored for unknown item");
            return;
        };
        if let Err(e) = self
            .remote
            .update(uid.as_str(), id, IS_DONE_FIELD, Value::Bool(!is_done))
        {
            warn!("toggle failed: {e}");
        }
    }

    pub fn delete_todo(&mut self, id: &TodoId) {
        let Some(uid) = self.session.current_uid() else {
            debug!("delete ignored while signed out");
            return;
        };
        if let Err(e) = self.remote.delete(uid.as_str(), id) {
            warn!("delete failed: {e}");
        }
    }
}

impl<R: RemoteCollection> Drop for SyncStore<R> {
    fn drop(&mut self) {
        if let Some(sub) = self.active.take() {
            self.remote.unlisten(sub.listener);
        }
    }
}
