//! List presenter: projects the latest published view and turns user
//! gestures into store requests.

use tokio::sync::watch;
use tracing::warn;

use crate::auth::{IdentityProvider, Session};
use crate::domain::todo::{Todo, TodoId};
use crate::error::AuthError;
use crate::remote::RemoteCollection;
use crate::store::{ErrorPolicy, SyncStore, SyncView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Todos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App<R: RemoteCollection> {
    store: SyncStore<R>,
    session: Session,
    identity: Box<dyn IdentityProvider>,
    view: watch::Receiver<SyncView>,
    pub screen: Screen,
    pub todos: Vec<Todo>,
    pub stale: Option<String>,
    pub selected: usize,
    pub mode: InputMode,
    pub input: String,
    pub status: Option<String>,
}

impl<R: RemoteCollection> App<R> {
    pub fn new(
        remote: R,
        identity: Box<dyn IdentityProvider>,
        policy: ErrorPolicy,
    ) -> Result<Self, AuthError> {
        let (session, screen) = match identity.restore()? {
            Some(user) => (Session::signed_in(user), Screen::Todos),
            None => (Session::signed_out(), Screen::SignIn),
        };
        let store = SyncStore::new(remote, session.handle(), policy);
        let view = store.watch();
        Ok(Self {
            store,
            session,
            identity,
            view,
            screen,
            todos: Vec::new(),
            stale: None,
            selected: 0,
            mode: InputMode::Normal,
            input: String::new(),
            status: None,
        })
    }

    pub fn user_email(&self) -> Option<String> {
        self.session.current_user().map(|u| u.email)
    }

    /// Pull pushed snapshots through the store and re-render on change.
    pub fn sync(&mut self) {
        self.store.poll();
        if self.view.has_changed().unwrap_or(false) {
            let view = self.view.borrow_and_update().clone();
            self.apply(view);
        }
    }

    /// Replace the displayed list wholesale.
    pub fn apply(&mut self, view: SyncView) {
        self.todos = view.todos;
        self.stale = view.stale;
        if self.selected >= self.todos.len() {
            self.selected = self.todos.len().saturating_sub(1);
        }
    }

    /// A rejected address keeps the sign-in screen open; other failures
    /// end the session.
    pub fn submit_sign_in(&mut self) -> Result<(), AuthError> {
        let user = match self.identity.sign_in_with_email(&self.input) {
            Ok(user) => user,
            Err(e @ AuthError::InvalidEmail(_)) => {
                self.set_status(&e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let uid = user.uid.clone();
        let email = user.email.clone();
        self.session.sign_in(user);
        self.store.subscribe(&uid);
        self.input.clear();
        self.screen = Screen::Todos;
        self.set_status(&format!("Signed in as {email}"));
        Ok(())
    }

    pub fn sign_out(&mut self) {
        if let Err(e) = self.identity.sign_out() {
            warn!("failed to clear persisted session: {e}");
        }
        self.session.sign_out();
        self.store.unsubscribe();
        let view = self.store.view();
        self.apply(view);
        self.mode = InputMode::Normal;
        self.input.clear();
        self.screen = Screen::SignIn;
        self.set_status("Signed out");
    }

    pub fn select_next(&mut self) {
        if !self.todos.is_empty() {
            self.selected = (self.selected + 1).min(self.todos.len() - 1);
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn selected_id(&self) -> Option<TodoId> {
        self.todos.get(self.selected).map(|t| t.id.clone())
    }

    /// Tap on a row.
    pub fn toggle_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            self.store.toggle_todo(&id);
            self.set_status("Toggled completion");
        }
    }

    /// Tap on a row's delete affordance.
    pub fn delete_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            self.store.delete_todo(&id);
            self.set_status("Deleted");
        }
    }

    /// Submit the input line as a new item. Empty text is sent as-is.
    pub fn add_todo(&mut self) {
        let text = std::mem::take(&mut self.input);
        self.store.add_todo(&text);
        self.mode = InputMode::Normal;
        self.set_status("Added");
    }

    pub fn set_status(&mut self, msg: &str) {
        self.status = Some(msg.to_string());
    }
}
