use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Document, Fields, ListenerId, Listeners, RemoteCollection, SnapshotEvent, SnapshotSender,
    new_document_id,
};
use crate::domain::todo::TodoId;
use crate::error::{RemoteError, SubscriptionError};

/// Durable collection store. Other processes opening the same file see
/// each other's writes through [`RemoteCollection::pump`].
pub struct SqliteCollection {
    conn: Connection,
    listeners: Listeners,
    data_version: i64,
}

impl SqliteCollection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("failed to open db {}", path.display()))?;
        init_schema(&conn)?;
        let data_version = read_data_version(&conn).context("failed to read data_version")?;
        Ok(Self {
            conn,
            listeners: Listeners::default(),
            data_version,
        })
    }

    fn snapshot(&self, collection: &str) -> SnapshotEvent {
        load_documents(&self.conn, collection).map_err(|e| SubscriptionError {
            collection: collection.to_owned(),
            message: e.to_string(),
        })
    }

    fn push(&mut self, collection: &str) {
        let event = self.snapshot(collection);
        self.listeners.notify(collection, &event);
    }
}

impl RemoteCollection for SqliteCollection {
    fn listen(
        &mut self,
        collection: &str,
        tx: SnapshotSender,
    ) -> Result<ListenerId, RemoteError> {
        let id = self.listeners.register(collection, tx);
        let event = self.snapshot(collection);
        self.listeners.send_to(id, event);
        Ok(id)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        self.listeners.remove(listener);
    }

    fn add(&mut self, collection: &str, fields: Fields) -> Result<TodoId, RemoteError> {
        let id = new_document_id();
        let data = Value::Object(fields).to_string();
        self.conn.execute(
            "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
            params![collection, id.as_str(), data],
        )?;
        self.push(collection);
        Ok(id)
    }

    fn update(
        &mut self,
        collection: &str,
        id: &TodoId,
        field: &str,
        value: Value,
    ) -> Result<(), RemoteError> {
        let Some(mut fields) = fetch_fields(&self.conn, collection, id)? else {
            return Err(RemoteError::NotFound {
                collection: collection.to_owned(),
                id: id.clone(),
            });
        };
        fields.insert(field.to_owned(), value);
        self.conn.execute(
            "UPDATE documents SET data = ?1 WHERE collection = ?2 AND id = ?3",
            params![Value::Object(fields).to_string(), collection, id.as_str()],
        )?;
        self.push(collection);
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &TodoId) -> Result<(), RemoteError> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
        )?;
        if removed > 0 {
            self.push(collection);
        }
        Ok(())
    }

    fn pump(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let version = match read_data_version(&self.conn) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to read data_version: {e}");
                return;
            }
        };
        if version == self.data_version {
            return;
        }
        self.data_version = version;
        debug!(version, "database changed by another connection");
        for collection in self.listeners.collections() {
            self.push(&collection);
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS documents (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  collection TEXT NOT NULL,
  id TEXT NOT NULL,
  data TEXT NOT NULL,
  UNIQUE (collection, id)
);
"#,
    )
    .context("failed to initialize schema")?;
    Ok(())
}

fn read_data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

fn parse_fields(id: &TodoId, data: &str) -> Result<Fields, RemoteError> {
    serde_json::from_str(data).map_err(|source| RemoteError::Malformed {
        id: id.clone(),
        source,
    })
}

fn load_documents(conn: &Connection, collection: &str) -> Result<Vec<Document>, RemoteError> {
    let mut stmt =
        conn.prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY seq ASC")?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut docs = Vec::new();
    for row in rows {
        let (id, data) = row?;
        let id = TodoId::new(id);
        let fields = parse_fields(&id, &data)?;
        docs.push(Document { id, fields });
    }
    Ok(docs)
}

fn fetch_fields(
    conn: &Connection,
    collection: &str,
    id: &TodoId,
) -> Result<Option<Fields>, RemoteError> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    data.map(|d| parse_fields(id, &d)).transpose()
}
