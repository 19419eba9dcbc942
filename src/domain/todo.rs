use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::{Document, Fields};

pub const TEXT_FIELD: &str = "text";
pub const IS_DONE_FIELD: &str = "isDone";

/// Identifier assigned by the remote collection when a document is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub text: String,
    pub is_done: bool,
}

impl Todo {
    /// Decode a pushed document. Missing or mistyped fields fall back to
    /// an empty text and `is_done = false`.
    pub fn from_document(doc: &Document) -> Self {
        let text = doc
            .fields
            .get(TEXT_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let is_done = doc
            .fields
            .get(IS_DONE_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            id: doc.id.clone(),
            text,
            is_done,
        }
    }
}

/// Payload of a create request; the id is assigned remotely.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub text: String,
    pub is_done: bool,
}

impl NewTodo {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_done: false,
        }
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(TEXT_FIELD.to_owned(), Value::String(self.text));
        fields.insert(IS_DONE_FIELD.to_owned(), Value::Bool(self.is_done));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: TodoId::new(id),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn decodes_wire_field_names() {
        let todo = Todo::from_document(&doc("a1", json!({"text": "buy milk", "isDone": true})));
        assert_eq!(todo.id.as_str(), "a1");
        assert_eq!(todo.text, "buy milk");
        assert!(todo.is_done);
    }

    #[test]
    fn missing_or_mistyped_fields_use_defaults() {
        let todo = Todo::from_document(&doc("b2", json!({"isDone": "yes"})));
        assert_eq!(todo.text, "");
        assert!(!todo.is_done);
    }

    #[test]
    fn new_todo_starts_open() {
        let fields = NewTodo::new("write tests").into_fields();
        assert_eq!(fields.get(TEXT_FIELD), Some(&json!("write tests")));
        assert_eq!(fields.get(IS_DONE_FIELD), Some(&json!(false)));
    }
}
