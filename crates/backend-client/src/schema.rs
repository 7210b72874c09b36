//! Remote table shapes for the `public` schema.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Foreign key between two relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub foreign_key_name: &'static str,
    pub columns: &'static [&'static str],
    pub referenced_relation: &'static str,
    pub referenced_columns: &'static [&'static str],
}

/// A table reachable through the REST endpoint.
pub trait Table {
    const NAME: &'static str;

    type Row: DeserializeOwned + Send;
    type Insert: Serialize + Sync;
    type Update: Serialize + Sync;

    fn relationships() -> &'static [Relationship];
}

/// `todos` table.
#[derive(Debug, Clone, Copy)]
pub struct Todos;

/// `profiles` table.
#[derive(Debug, Clone, Copy)]
pub struct Profiles;

impl Table for Todos {
    const NAME: &'static str = "todos";

    type Row = TodoRow;
    type Insert = TodoInsert;
    type Update = TodoUpdate;

    fn relationships() -> &'static [Relationship] {
        &[Relationship {
            foreign_key_name: "todos_user_id_fkey",
            columns: &["user_id"],
            referenced_relation: "users",
            referenced_columns: &["id"],
        }]
    }
}

impl Table for Profiles {
    const NAME: &'static str = "profiles";

    type Row = ProfileRow;
    type Insert = ProfileInsert;
    type Update = ProfileUpdate;

    fn relationships() -> &'static [Relationship] {
        &[Relationship {
            foreign_key_name: "profiles_id_fkey",
            columns: &["id"],
            referenced_relation: "users",
            referenced_columns: &["id"],
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoInsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    pub user_id: String,
}

impl TodoInsert {
    pub fn new(title: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Partial update. `Some(None)` on a nullable column writes `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TodoUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileInsert {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
}
