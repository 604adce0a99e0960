//! ListStore — list definitions and subscriptions in SQLite.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use super::db::Database;
use crate::error::{DatabaseError, ListError};
use crate::list::{List, ListDirectory, SubscriberStore};

const LIST_COLUMNS: &str =
    "id, address, name, description, hidden, locked, subscribers_only, posters, bcc";

/// Persistent list storage backed by SQLite.
#[derive(Clone)]
pub struct ListStore {
    db: Arc<Database>,
}

impl ListStore {
    /// Create a new ListStore wrapping the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new list. An empty `address` defaults to the id.
    pub fn create_list(&self, list: &List) -> Result<List, ListError> {
        let mut list = list.clone();
        if list.address.is_empty() {
            list.address = list.id.clone();
        }

        let conn = self.db.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM lists WHERE id = ?1)",
                params![list.id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::from)?;
        if exists {
            return Err(ListError::AlreadyExists { id: list.id });
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO lists (id, address, name, description, hidden, locked,
                subscribers_only, posters, bcc, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                list.id,
                list.address,
                list.name,
                list.description,
                list.hidden,
                list.locked,
                list.subscribers_only,
                to_json(&list.posters)?,
                to_json(&list.bcc)?,
                now,
            ],
        )
        .map_err(DatabaseError::from)?;
        debug!(id = %list.id, "List created");
        Ok(list)
    }

    /// Overwrite an existing list's definition.
    pub fn modify_list(&self, list: &List) -> Result<List, ListError> {
        let mut list = list.clone();
        if list.address.is_empty() {
            list.address = list.id.clone();
        }

        let conn = self.db.conn();
        let changed = conn
            .execute(
                "UPDATE lists SET address = ?2, name = ?3, description = ?4, hidden = ?5,
                    locked = ?6, subscribers_only = ?7, posters = ?8, bcc = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    list.id,
                    list.address,
                    list.name,
                    list.description,
                    list.hidden,
                    list.locked,
                    list.subscribers_only,
                    to_json(&list.posters)?,
                    to_json(&list.bcc)?,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(ListError::NotFound { address: list.id });
        }
        debug!(id = %list.id, "List modified");
        Ok(list)
    }

    /// Delete a list and all of its subscriptions.
    pub fn delete_list(&self, id: &str) -> Result<(), ListError> {
        let conn = self.db.conn();
        conn.execute("DELETE FROM subscriptions WHERE list_id = ?1", params![id])
            .map_err(DatabaseError::from)?;
        let deleted = conn
            .execute("DELETE FROM lists WHERE id = ?1", params![id])
            .map_err(DatabaseError::from)?;
        if deleted == 0 {
            return Err(ListError::NotFound {
                address: id.to_string(),
            });
        }
        debug!(id = id, "List deleted");
        Ok(())
    }

    /// Lists `address` is subscribed to, ordered by id.
    pub fn subscribed_lists(&self, address: &str) -> Result<Vec<List>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LIST_COLUMNS} FROM lists
             WHERE id IN (SELECT list_id FROM subscriptions WHERE address = ?1)
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![address], row_to_list)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl ListDirectory for ListStore {
    fn lookup_list(&self, address: &str) -> Result<List, ListError> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LIST_COLUMNS} FROM lists WHERE id = ?1 OR address = ?1
                 ORDER BY id = ?1 DESC LIMIT 1"
            ))
            .map_err(DatabaseError::from)?;
        let found = stmt
            .query_row(params![address], row_to_list)
            .optional()
            .map_err(DatabaseError::from)?;
        found.ok_or_else(|| ListError::NotFound {
            address: address.to_string(),
        })
    }

    fn all_lists(&self) -> Result<Vec<List>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!("SELECT {LIST_COLUMNS} FROM lists ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_list)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl SubscriberStore for ListStore {
    fn subscribe(&self, list_id: &str, address: &str) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT OR IGNORE INTO subscriptions (list_id, address, created_at)
             VALUES (?1, ?2, ?3)",
            params![list_id, address, Utc::now().to_rfc3339()],
        )?;
        debug!(list = list_id, address = address, "Subscribed");
        Ok(())
    }

    fn unsubscribe(&self, list_id: &str, address: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.conn();
        let removed = conn.execute(
            "DELETE FROM subscriptions WHERE list_id = ?1 AND address = ?2",
            params![list_id, address],
        )?;
        debug!(list = list_id, address = address, removed, "Unsubscribed");
        Ok(removed > 0)
    }

    fn subscribers(&self, list_id: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT address FROM subscriptions WHERE list_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![list_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn is_subscribed(&self, list_id: &str, address: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.conn();
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE list_id = ?1 AND address = ?2)",
            params![list_id, address],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn to_json(addresses: &[String]) -> Result<String, DatabaseError> {
    Ok(serde_json::to_string(addresses)?)
}

fn from_json(idx: usize, raw: &str) -> Result<Vec<String>, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_list(row: &rusqlite::Row<'_>) -> Result<List, rusqlite::Error> {
    let posters: String = row.get(7)?;
    let bcc: String = row.get(8)?;

    Ok(List {
        id: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        hidden: row.get(4)?,
        locked: row.get(5)?,
        subscribers_only: row.get(6)?,
        posters: from_json(7, &posters)?,
        bcc: from_json(8, &bcc)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
