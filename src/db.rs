// 🗄️ Catalog Store - SQLite-backed CatalogAccessor
//
// Tables:
//   categories     - product categories (Import needs at least one)
//   local_records  - catalog products, optionally linked to a ledger id
//   events         - append-only audit trail, one event per write
//
// Prices are stored as TEXT so decimals survive the round trip exactly.

use crate::ports::CatalogAccessor;
use crate::records::{Category, LocalRecord, LocalRecordPatch, NewLocalRecord, RecordStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS local_records (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price TEXT NOT NULL,
            status TEXT NOT NULL,
            ledger_id TEXT,
            category_id TEXT REFERENCES categories(id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_local_ledger_id ON local_records(ledger_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

const LOCAL_COLUMNS: &str = "id, name, price, status, ledger_id, category_id";

fn local_from_row(row: &Row<'_>) -> rusqlite::Result<LocalRecord> {
    let price_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;

    Ok(LocalRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        price: Decimal::from_str(&price_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        status: RecordStatus::from_str(&status_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
        })?,
        ledger_id: row.get(4)?,
        category_id: row.get(5)?,
    })
}

pub fn get_local_record(conn: &Connection, id: &str) -> Result<Option<LocalRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM local_records WHERE id = ?1", LOCAL_COLUMNS),
            params![id],
            local_from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn get_all_local_records(conn: &Connection) -> Result<Vec<LocalRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM local_records ORDER BY id",
        LOCAL_COLUMNS
    ))?;

    let records = stmt
        .query_map([], local_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn get_all_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name, id")?;

    let categories = stmt
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

// ============================================================================
// SQLITE CATALOG
// ============================================================================

/// Catalog store over a single SQLite connection
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
    /// Recorded as the actor on audit events
    actor: String,
}

impl SqliteCatalog {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open catalog database {:?}", db_path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to initialize catalog schema")?;
        Ok(SqliteCatalog {
            conn: Arc::new(Mutex::new(conn)),
            actor: "operator".to_string(),
        })
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("catalog connection lock poisoned"))
    }

    pub fn add_category(&self, name: &str) -> Result<Category> {
        let category = Category::new(name.trim());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO categories (id, name) VALUES (?1, ?2)",
            params![category.id, category.name],
        )
        .with_context(|| format!("Failed to create category {:?}", category.name))?;

        insert_event(
            &conn,
            &Event::new(
                "category_created",
                "category",
                &category.id,
                serde_json::json!({ "name": category.name }),
                &self.actor,
            ),
        )?;
        Ok(category)
    }

    pub fn insert_local_record(&self, fields: NewLocalRecord) -> Result<LocalRecord> {
        let record = LocalRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: fields.name,
            price: fields.price,
            status: fields.status,
            ledger_id: fields.ledger_id,
            category_id: fields.category_id,
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO local_records (id, name, price, status, ledger_id, category_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.name,
                record.price.to_string(),
                record.status.as_str(),
                record.ledger_id,
                record.category_id,
            ],
        )
        .with_context(|| format!("Failed to insert local record {:?}", record.name))?;

        insert_event(
            &tx,
            &Event::new(
                "local_record_created",
                "local_record",
                &record.id,
                serde_json::to_value(&record)?,
                &self.actor,
            ),
        )?;
        tx.commit()?;

        debug!(id = %record.id, ledger_id = ?record.ledger_id, "local record created");
        Ok(record)
    }

    pub fn apply_patch(&self, id: &str, patch: LocalRecordPatch) -> Result<LocalRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut record = get_local_record(&tx, id)?
            .ok_or_else(|| anyhow!("local record {} does not exist", id))?;
        patch.apply_to(&mut record);

        tx.execute(
            "UPDATE local_records
             SET name = ?2, price = ?3, status = ?4, ledger_id = ?5,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![
                record.id,
                record.name,
                record.price.to_string(),
                record.status.as_str(),
                record.ledger_id,
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "local_record_updated",
                "local_record",
                &record.id,
                serde_json::to_value(&patch)?,
                &self.actor,
            ),
        )?;
        tx.commit()?;

        debug!(id = %record.id, "local record updated");
        Ok(record)
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        get_events_for_entity(&conn, entity_type, entity_id)
    }
}

#[async_trait]
impl CatalogAccessor for SqliteCatalog {
    async fn list_local_records(&self) -> Result<Vec<LocalRecord>> {
        let conn = self.lock()?;
        get_all_local_records(&conn)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.lock()?;
        get_all_categories(&conn)
    }

    async fn create_local_record(&self, fields: NewLocalRecord) -> Result<LocalRecord> {
        self.insert_local_record(fields)
    }

    async fn update_local_record(&self, id: &str, fields: LocalRecordPatch) -> Result<LocalRecord> {
        self.apply_patch(id, fields)
    }
}

// ============================================================================
// TESTS
// ============================================================================
