//! SQLite storage backend
//!
//! Embedded persistent backend: one database file with node and edge tables,
//! properties stored as JSON columns. Thread-safe via an internal mutex on
//! the connection; WAL mode keeps reads open during writes. The backend is
//! the single writer for its database file.

use super::events::EventLog;
use super::traits::{
    require_primary_key, GraphStore, NodeRecord, Properties, StorageError, StorageResult,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed graph store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    events: EventLog,
}

impl SqliteStore {
    /// Open or create a store at `db_path`, logging mutations to the
    /// JSONL file at `event_log_path`.
    pub fn open(
        db_path: impl AsRef<Path>,
        event_log_path: impl AsRef<Path>,
    ) -> StorageResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            events: EventLog::open(event_log_path.as_ref().to_path_buf())?,
        })
    }

    /// In-memory database with an in-memory event log (tests).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            events: EventLog::in_memory(),
        })
    }

    /// The event log backing this store.
    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                properties_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (source_id) REFERENCES nodes(id),
                FOREIGN KEY (target_id) REFERENCES nodes(id)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_rel_type ON edges(rel_type);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn node_exists(conn: &Connection, id: &str) -> StorageResult<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }
}

impl GraphStore for SqliteStore {
    fn execute(&self, query: &str, params: &Properties) -> StorageResult<Vec<Properties>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let mut stmt = conn.prepare(query)?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let bound: Vec<(String, rusqlite::types::Value)> = params
            .iter()
            .map(|(k, v)| (format!(":{}", k), json_to_sql(v)))
            .collect();
        let named: Vec<(&str, &dyn rusqlite::ToSql)> = bound
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn rusqlite::ToSql))
            .collect();

        let mut rows = stmt.query(named.as_slice())?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Properties::new();
            for (i, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), sql_to_json(row.get_ref(i)?));
            }
            results.push(record);
        }
        Ok(results)
    }

    fn add_node(&self, label: &str, props: Properties) -> StorageResult<String> {
        let node_id = require_primary_key(label, &props)?;
        let props_json = serde_json::to_string(&props)?;

        let conn = self.conn.lock().expect("sqlite lock");
        conn.execute(
            "INSERT INTO nodes (id, label, properties_json) VALUES (?1, ?2, ?3)",
            params![node_id, label, props_json],
        )?;
        drop(conn);

        self.events.append(
            "add_node",
            json!({ "label": label, "properties": props }),
        )?;
        Ok(node_id)
    }

    fn add_edge(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: Properties,
    ) -> StorageResult<String> {
        let props_json = serde_json::to_string(&props)?;
        let edge_id = uuid::Uuid::new_v4().to_string();

        let conn = self.conn.lock().expect("sqlite lock");
        if !Self::node_exists(&conn, from_id)? {
            return Err(StorageError::UnknownEndpoint(from_id.to_string()));
        }
        if !Self::node_exists(&conn, to_id)? {
            return Err(StorageError::UnknownEndpoint(to_id.to_string()));
        }
        conn.execute(
            "INSERT INTO edges (id, source_id, target_id, rel_type, properties_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge_id,
                from_id,
                to_id,
                rel_type,
                props_json,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        drop(conn);

        self.events.append(
            "add_edge",
            json!({
                "from_id": from_id,
                "to_id": to_id,
                "rel_type": rel_type,
                "properties": props,
            }),
        )?;
        Ok(edge_id)
    }

    fn get_node(&self, id: &str) -> StorageResult<Option<NodeRecord>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT label, properties_json FROM nodes WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((label, props_json)) => Ok(Some(NodeRecord {
                label,
                properties: serde_json::from_str(&props_json)?,
            })),
            None => Ok(None),
        }
    }

    fn get_neighbors(&self, id: &str, rel_type: Option<&str>) -> StorageResult<Vec<NodeRecord>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let sql = "SELECT n.label, n.properties_json
             FROM edges e
             JOIN nodes n ON n.id = CASE WHEN e.source_id = ?1 THEN e.target_id ELSE e.source_id END
             WHERE (e.source_id = ?1 OR e.target_id = ?1)
               AND (?2 IS NULL OR e.rel_type = ?2)
             ORDER BY e.rowid";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![id, rel_type], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut neighbors = Vec::new();
        for row in rows {
            let (label, props_json) = row?;
            neighbors.push(NodeRecord {
                label,
                properties: serde_json::from_str(&props_json)?,
            });
        }
        Ok(neighbors)
    }

    fn all_nodes(&self) -> StorageResult<Vec<NodeRecord>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let mut stmt =
            conn.prepare("SELECT label, properties_json FROM nodes ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (label, props_json) = row?;
            nodes.push(NodeRecord {
                label,
                properties: serde_json::from_str(&props_json)?,
            });
        }
        Ok(nodes)
    }

    fn all_edges(&self) -> StorageResult<Vec<super::traits::EdgeRecord>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, rel_type, properties_json
             FROM edges ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (edge_id, from_id, to_id, rel_type, props_json) = row?;
            edges.push(super::traits::EdgeRecord {
                edge_id,
                from_id,
                to_id,
                rel_type,
                properties: serde_json::from_str(&props_json)?,
            });
        }
        Ok(edges)
    }

    fn close(&self) -> StorageResult<()> {
        // Connection closes on drop; checkpoint WAL so readers see a
        // consistent file after shutdown.
        let conn = self.conn.lock().expect("sqlite lock");
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .optional()?;
        Ok(())
    }
}

fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        serde_json::Value::Null => Sql::Null,
        serde_json::Value::Bool(b) => Sql::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn sql_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim_props(id: &str, text: &str) -> Properties {
        let mut props = Properties::new();
        props.insert("claim_id".into(), json!(id));
        props.insert("text".into(), json!(text));
        props
    }

    #[test]
    fn add_and_get_node_round_trips_properties() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .add_node("Claim", claim_props("c1", "stored claim"))
            .unwrap();

        let node = store.get_node("c1").unwrap().unwrap();
        assert_eq!(node.label, "Claim");
        assert_eq!(node.properties["text"], json!("stored claim"));
        assert!(store.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn missing_primary_key_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut props = Properties::new();
        props.insert("text".into(), json!("no id"));
        assert!(matches!(
            store.add_node("Claim", props),
            Err(StorageError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn duplicate_node_id_is_a_database_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_node("Claim", claim_props("c1", "a")).unwrap();
        assert!(matches!(
            store.add_node("Claim", claim_props("c1", "b")),
            Err(StorageError::Database(_))
        ));
    }

    #[test]
    fn edge_requires_both_endpoints() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_node("Claim", claim_props("c1", "a")).unwrap();

        assert!(matches!(
            store.add_edge("c1", "ghost", "RELATES", Properties::new()),
            Err(StorageError::UnknownEndpoint(_))
        ));

        store.add_node("Claim", claim_props("c2", "b")).unwrap();
        store
            .add_edge("c1", "c2", "RELATES", Properties::new())
            .unwrap();
        assert_eq!(store.get_neighbors("c1", None).unwrap().len(), 1);
    }

    #[test]
    fn neighbors_follow_both_directions_with_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, text) in [("c1", "a"), ("c2", "b"), ("c3", "c")] {
            store.add_node("Claim", claim_props(id, text)).unwrap();
        }
        store
            .add_edge("c1", "c2", "RELATES", Properties::new())
            .unwrap();
        store
            .add_edge("c3", "c1", "EXTRACTED_FROM", Properties::new())
            .unwrap();

        assert_eq!(store.get_neighbors("c1", None).unwrap().len(), 2);
        let related = store.get_neighbors("c1", Some("RELATES")).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].properties["claim_id"], json!("c2"));
    }

    #[test]
    fn execute_runs_raw_queries_with_named_params() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_node("Claim", claim_props("c1", "a")).unwrap();
        store.add_node("Claim", claim_props("c2", "b")).unwrap();

        let mut params = Properties::new();
        params.insert("label".into(), json!("Claim"));
        let rows = store
            .execute(
                "SELECT id, label FROM nodes WHERE label = :label ORDER BY id",
                &params,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!("c1"));
    }

    #[test]
    fn mutations_append_to_file_event_log() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("claims.db");
        let log_path = dir.path().join("graph_events.jsonl");

        let store = SqliteStore::open(&db, &log_path).unwrap();
        store.add_node("Claim", claim_props("c1", "a")).unwrap();
        store.add_node("Claim", claim_props("c2", "b")).unwrap();
        store
            .add_edge("c1", "c2", "RELATES", Properties::new())
            .unwrap();

        let records = EventLog::replay(&log_path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].event_type, "add_edge");
        assert_eq!(records[2].payload["rel_type"], json!("RELATES"));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("claims.db");
        let log_path = dir.path().join("graph_events.jsonl");

        {
            let store = SqliteStore::open(&db, &log_path).unwrap();
            store.add_node("Claim", claim_props("c1", "persisted")).unwrap();
            store.close().unwrap();
        }

        let store = SqliteStore::open(&db, &log_path).unwrap();
        let node = store.get_node("c1").unwrap().unwrap();
        assert_eq!(node.properties["text"], json!("persisted"));
    }
}
