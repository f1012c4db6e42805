use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::config::Config;
use crate::state::unix_timestamp;

#[derive(Debug, Clone)]
pub struct RunEntry {
    pub id: i64,
    pub topic: String,
    pub report: String,
    pub created_at: i64,
}

fn default_db_path() -> PathBuf {
    Config::get_config_dir().join("history.sqlite")
}

fn open(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            report TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(conn)
}

pub fn add_run(topic: &str, report: &str) -> anyhow::Result<()> {
    add_run_at(&default_db_path(), topic, report)
}

pub fn add_run_at(path: &Path, topic: &str, report: &str) -> anyhow::Result<()> {
    let conn = open(path)?;
    conn.execute(
        "INSERT INTO runs (topic, report, created_at) VALUES (?1, ?2, ?3)",
        params![topic, report, unix_timestamp()],
    )?;
    Ok(())
}

pub fn list_runs(limit: usize) -> anyhow::Result<Vec<RunEntry>> {
    list_runs_at(&default_db_path(), limit)
}

pub fn list_runs_at(path: &Path, limit: usize) -> anyhow::Result<Vec<RunEntry>> {
    let conn = open(path)?;
    let mut stmt = conn.prepare(
        "SELECT id, topic, report, created_at
         FROM runs
         ORDER BY created_at DESC, id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok(RunEntry {
            id: row.get(0)?,
            topic: row.get(1)?,
            report: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        if let Ok(entry) = row {
            entries.push(entry);
        }
    }
    Ok(entries)
}

pub fn delete_run_at(path: &Path, id: i64) -> anyhow::Result<()> {
    let conn = open(path)?;
    conn.execute("DELETE FROM runs WHERE id = ?1", params![id])?;
    Ok(())
}
