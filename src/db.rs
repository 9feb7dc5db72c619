use crate::cache::{Entry, Store};
use chrono::{DateTime, Utc};
use failure::{Error, ResultExt, format_err};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub fn initialize(path: &Path) -> Result<(), Error> {
    let conn = Connection::open(path)
        .with_context(|_| format!("Can't open: {}", path.display()))?;
    create_tables(&conn)
}

fn create_tables(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "create table if not exists cache (
            key text primary key,
            value text not null,
            updated datetime not null
         )",
        [],
    )?;
    Ok(())
}

/// Cache store kept in a SQLite file, so fetched data outlives the process.
pub struct DbConn {
    conn: Mutex<Connection>
}

impl DbConn {
    pub fn open(path: &Path) -> Result<DbConn, Error> {
        let conn = Connection::open(path)
            .with_context(|_| format!("Can't open: {}", path.display()))?;
        create_tables(&conn)?;
        Ok(DbConn { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<DbConn, Error> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(DbConn { conn: Mutex::new(conn) })
    }

    fn with<T>(&self, job: impl FnOnce(&Connection) -> Result<T, Error>) -> Result<T, Error> {
        let conn = self.conn.lock().map_err(|_| format_err!("db lock poisoned"))?;
        job(&conn)
    }
}

impl Store for DbConn {
    fn load(&self, key: &str) -> Result<Option<Entry>, Error> {
        let row = self.with(|conn| {
            let row = conn.query_row(
                "select value, updated from cache where key = ?1",
                params![key],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            ).optional()?;
            Ok(row)
        })?;
        let (value, updated) = match row {
            None => return Ok(None),
            Some(row) => row
        };
        let stamp = DateTime::parse_from_rfc3339(&updated)
            .with_context(|_| format!("bad timestamp for {}: {}", key, updated))?
            .with_timezone(&Utc);
        Ok(Some(Entry { value, stamp }))
    }

    fn save(&self, key: &str, entry: &Entry) -> Result<(), Error> {
        self.with(|conn| {
            conn.execute(
                "insert or replace into cache (key, value, updated) values (?1, ?2, ?3)",
                params![key, entry.value, entry.stamp.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn purge(&self) -> Result<(), Error> {
        self.with(|conn| {
            conn.execute("delete from cache", [])?;
            Ok(())
        })
    }
}
