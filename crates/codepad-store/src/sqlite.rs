//! The SQLite-backed snippet store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, StoreError};
use crate::schema;
use crate::snippet::Snippet;

/// Reserved id of the seeded default snippet. It exists for the life of
/// the store, its name is immutable, and it cannot be deleted.
pub const DEFAULT_ID: i64 = 1;

/// Name of the default snippet.
pub const DEFAULT_NAME: &str = "Default snippet";

/// File name of the snippet database inside the data directory.
pub const DB_FILE: &str = "snippets.db";

const DEFAULT_CODE: &str =
    "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello, 世界\")\n}\n";

const SELECT_COLUMNS: &str = "id, created, modified, name, code";

/// Persistent snippet store.
///
/// Two orderings are maintained in SQLite (the primary key and a
/// `(modified, id)` composite index); a lowered-name map is kept in
/// memory to power relevance queries, rebuilt from the table at open and
/// updated only after a write commits.
pub struct SnippetStore {
    conn: Mutex<Connection>,
    /// Highest id ever allocated; ids strictly increase and are never
    /// reused, even across deletes.
    last_id: AtomicI64,
    names: Mutex<HashMap<i64, String>>,
    clock: fn() -> DateTime<Utc>,
}

impl SnippetStore {
    /// Open (or create) the store inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::from_connection(schema::open_database(&data_dir.join(DB_FILE))?)
    }

    /// Open an in-memory store (for tests).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(schema::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            last_id: AtomicI64::new(0),
            names: Mutex::new(HashMap::new()),
            clock: Utc::now,
        };
        store.bootstrap()?;
        Ok(store)
    }

    /// Override the time source. Timestamps assigned by the store come
    /// from this clock; tests pin it to fixed instants.
    #[doc(hidden)]
    pub fn set_clock(&mut self, clock: fn() -> DateTime<Utc>) {
        self.clock = clock;
    }

    /// Rebuild the name cache and the id counter; seed the default
    /// snippet on a fresh database.
    fn bootstrap(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut names = HashMap::new();
        let mut last_id = 0i64;
        {
            let mut stmt = conn.prepare("SELECT id, name FROM snippets ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, name) = row?;
                names.insert(id, name.to_lowercase());
                last_id = id;
            }
        }
        if last_id == 0 {
            conn.execute(
                "INSERT INTO snippets (id, created, modified, name, code) \
                 VALUES (?1, 0, 0, ?2, ?3)",
                params![DEFAULT_ID, DEFAULT_NAME, DEFAULT_CODE],
            )?;
            names.insert(DEFAULT_ID, DEFAULT_NAME.to_lowercase());
            last_id = DEFAULT_ID;
            tracing::info!("seeded default snippet");
        }
        self.last_id.store(last_id, Ordering::SeqCst);
        *self.names.lock().unwrap() = names;
        Ok(())
    }

    fn now_nanos(&self) -> i64 {
        (self.clock)().timestamp_nanos_opt().unwrap_or(0)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Snippet> {
        Ok(Snippet {
            id: row.get(0)?,
            created: Some(DateTime::from_timestamp_nanos(row.get::<_, i64>(1)?)),
            modified: Some(DateTime::from_timestamp_nanos(row.get::<_, i64>(2)?)),
            name: row.get(3)?,
            code: row.get(4)?,
        })
    }

    /// Create a new snippet. The id must be unset and the name non-empty.
    /// Returns the stored record with its assigned id and timestamps.
    pub fn create(&self, s: &Snippet) -> Result<Snippet> {
        if s.name.is_empty() {
            return Err(StoreError::bad_request("snippet name cannot be empty"));
        }
        if s.id != 0 {
            return Err(StoreError::bad_request(
                "cannot assign ID when creating snippet",
            ));
        }
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.now_nanos();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO snippets (id, created, modified, name, code) \
                 VALUES (?1, ?2, ?2, ?3, ?4)",
                params![id, now, s.name, s.code],
            )?;
        }
        self.names.lock().unwrap().insert(id, s.name.to_lowercase());
        let stamp = Some(DateTime::from_timestamp_nanos(now));
        Ok(Snippet {
            id,
            created: stamp,
            modified: stamp,
            name: s.name.clone(),
            code: s.code.clone(),
        })
    }

    /// Retrieve a snippet by id.
    pub fn retrieve(&self, id: i64) -> Result<Snippet> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM snippets WHERE id = ?1"),
            params![id],
            Self::from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Update the snippet at `id`, overlaying non-empty `name` and `code`
    /// and advancing its modification time.
    ///
    /// The id inside `s` is optional but must match `id` when present.
    /// The default snippet's name and all timestamps are off limits.
    pub fn update(&self, s: &Snippet, id: i64) -> Result<()> {
        if s.id == 0 && id == 0 {
            return Err(StoreError::bad_request("cannot update snippet with ID: 0"));
        }
        if s.id > 0 && s.id != id {
            return Err(StoreError::bad_request(format!(
                "snippet IDs do not match: {} != {}",
                id, s.id
            )));
        }
        if id == DEFAULT_ID && !s.name.is_empty() && s.name != DEFAULT_NAME {
            return Err(StoreError::bad_request("cannot change default snippet name"));
        }
        if s.created.is_some() || s.modified.is_some() {
            return Err(StoreError::bad_request(
                "cannot set modified or created times",
            ));
        }
        let now = self.now_nanos();
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    "SELECT name, code FROM snippets WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            let name = if s.name.is_empty() {
                existing.0
            } else {
                s.name.clone()
            };
            let code = if s.code.is_empty() {
                existing.1
            } else {
                s.code.clone()
            };
            tx.execute(
                "UPDATE snippets SET name = ?2, code = ?3, modified = ?4 WHERE id = ?1",
                params![id, name, code, now],
            )?;
            tx.commit()?;
        }
        if !s.name.is_empty() {
            self.names.lock().unwrap().insert(id, s.name.to_lowercase());
        }
        Ok(())
    }

    /// Delete a snippet by id. The default snippet cannot be deleted.
    pub fn delete(&self, id: i64) -> Result<()> {
        if id == 0 || id == DEFAULT_ID {
            return Err(StoreError::bad_request(format!(
                "cannot delete snippet (ID: {id})"
            )));
        }
        let affected = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM snippets WHERE id = ?1", params![id])?
        };
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.names.lock().unwrap().remove(&id);
        Ok(())
    }

    /// List snippets with ids greater than `after_id`, ascending. A
    /// negative limit means no bound.
    pub fn query_by_id(&self, after_id: i64, limit: i64) -> Result<Vec<Snippet>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM snippets WHERE id > ?1 ORDER BY id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![after_id, limit], Self::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// List snippets strictly older than the `(before_time, before_id)`
    /// cursor in descending `(modified, id)` order. A cursor of
    /// `(None, 0)` means "newest first". A negative limit means no bound.
    pub fn query_by_modified(
        &self,
        before_time: Option<DateTime<Utc>>,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<Snippet>> {
        let conn = self.conn.lock().unwrap();
        let rows = if before_time.is_none() && before_id == 0 {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM snippets \
                 ORDER BY modified DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], Self::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            // An explicit epoch cursor is a real cursor, not "no cursor";
            // nothing predates the epoch-stamped default snippet, so it
            // correctly yields nothing.
            let nanos = before_time
                .map(|t| t.timestamp_nanos_opt().unwrap_or(0))
                .unwrap_or(0);
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM snippets \
                 WHERE modified < ?1 OR (modified = ?1 AND id < ?2) \
                 ORDER BY modified DESC, id DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![nanos, before_id, limit], Self::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    /// List snippets whose names match `query`, most relevant first.
    ///
    /// The query is split on spaces into lowercase terms; a name scores
    /// the total count of term occurrences and names scoring zero are
    /// dropped. An empty query matches everything.
    pub fn query_by_name(&self, query: &str, limit: i64) -> Result<Vec<Snippet>> {
        struct Match {
            id: i64,
            score: i64,
            name: String,
        }

        let lowered = query.to_lowercase();
        let mut terms: Vec<&str> = lowered.split(' ').filter(|t| !t.is_empty()).collect();
        if query.is_empty() {
            terms = vec![""];
        }

        let mut matches: Vec<Match> = Vec::new();
        {
            let names = self.names.lock().unwrap();
            for (&id, name) in names.iter() {
                let score: i64 = terms.iter().map(|t| count_occurrences(name, t)).sum();
                if score > 0 {
                    matches.push(Match {
                        id,
                        score,
                        name: name.clone(),
                    });
                }
            }
        }
        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| b.id.cmp(&a.id))
        });
        if limit >= 0 && matches.len() > limit as usize {
            matches.truncate(limit as usize);
        }

        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            match self.retrieve(m.id) {
                Ok(s) => out.push(s),
                // Deleted between scoring and lookup; skip.
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`; the empty
/// needle matches between every character.
fn count_occurrences(haystack: &str, needle: &str) -> i64 {
    if needle.is_empty() {
        return haystack.chars().count() as i64 + 1;
    }
    let mut count = 0;
    let mut pos = 0;
    while let Some(i) = haystack[pos..].find(needle) {
        count += 1;
        pos += i + needle.len();
    }
    count
}
