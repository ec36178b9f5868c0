use crate::models::{ConfessionRow, StatsRow};
use crate::Database;
use anyhow::Result;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use snitchr_types::api::FilterKind;

const CONFESSION_COLUMNS: &str =
    "id, message, nickname, mood, latitude, longitude, reactions, created_at";

const HEART: &str = "COALESCE(json_extract(reactions, '$.heart.count'), 0)";
const LAUGH: &str = "COALESCE(json_extract(reactions, '$.laugh.count'), 0)";
const THINK: &str = "COALESCE(json_extract(reactions, '$.think.count'), 0)";

impl Database {
    // -- Confessions --

    pub fn insert_confession(&self, row: &ConfessionRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO confessions (id, message, nickname, mood, latitude, longitude, reactions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.message,
                    row.nickname,
                    row.mood,
                    row.latitude,
                    row.longitude,
                    row.reactions,
                    row.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_confession(&self, id: &str) -> Result<Option<ConfessionRow>> {
        self.with_conn(|conn| query_confession(conn, id))
    }

    /// One page of confessions plus the number of rows matching the query
    /// across all pages.
    pub fn list_confessions(
        &self,
        search: Option<&str>,
        filter: FilterKind,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<ConfessionRow>, u64)> {
        self.with_conn(|conn| query_confessions(conn, search, filter, offset, limit))
    }

    /// Replace the reactions map. Returns the updated row, or `None` if the
    /// id does not exist.
    pub fn update_reactions(&self, id: &str, reactions_json: &str) -> Result<Option<ConfessionRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE confessions SET reactions = ?2 WHERE id = ?1",
                rusqlite::params![id, reactions_json],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_confession(conn, id)
        })
    }

    /// Delete a confession, returning its last state, or `None` if missing.
    pub fn delete_confession(&self, id: &str) -> Result<Option<ConfessionRow>> {
        self.with_conn(|conn| {
            let Some(row) = query_confession(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM confessions WHERE id = ?1", [id])?;
            Ok(Some(row))
        })
    }

    /// `today_start` is an RFC 3339 UTC timestamp in the same format as
    /// `created_at`.
    pub fn stats(&self, today_start: &str) -> Result<StatsRow> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN created_at >= ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM({HEART} + {LAUGH} + {THINK}), 0)
                 FROM confessions"
            );
            let row = conn.query_row(&sql, [today_start], |row| {
                Ok(StatsRow {
                    total_confessions: row.get::<_, i64>(0)? as u64,
                    today_confessions: row.get::<_, i64>(1)? as u64,
                    total_reactions: row.get::<_, i64>(2)? as u64,
                })
            })?;
            Ok(row)
        })
    }

    // -- Analytics --

    pub fn record_event(&self, event_type: &str, event_data: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO analytics (event_type, event_data) VALUES (?1, ?2)",
                (event_type, event_data),
            )?;
            Ok(())
        })
    }

    pub fn count_events(&self, event_type: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM analytics WHERE event_type = ?1",
                [event_type],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }
}

fn map_confession(row: &Row<'_>) -> rusqlite::Result<ConfessionRow> {
    Ok(ConfessionRow {
        id: row.get(0)?,
        message: row.get(1)?,
        nickname: row.get(2)?,
        mood: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        reactions: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_confession(conn: &Connection, id: &str) -> Result<Option<ConfessionRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {CONFESSION_COLUMNS} FROM confessions WHERE id = ?1"))?;

    let row = stmt.query_row([id], map_confession).optional()?;

    Ok(row)
}

fn query_confessions(
    conn: &Connection,
    search: Option<&str>,
    filter: FilterKind,
    offset: u64,
    limit: u32,
) -> Result<(Vec<ConfessionRow>, u64)> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        // LIKE only folds ASCII, so both sides are lowercased up front
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        clauses.push(
            "(fold_case(message) LIKE ? ESCAPE '\\' OR fold_case(nickname) LIKE ? ESCAPE '\\')".to_string(),
        );
        args.push(Value::Text(pattern.clone()));
        args.push(Value::Text(pattern));
    }

    match filter {
        FilterKind::WithReactions => {
            clauses.push(format!("({HEART} > 0 OR {LAUGH} > 0 OR {THINK} > 0)"));
        }
        FilterKind::WithoutReactions => {
            clauses.push(format!("({HEART} = 0 AND {LAUGH} = 0 AND {THINK} = 0)"));
        }
        FilterKind::All | FilterKind::Popular => {}
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let order_sql = match filter {
        FilterKind::Popular => format!("ORDER BY {HEART} DESC, created_at DESC"),
        _ => "ORDER BY created_at DESC".to_string(),
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM confessions {where_sql}"),
        rusqlite::params_from_iter(args.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {CONFESSION_COLUMNS} FROM confessions {where_sql} {order_sql} LIMIT ? OFFSET ?"
    );
    args.push(Value::Integer(i64::from(limit)));
    args.push(Value::Integer(offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), map_confession)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total as u64))
}

/// Registers `fold_case(text)`, Unicode lowercasing for search. NULL stays
/// NULL.
pub(crate) fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
