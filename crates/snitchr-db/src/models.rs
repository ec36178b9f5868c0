/// Database row types. These map directly to SQLite rows.
/// Distinct from snitchr-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct ConfessionRow {
    pub id: String,
    pub message: String,
    pub nickname: Option<String>,
    pub mood: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// JSON-encoded reactions map.
    pub reactions: String,
    /// RFC 3339, UTC, fixed width so it sorts lexicographically.
    pub created_at: String,
}

/// Aggregate counters over the whole collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsRow {
    pub total_confessions: u64,
    pub today_confessions: u64,
    pub total_reactions: u64,
}
