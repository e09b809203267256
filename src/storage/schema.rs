//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Linkwatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Sites hosting backlinks
CREATE TABLE IF NOT EXISTS donor_domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    visits TEXT,
    created_at TEXT NOT NULL
);

-- Sites backlinks point at
CREATE TABLE IF NOT EXISTS acceptor_domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Tracked backlink placements
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_url TEXT NOT NULL,
    link_url TEXT NOT NULL,
    anchor TEXT NOT NULL,
    donor_domain_id INTEGER REFERENCES donor_domains(id),
    acceptor_domain_id INTEGER REFERENCES acceptor_domains(id),
    created_at TEXT NOT NULL,
    last_result_id INTEGER,
    last_status TEXT,
    last_message TEXT,
    last_mode TEXT,
    last_checked_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_links_last_status ON links(last_status);
CREATE INDEX IF NOT EXISTS idx_links_created_at ON links(created_at);

-- Immutable outcome of one verification pass
CREATE TABLE IF NOT EXISTS check_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id INTEGER NOT NULL REFERENCES links(id),
    status TEXT NOT NULL,
    message TEXT NOT NULL,
    status_codes TEXT NOT NULL,
    redirect_url TEXT,
    matching_anchor_count INTEGER NOT NULL DEFAULT 0,
    total_anchor_count INTEGER NOT NULL DEFAULT 0,
    off_domain_anchor_count INTEGER NOT NULL DEFAULT 0,
    has_rel INTEGER NOT NULL DEFAULT 0,
    rel_nofollow INTEGER NOT NULL DEFAULT 0,
    rel_sponsored INTEGER NOT NULL DEFAULT 0,
    robots_noindex INTEGER NOT NULL DEFAULT 0,
    robots_nofollow INTEGER NOT NULL DEFAULT 0,
    anchor_text_found TEXT,
    mode TEXT NOT NULL,
    proxy_label TEXT,
    created_at TEXT NOT NULL,
    ssl_expires_at TEXT,
    ssl_days_left INTEGER
);

CREATE INDEX IF NOT EXISTS idx_check_results_link ON check_results(link_id);

-- Country and language tags
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    ref_property TEXT NOT NULL,
    UNIQUE(name, ref_property)
);

CREATE TABLE IF NOT EXISTS donor_domain_tags (
    domain_id INTEGER NOT NULL REFERENCES donor_domains(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (domain_id, tag_id)
);

-- Donor domains awaiting a tagging probe
CREATE TABLE IF NOT EXISTS pending_domains (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id INTEGER NOT NULL UNIQUE
);

-- Single-row drain flag of the tagger
CREATE TABLE IF NOT EXISTS tagger_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);

-- Work consumed by worker processes
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
