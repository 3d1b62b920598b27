//! v002 -- Searchable usernames on profiles.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE profiles ADD COLUMN username TEXT;   -- lowercased, trimmed

CREATE INDEX IF NOT EXISTS idx_profiles_username ON profiles(username);
"#;

/// Apply the username migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
