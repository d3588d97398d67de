pub const SCHEMA: &str = r#"
-- Registered identities; namespace_id keys the on-disk track directory
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,       -- argon2id hash with embedded salt
    namespace_id TEXT NOT NULL UNIQUE, -- 32 hex chars, never regenerated
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Per-namespace sequence counter; only ever increases
CREATE TABLE IF NOT EXISTS track_sequences (
    namespace_id TEXT PRIMARY KEY REFERENCES users(namespace_id) ON DELETE CASCADE,
    last_seq INTEGER NOT NULL
);

-- Stable creation-order ids for stored tracks
CREATE TABLE IF NOT EXISTS track_records (
    namespace_id TEXT NOT NULL REFERENCES users(namespace_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (namespace_id, seq),
    UNIQUE (namespace_id, name)
);

CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
CREATE INDEX IF NOT EXISTS idx_track_records_namespace ON track_records(namespace_id);
"#;
