/// Applied to every connection before the schema; cascades depend on it.
pub const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

pub const SCHEMA: &str = r#"
-- sources table (id is the MD5 hex of the origin URL or path)
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT,
    file_path TEXT,
    channel_count INTEGER DEFAULT 0,
    program_count INTEGER DEFAULT 0,
    last_updated TIMESTAMP
);

-- channels table (id is the provider channel id)
CREATE TABLE IF NOT EXISTS channels (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    icon TEXT
);

CREATE INDEX IF NOT EXISTS idx_channel_source ON channels(source_id);
CREATE INDEX IF NOT EXISTS idx_channel_name ON channels(name);

-- programs table (id is "{channel_id}_{start}_{stop}")
CREATE TABLE IF NOT EXISTS programs (
    id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    -- raw XMLTV text; TEXT affinity keeps digit-only values intact
    start TEXT NOT NULL,
    stop TEXT NOT NULL,
    category TEXT
);

CREATE INDEX IF NOT EXISTS idx_program_channel ON programs(channel_id);
CREATE INDEX IF NOT EXISTS idx_program_start ON programs(start);
CREATE INDEX IF NOT EXISTS idx_program_stop ON programs(stop);
"#;
