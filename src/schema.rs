pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

-- One row per (group, week). The payload is the parsed day map as JSON and
-- is overwritten wholesale on every successful re-fetch.
CREATE TABLE IF NOT EXISTS week_cache (
    group_code  TEXT NOT NULL,
    week_start  TEXT NOT NULL,     -- ISO date of the week's Monday
    week_end    TEXT NOT NULL,     -- ISO date of the week's Sunday
    fetched_at  INTEGER NOT NULL,  -- UTC timestamp of the fetch
    payload     TEXT NOT NULL,     -- day map JSON
    PRIMARY KEY (group_code, week_start)
);

-- The watchdog's private last-notified day state, kept separate from
-- week_cache so an interactive refetch can't mask a real change.
CREATE TABLE IF NOT EXISTS watch_snapshots (
    group_code  TEXT NOT NULL,
    day         TEXT NOT NULL,     -- ISO date
    payload     TEXT NOT NULL,     -- DaySchedule JSON
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (group_code, day)
);

-- Fingerprint of the last diff notified per (group, day). At most one
-- notification goes out per distinct diff.
CREATE TABLE IF NOT EXISTS watch_marks (
    group_code  TEXT NOT NULL,
    day         TEXT NOT NULL,     -- ISO date
    fingerprint TEXT NOT NULL,     -- hex sha-256 of the canonical diff
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (group_code, day)
);

-- Operator corrections applied on top of fetched data before diffing.
CREATE TABLE IF NOT EXISTS overlays (
    group_code  TEXT NOT NULL,
    day         TEXT NOT NULL,     -- ISO date
    payload     TEXT NOT NULL,     -- DaySchedule JSON
    PRIMARY KEY (group_code, day)
);

COMMIT;
"#;
