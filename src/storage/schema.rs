//! SQLite schema definitions for ingested results
//!
//! Tables:
//! - races: One row per grand prix (season + round)
//! - results: Classified race results, keyed by race and finishing position
//! - qualifying: Qualifying classification, keyed by race and grid slot

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    // Core race information
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS races (
            race_id TEXT PRIMARY KEY,
            season TEXT NOT NULL,
            round INTEGER NOT NULL,
            race_name TEXT NOT NULL,
            race_date TEXT NOT NULL,
            race_time TEXT
        )
        "#,
        [],
    )?;

    // Race results
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            result_id TEXT PRIMARY KEY,
            race_id TEXT NOT NULL REFERENCES races(race_id),
            position INTEGER NOT NULL,
            points INTEGER NOT NULL,
            driver_name TEXT NOT NULL,
            constructor_name TEXT NOT NULL,
            grid INTEGER NOT NULL,
            laps INTEGER NOT NULL,
            status TEXT NOT NULL,
            fastest_lap_time TEXT,
            fastest_lap_speed REAL
        )
        "#,
        [],
    )?;

    // Qualifying sessions
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS qualifying (
            qualifying_id TEXT PRIMARY KEY,
            race_id TEXT NOT NULL REFERENCES races(race_id),
            position INTEGER NOT NULL,
            driver_name TEXT NOT NULL,
            constructor_name TEXT NOT NULL,
            q1 TEXT,
            q2 TEXT,
            q3 TEXT
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_races_season ON races(season, round)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_race ON results(race_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_qualifying_race ON qualifying(race_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('races', 'results', 'qualifying')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        // Should not fail on second call
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_results_reference_races() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        create_tables(&conn).unwrap();

        let orphan = conn.execute(
            "INSERT INTO results (result_id, race_id, position, points, driver_name,
             constructor_name, grid, laps, status)
             VALUES ('2023_1_1', '2023_1', 1, 25, 'Max Verstappen', 'Red Bull', 1, 57, 'Finished')",
            [],
        );
        assert!(orphan.is_err());
    }
}
