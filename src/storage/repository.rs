//! SQLite repository for race, result and qualifying rows

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::schema::create_tables;

/// Errors raised while writing to or reading from the results database
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create database directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open database {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// One grand prix, identified by `{season}_{round}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Race {
    pub race_id: String,
    pub season: String,
    pub round: u32,
    pub race_name: String,
    pub race_date: NaiveDate,
    pub race_time: Option<String>,
}

/// Classified race result for one driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceResult {
    pub result_id: String,
    pub race_id: String,
    pub position: u32,
    pub driver_name: String,
    pub constructor_name: String,
    pub points: u32,
    pub grid: u32,
    pub laps: u32,
    pub status: String,
    pub fastest_lap_time: Option<String>,
    pub fastest_lap_speed: Option<f64>,
}

/// Qualifying classification for one driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifyingResult {
    pub qualifying_id: String,
    pub race_id: String,
    pub position: u32,
    pub driver_name: String,
    pub constructor_name: String,
    pub q1: Option<String>,
    pub q2: Option<String>,
    pub q3: Option<String>,
}

/// A race together with its ordered child rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceGroup<R> {
    pub race: Race,
    pub entries: Vec<R>,
}

/// Rows stored as children of a race
pub trait ChildRecord {
    /// Upsert this row on an open connection or transaction
    fn upsert(&self, conn: &Connection) -> rusqlite::Result<()>;
}

impl ChildRecord for RaceResult {
    fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            r#"
            INSERT INTO results
            (result_id, race_id, position, points, driver_name, constructor_name,
             grid, laps, status, fastest_lap_time, fastest_lap_speed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(result_id) DO UPDATE SET
                race_id = excluded.race_id,
                position = excluded.position,
                points = excluded.points,
                driver_name = excluded.driver_name,
                constructor_name = excluded.constructor_name,
                grid = excluded.grid,
                laps = excluded.laps,
                status = excluded.status,
                fastest_lap_time = excluded.fastest_lap_time,
                fastest_lap_speed = excluded.fastest_lap_speed
            "#,
            params![
                self.result_id,
                self.race_id,
                self.position,
                self.points,
                self.driver_name,
                self.constructor_name,
                self.grid,
                self.laps,
                self.status,
                self.fastest_lap_time,
                self.fastest_lap_speed,
            ],
        )?;
        Ok(())
    }
}

impl ChildRecord for QualifyingResult {
    fn upsert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            r#"
            INSERT INTO qualifying
            (qualifying_id, race_id, position, driver_name, constructor_name, q1, q2, q3)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(qualifying_id) DO UPDATE SET
                race_id = excluded.race_id,
                position = excluded.position,
                driver_name = excluded.driver_name,
                constructor_name = excluded.constructor_name,
                q1 = excluded.q1,
                q2 = excluded.q2,
                q3 = excluded.q3
            "#,
            params![
                self.qualifying_id,
                self.race_id,
                self.position,
                self.driver_name,
                self.constructor_name,
                self.q1,
                self.q2,
                self.q3,
            ],
        )?;
        Ok(())
    }
}

// Every column is overwritten on conflict. `INSERT OR REPLACE` would delete
// the parent row first, which foreign key enforcement rejects once results
// reference it.
fn upsert_race_row(conn: &Connection, race: &Race) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO races
        (race_id, season, round, race_name, race_date, race_time)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(race_id) DO UPDATE SET
            season = excluded.season,
            round = excluded.round,
            race_name = excluded.race_name,
            race_date = excluded.race_date,
            race_time = excluded.race_time
        "#,
        params![
            race.race_id,
            race.season,
            race.round,
            race.race_name,
            race.race_date.to_string(),
            race.race_time,
        ],
    )?;
    Ok(())
}

fn race_from_row(row: &Row<'_>) -> rusqlite::Result<Race> {
    let date_str: String = row.get(4)?;
    let race_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Race {
        race_id: row.get(0)?,
        season: row.get(1)?,
        round: row.get(2)?,
        race_name: row.get(3)?,
        race_date,
        race_time: row.get(5)?,
    })
}

/// Repository for ingested race data
///
/// Holds a single connection for its whole lifetime; the connection is
/// closed when the repository is dropped. Writes take `&mut self`, so
/// sharing across callers needs external serialization.
pub struct RaceRepository {
    conn: Connection,
}

impl RaceRepository {
    /// Open (or create) the database file and make sure the schema exists
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|source| StorageError::Open {
            path: db_path.to_path_buf(),
            source,
        })?;

        Self::with_connection(conn)
    }

    /// Create an in-memory repository (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let repo = Self { conn };
        repo.ensure_schema()?;
        Ok(repo)
    }

    /// Create tables and indexes if they are missing
    pub fn ensure_schema(&self) -> Result<()> {
        create_tables(&self.conn)?;
        Ok(())
    }

    // ==================== Write Operations ====================

    /// Upsert a single race row (autocommit)
    #[allow(dead_code)]
    pub fn upsert_race(&self, race: &Race) -> Result<()> {
        upsert_race_row(&self.conn, race)?;
        Ok(())
    }

    /// Upsert result rows in one transaction
    ///
    /// The referenced races must already be stored.
    #[allow(dead_code)]
    pub fn upsert_results(&mut self, results: &[RaceResult]) -> Result<()> {
        self.upsert_children(results)
    }

    /// Upsert qualifying rows in one transaction
    #[allow(dead_code)]
    pub fn upsert_qualifying(&mut self, rows: &[QualifyingResult]) -> Result<()> {
        self.upsert_children(rows)
    }

    fn upsert_children<R: ChildRecord>(&mut self, rows: &[R]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for row in rows {
            row.upsert(&tx)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store a race and its children atomically
    ///
    /// The race row is written before any child so the foreign key holds,
    /// and the whole group is committed before returning.
    pub fn store_group<R: ChildRecord>(&mut self, group: &RaceGroup<R>) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_race_row(&tx, &group.race)?;
        for entry in &group.entries {
            entry.upsert(&tx)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Query Operations ====================

    /// Check if a race exists
    pub fn race_exists(&self, race_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM races WHERE race_id = ?1",
            [race_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get stored races, optionally restricted to one season
    pub fn get_races(&self, season: Option<&str>) -> Result<Vec<Race>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT race_id, season, round, race_name, race_date, race_time
            FROM races
            WHERE ?1 IS NULL OR season = ?1
            ORDER BY CAST(season AS INTEGER), round
            "#,
        )?;

        let races = stmt
            .query_map([season], race_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(races)
    }

    /// Get results for a race, ordered by finishing position
    pub fn get_race_results(&self, race_id: &str) -> Result<Vec<RaceResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT result_id, race_id, position, driver_name, constructor_name,
                   points, grid, laps, status, fastest_lap_time, fastest_lap_speed
            FROM results
            WHERE race_id = ?1
            ORDER BY position
            "#,
        )?;

        let results = stmt
            .query_map([race_id], |row| {
                Ok(RaceResult {
                    result_id: row.get(0)?,
                    race_id: row.get(1)?,
                    position: row.get(2)?,
                    driver_name: row.get(3)?,
                    constructor_name: row.get(4)?,
                    points: row.get(5)?,
                    grid: row.get(6)?,
                    laps: row.get(7)?,
                    status: row.get(8)?,
                    fastest_lap_time: row.get(9)?,
                    fastest_lap_speed: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    /// Get qualifying rows for a race, ordered by position
    pub fn get_qualifying(&self, race_id: &str) -> Result<Vec<QualifyingResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT qualifying_id, race_id, position, driver_name, constructor_name, q1, q2, q3
            FROM qualifying
            WHERE race_id = ?1
            ORDER BY position
            "#,
        )?;

        let rows = stmt
            .query_map([race_id], |row| {
                Ok(QualifyingResult {
                    qualifying_id: row.get(0)?,
                    race_id: row.get(1)?,
                    position: row.get(2)?,
                    driver_name: row.get(3)?,
                    constructor_name: row.get(4)?,
                    q1: row.get(5)?,
                    q2: row.get(6)?,
                    q3: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Get race count
    pub fn race_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM races")
    }

    /// Get result count
    pub fn result_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM results")
    }

    /// Get qualifying row count
    pub fn qualifying_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM qualifying")
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}
