//! Ingestion pipeline: fetch → normalize → store.
//!
//! Seasons and rounds are processed strictly in order. A fetch or
//! normalization failure is recorded in the report and the next item is
//! processed; a storage failure aborts the batch, keeping the groups that
//! were already committed.

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::ergast::{FetchError, NormalizeError, Normalized, ResultKind, ResultNormalizer, ResultSource};
use crate::storage::{ChildRecord, RaceRepository, StorageError};

/// What to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub seasons: Vec<u32>,
    /// Rounds to fetch in every season; `None` fetches whole seasons
    pub rounds: Option<Vec<u32>>,
    pub qualifying: bool,
}

impl IngestRequest {
    /// Reject requests that would silently do nothing
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.seasons.is_empty() {
            return Err(IngestError::InvalidRequest(
                "at least one season is required".to_string(),
            ));
        }
        if matches!(&self.rounds, Some(rounds) if rounds.is_empty()) {
            return Err(IngestError::InvalidRequest(
                "round list must not be empty when given; omit it to fetch whole seasons"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn kind(&self) -> ResultKind {
        ResultKind::from_qualifying_flag(self.qualifying)
    }

    /// (season, round) pairs in processing order
    fn targets(&self) -> Vec<(u32, Option<u32>)> {
        self.seasons
            .iter()
            .flat_map(|&season| match &self.rounds {
                Some(rounds) => rounds
                    .iter()
                    .map(|&round| (season, Some(round)))
                    .collect::<Vec<_>>(),
                None => vec![(season, None)],
            })
            .collect()
    }
}

/// Errors that abort a whole batch
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingest request: {0}")]
    InvalidRequest(String),
    #[error("failed to store race {race_id}")]
    Storage {
        race_id: String,
        #[source]
        source: StorageError,
    },
}

/// Why a single season/round produced no (or fewer) rows
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// A season, round or race that could not be ingested
#[derive(Debug)]
pub struct IngestFailure {
    pub season: u32,
    pub round: Option<u32>,
    /// Set when a single race inside a document was skipped
    pub race_id: Option<String>,
    pub error: ItemError,
}

impl std::fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "season {}", self.season)?;
        if let Some(round) = self.round {
            write!(f, " round {}", round)?;
        }
        if let Some(race_id) = &self.race_id {
            write!(f, " (race {})", race_id)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Summary of one ingestion batch
#[derive(Debug, Default)]
pub struct IngestReport {
    pub races_stored: usize,
    pub entries_stored: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run one ingestion batch against `source`, writing into `repo`
pub fn ingest_results<S: ResultSource>(
    source: &S,
    repo: &mut RaceRepository,
    request: &IngestRequest,
) -> Result<IngestReport, IngestError> {
    request.validate()?;

    let kind = request.kind();
    let mut report = IngestReport::default();

    for (season, round) in request.targets() {
        let document = match source.fetch(season, round, kind) {
            Ok(document) => document,
            Err(e) => {
                warn!("Skipping season {} round {:?}: {}", season, round, e);
                report.failures.push(IngestFailure {
                    season,
                    round,
                    race_id: None,
                    error: e.into(),
                });
                continue;
            }
        };

        // A single-round document is a one-race table; both paths share the normalizer
        let stored = match kind {
            ResultKind::Race => store_document(
                repo,
                &document,
                ResultNormalizer::normalize_results,
                season,
                round,
                &mut report,
            )?,
            ResultKind::Qualifying => store_document(
                repo,
                &document,
                ResultNormalizer::normalize_qualifying,
                season,
                round,
                &mut report,
            )?,
        };

        info!(
            "Stored {} {} race(s) for season {}{}",
            stored,
            kind,
            season,
            round.map(|r| format!(" round {}", r)).unwrap_or_default()
        );
    }

    Ok(report)
}

fn store_document<R: ChildRecord>(
    repo: &mut RaceRepository,
    document: &Value,
    normalize: fn(&Value) -> Result<Normalized<R>, NormalizeError>,
    season: u32,
    round: Option<u32>,
    report: &mut IngestReport,
) -> Result<usize, IngestError> {
    let normalized = match normalize(document) {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("Discarding response for season {}: {}", season, e);
            report.failures.push(IngestFailure {
                season,
                round,
                race_id: None,
                error: e.into(),
            });
            return Ok(0);
        }
    };

    for skipped in normalized.skipped {
        report.failures.push(IngestFailure {
            season,
            round,
            race_id: skipped.race_id,
            error: skipped.error.into(),
        });
    }

    let mut stored = 0;
    for group in &normalized.groups {
        repo.store_group(group).map_err(|source| IngestError::Storage {
            race_id: group.race.race_id.clone(),
            source,
        })?;
        stored += 1;
        report.races_stored += 1;
        report.entries_stored += group.entries.len();
    }

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Canned documents keyed by request; a missing key answers 404
    #[derive(Default)]
    struct StubSource {
        documents: HashMap<(u32, Option<u32>, ResultKind), Value>,
        calls: RefCell<Vec<(u32, Option<u32>, ResultKind)>>,
    }

    impl StubSource {
        fn with(mut self, season: u32, round: Option<u32>, kind: ResultKind, document: Value) -> Self {
            self.documents.insert((season, round, kind), document);
            self
        }
    }

    impl ResultSource for StubSource {
        fn fetch(&self, season: u32, round: Option<u32>, kind: ResultKind) -> Result<Value, FetchError> {
            self.calls.borrow_mut().push((season, round, kind));
            self.documents
                .get(&(season, round, kind))
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("stub://{}/{:?}", season, round),
                    status: 404,
                })
        }
    }

    fn result(position: &str, fastest: bool) -> Value {
        let mut result = json!({
            "position": position,
            "points": "10",
            "Driver": {"givenName": "Lewis", "familyName": "Hamilton"},
            "Constructor": {"name": "Mercedes"},
            "grid": "3",
            "laps": "58",
            "status": "Finished"
        });
        if fastest {
            result["FastestLap"] = json!({"Time": {"time": "1:24.125"}, "AverageSpeed": {"speed": "226.985"}});
        }
        result
    }

    fn season_document(season: &str, races: Vec<(&str, Vec<Value>)>) -> Value {
        let races: Vec<Value> = races
            .into_iter()
            .map(|(round, results)| {
                json!({
                    "season": season,
                    "round": round,
                    "raceName": format!("Round {}", round),
                    "date": format!("{}-04-0{}", season, round),
                    "time": "13:00:00Z",
                    "Results": results
                })
            })
            .collect();
        json!({"MRData": {"RaceTable": {"season": season, "Races": races}}})
    }

    fn request(seasons: Vec<u32>, rounds: Option<Vec<u32>>) -> IngestRequest {
        IngestRequest {
            seasons,
            rounds,
            qualifying: false,
        }
    }

    #[test]
    fn test_empty_seasons_fail_fast() {
        let source = StubSource::default();
        let mut repo = RaceRepository::in_memory().unwrap();

        let err = ingest_results(&source, &mut repo, &request(vec![], None)).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn test_empty_round_list_fails_fast() {
        let source = StubSource::default();
        let mut repo = RaceRepository::in_memory().unwrap();

        let err = ingest_results(&source, &mut repo, &request(vec![2023], Some(vec![]))).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn test_ingest_season() {
        let doc = season_document(
            "2023",
            vec![("1", vec![result("1", true), result("2", false)]), ("2", vec![result("1", false)])],
        );
        let source = StubSource::default().with(2023, None, ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2023], None)).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.races_stored, 2);
        assert_eq!(report.entries_stored, 3);
        assert_eq!(repo.race_count().unwrap(), 2);
        assert_eq!(repo.result_count().unwrap(), 3);

        let results = repo.get_race_results("2023_1").unwrap();
        assert_eq!(results[0].result_id, "2023_1_1");
        assert_eq!(results[0].fastest_lap_speed, Some(226.985));
        assert_eq!(results[1].result_id, "2023_1_2");
        assert_eq!(results[1].fastest_lap_time, None);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let doc = season_document("2023", vec![("1", vec![result("1", true), result("2", false)])]);
        let source = StubSource::default().with(2023, None, ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();
        let req = request(vec![2023], None);

        ingest_results(&source, &mut repo, &req).unwrap();
        let first = repo.get_race_results("2023_1").unwrap();
        ingest_results(&source, &mut repo, &req).unwrap();

        assert_eq!(repo.race_count().unwrap(), 1);
        assert_eq!(repo.result_count().unwrap(), 2);
        assert_eq!(repo.get_race_results("2023_1").unwrap(), first);
    }

    #[test]
    fn test_fetch_failure_writes_nothing_and_continues() {
        let doc = season_document("2022", vec![("1", vec![result("1", false)])]);
        let source = StubSource::default().with(2022, None, ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2021, 2022], None)).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].season, 2021);
        assert!(matches!(
            report.failures[0].error,
            ItemError::Fetch(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(repo.race_count().unwrap(), 1);
        assert!(!repo.race_exists("2021_1").unwrap());
        assert_eq!(source.calls.borrow().len(), 2);
    }

    #[test]
    fn test_race_without_results_is_stored() {
        let doc = season_document("2023", vec![("6", vec![])]);
        let source = StubSource::default().with(2023, None, ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2023], None)).unwrap();

        assert_eq!(report.races_stored, 1);
        assert!(repo.race_exists("2023_6").unwrap());
        assert_eq!(repo.result_count().unwrap(), 0);
    }

    #[test]
    fn test_single_round_reuses_season_normalizer() {
        let doc = season_document("2023", vec![("4", vec![result("1", false)])]);
        let source = StubSource::default().with(2023, Some(4), ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2023], Some(vec![4]))).unwrap();

        assert!(report.is_clean());
        assert_eq!(source.calls.borrow().as_slice(), &[(2023, Some(4), ResultKind::Race)]);
        assert_eq!(repo.get_race_results("2023_4").unwrap().len(), 1);
    }

    #[test]
    fn test_rounds_iterate_per_season() {
        let source = StubSource::default();
        let mut repo = RaceRepository::in_memory().unwrap();

        let report =
            ingest_results(&source, &mut repo, &request(vec![2020, 2021], Some(vec![1, 2]))).unwrap();

        assert_eq!(report.failures.len(), 4);
        assert_eq!(
            source.calls.borrow().as_slice(),
            &[
                (2020, Some(1), ResultKind::Race),
                (2020, Some(2), ResultKind::Race),
                (2021, Some(1), ResultKind::Race),
                (2021, Some(2), ResultKind::Race),
            ]
        );
    }

    #[test]
    fn test_malformed_document_is_reported() {
        let source = StubSource::default().with(2023, None, ResultKind::Race, json!({"MRData": {}}));
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2023], None)).unwrap();

        assert!(matches!(
            report.failures[0].error,
            ItemError::Normalize(NormalizeError::Malformed(_))
        ));
        assert_eq!(repo.race_count().unwrap(), 0);
    }

    #[test]
    fn test_bad_race_is_skipped_others_stored() {
        let mut bad = result("1", false);
        bad["points"] = json!("lots");
        let doc = season_document("2023", vec![("1", vec![bad]), ("2", vec![result("1", false)])]);
        let source = StubSource::default().with(2023, None, ResultKind::Race, doc);
        let mut repo = RaceRepository::in_memory().unwrap();

        let report = ingest_results(&source, &mut repo, &request(vec![2023], None)).unwrap();

        assert_eq!(report.races_stored, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].race_id.as_deref(), Some("2023_1"));
        assert!(!repo.race_exists("2023_1").unwrap());
        assert!(repo.race_exists("2023_2").unwrap());
    }

    #[test]
    fn test_qualifying_goes_to_qualifying_table() {
        let doc = json!({"MRData": {"RaceTable": {"Races": [{
            "season": "2023",
            "round": "1",
            "raceName": "Bahrain Grand Prix",
            "date": "2023-03-05",
            "QualifyingResults": [{
                "position": "1",
                "Driver": {"givenName": "Max", "familyName": "Verstappen"},
                "Constructor": {"name": "Red Bull"},
                "Q1": "1:31.295"
            }]
        }]}}});
        let source = StubSource::default().with(2023, Some(1), ResultKind::Qualifying, doc);
        let mut repo = RaceRepository::in_memory().unwrap();
        let req = IngestRequest {
            seasons: vec![2023],
            rounds: Some(vec![1]),
            qualifying: true,
        };

        let report = ingest_results(&source, &mut repo, &req).unwrap();

        assert!(report.is_clean());
        assert_eq!(repo.qualifying_count().unwrap(), 1);
        assert_eq!(repo.result_count().unwrap(), 0);
        assert_eq!(repo.get_races(None).unwrap()[0].race_time, None);
    }

    #[test]
    fn test_storage_failure_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("database.db");
        let mut repo = RaceRepository::new(&db_path).unwrap();
        {
            let conn = rusqlite::Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_round_two BEFORE INSERT ON results
                 WHEN NEW.race_id = '2023_2'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        }

        let doc = season_document(
            "2023",
            vec![
                ("1", vec![result("1", false)]),
                ("2", vec![result("1", false)]),
                ("3", vec![result("1", false)]),
            ],
        );
        let source = StubSource::default().with(2023, None, ResultKind::Race, doc);

        let err = ingest_results(&source, &mut repo, &request(vec![2023], None)).unwrap_err();

        match err {
            IngestError::Storage { race_id, .. } => assert_eq!(race_id, "2023_2"),
            other => panic!("expected storage error, got {:?}", other),
        }
        let races: Vec<_> = repo
            .get_races(None)
            .unwrap()
            .into_iter()
            .map(|r| r.race_id)
            .collect();
        assert_eq!(races, vec!["2023_1"]);
        assert_eq!(repo.result_count().unwrap(), 1);
    }

    #[test]
    fn test_failure_display() {
        let failure = IngestFailure {
            season: 2023,
            round: Some(2),
            race_id: None,
            error: FetchError::Timeout {
                url: "http://ergast.com/api/f1/2023/2/results.json?limit=1000".to_string(),
            }
            .into(),
        };
        assert_eq!(
            failure.to_string(),
            "season 2023 round 2: request to http://ergast.com/api/f1/2023/2/results.json?limit=1000 timed out"
        );
    }
}
