//! Reshape Ergast JSON documents into race groups
//!
//! Response layout: `MRData.RaceTable.Races[]`, each race carrying either a
//! `Results[]` or a `QualifyingResults[]` list.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::storage::{QualifyingResult, Race, RaceGroup, RaceResult};

/// Errors raised while normalizing a results document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// The document does not contain a race table; aborts the whole document
    #[error("malformed response: expected {0}")]
    Malformed(String),
    /// A required field is absent; aborts the race it belongs to
    #[error("missing field `{0}`")]
    MissingField(String),
    /// A field has the wrong type or is not numeric; aborts the race it belongs to
    #[error("field `{field}` has invalid value {value}")]
    Coercion { field: String, value: String },
}

/// A race dropped during normalization
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRace {
    pub race_id: Option<String>,
    pub error: NormalizeError,
}

/// Output of normalizing one document
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<R> {
    /// Races in document order
    pub groups: Vec<RaceGroup<R>>,
    pub skipped: Vec<SkippedRace>,
}

impl<R> Default for Normalized<R> {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Normalizer for Ergast results documents
pub struct ResultNormalizer;

impl ResultNormalizer {
    /// Normalize a `results.json` document
    pub fn normalize_results(document: &Value) -> Result<Normalized<RaceResult>, NormalizeError> {
        Self::normalize_with(document, "Results", Self::parse_result)
    }

    /// Normalize a `qualifying.json` document
    pub fn normalize_qualifying(
        document: &Value,
    ) -> Result<Normalized<QualifyingResult>, NormalizeError> {
        Self::normalize_with(document, "QualifyingResults", Self::parse_qualifying)
    }

    fn normalize_with<R>(
        document: &Value,
        list_key: &str,
        parse_entry: fn(&Value, &str) -> Result<R, NormalizeError>,
    ) -> Result<Normalized<R>, NormalizeError> {
        let races = document
            .pointer("/MRData/RaceTable/Races")
            .and_then(Value::as_array)
            .ok_or_else(|| NormalizeError::Malformed("MRData.RaceTable.Races".to_string()))?;

        let mut normalized = Normalized::default();
        for entry in races {
            match Self::parse_group(entry, list_key, parse_entry) {
                Ok(group) => normalized.groups.push(group),
                Err(error) => {
                    let race_id = Self::race_id(entry).ok();
                    warn!(
                        "Skipping race {}: {}",
                        race_id.as_deref().unwrap_or("<unknown>"),
                        error
                    );
                    normalized.skipped.push(SkippedRace { race_id, error });
                }
            }
        }

        Ok(normalized)
    }

    fn parse_group<R>(
        entry: &Value,
        list_key: &str,
        parse_entry: fn(&Value, &str) -> Result<R, NormalizeError>,
    ) -> Result<RaceGroup<R>, NormalizeError> {
        let race = Self::parse_race(entry)?;

        let entries = match entry.get(list_key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| parse_entry(item, &race.race_id))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(NormalizeError::Coercion {
                    field: list_key.to_string(),
                    value: other.to_string(),
                })
            }
        };

        Ok(RaceGroup { race, entries })
    }

    fn race_id(entry: &Value) -> Result<String, NormalizeError> {
        Ok(format!("{}_{}", text(entry, "/season")?, text(entry, "/round")?))
    }

    fn parse_race(entry: &Value) -> Result<Race, NormalizeError> {
        let date = text(entry, "/date")?;
        let race_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            NormalizeError::Coercion {
                field: "date".to_string(),
                value: date.clone(),
            }
        })?;

        Ok(Race {
            race_id: Self::race_id(entry)?,
            season: text(entry, "/season")?,
            round: integer(entry, "/round")?,
            race_name: text(entry, "/raceName")?,
            race_date,
            race_time: optional_text(entry, "/time")?,
        })
    }

    fn parse_result(result: &Value, race_id: &str) -> Result<RaceResult, NormalizeError> {
        let position = position(result)?;

        // FastestLap may be absent, null or an empty string/object
        let (fastest_lap_time, fastest_lap_speed) = if is_present(result.get("FastestLap")) {
            let time = text(result, "/FastestLap/Time/time")?;
            let speed = float(result, "/FastestLap/AverageSpeed/speed")?;
            (Some(time), Some(speed))
        } else {
            (None, None)
        };

        Ok(RaceResult {
            result_id: format!("{}_{}", race_id, position),
            race_id: race_id.to_string(),
            position,
            driver_name: driver_name(result)?,
            constructor_name: text(result, "/Constructor/name")?,
            points: integer(result, "/points")?,
            grid: integer(result, "/grid")?,
            laps: integer(result, "/laps")?,
            status: text(result, "/status")?,
            fastest_lap_time,
            fastest_lap_speed,
        })
    }

    fn parse_qualifying(entry: &Value, race_id: &str) -> Result<QualifyingResult, NormalizeError> {
        let position = position(entry)?;

        Ok(QualifyingResult {
            qualifying_id: format!("{}_{}", race_id, position),
            race_id: race_id.to_string(),
            position,
            driver_name: driver_name(entry)?,
            constructor_name: text(entry, "/Constructor/name")?,
            q1: optional_text(entry, "/Q1")?,
            q2: optional_text(entry, "/Q2")?,
            q3: optional_text(entry, "/Q3")?,
        })
    }
}

/// `/Driver/givenName` -> `Driver.givenName`
fn field_name(pointer: &str) -> String {
    pointer.trim_start_matches('/').replace('/', ".")
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn required<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value, NormalizeError> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Err(NormalizeError::MissingField(field_name(pointer))),
        Some(found) => Ok(found),
    }
}

fn coercion_error(pointer: &str, value: &Value) -> NormalizeError {
    NormalizeError::Coercion {
        field: field_name(pointer),
        value: value.to_string(),
    }
}

fn as_text(value: &Value, pointer: &str) -> Result<String, NormalizeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(coercion_error(pointer, other)),
    }
}

fn text(value: &Value, pointer: &str) -> Result<String, NormalizeError> {
    as_text(required(value, pointer)?, pointer)
}

fn optional_text(value: &Value, pointer: &str) -> Result<Option<String>, NormalizeError> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(found) => as_text(found, pointer).map(Some),
    }
}

fn integer(value: &Value, pointer: &str) -> Result<u32, NormalizeError> {
    let found = required(value, pointer)?;
    let parsed = match found {
        Value::String(s) => s.trim().parse::<u32>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| coercion_error(pointer, found))
}

fn float(value: &Value, pointer: &str) -> Result<f64, NormalizeError> {
    let found = required(value, pointer)?;
    let parsed = match found {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|speed| speed.is_finite())
        .ok_or_else(|| coercion_error(pointer, found))
}

fn position(entry: &Value) -> Result<u32, NormalizeError> {
    match integer(entry, "/position")? {
        0 => Err(coercion_error("/position", &entry["position"])),
        position => Ok(position),
    }
}

fn driver_name(entry: &Value) -> Result<String, NormalizeError> {
    Ok(format!(
        "{} {}",
        text(entry, "/Driver/givenName")?,
        text(entry, "/Driver/familyName")?
    ))
}
