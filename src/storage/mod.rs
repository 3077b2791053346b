//! SQLite storage module for ingested results
//!
//! Persists races as parent rows with race results and qualifying
//! classifications referencing them.

pub mod repository;
pub mod schema;

pub use repository::{
    ChildRecord, QualifyingResult, Race, RaceGroup, RaceRepository, RaceResult, StorageError,
};
