//! Dataset sources
//!
//! The orchestrator never talks to a backing store directly: it hands a
//! [`FetchRequest`] to a [`DatasetSource`]. [`JsonDirSource`] serves run
//! records from `<location>/<index>.json` files.

use crate::config::DataSourceConfig;
use crate::dataset::RunRecord;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;

/// Everything a source needs to fetch the runs of one test
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub test: &'a str,
    /// Backing index identifier
    pub index: &'a str,
    pub datasource: &'a DataSourceConfig,
    /// Oldest timestamp to consider, `None` for the full history
    pub window_start: Option<i64>,
    /// Run anchoring the end of the comparison
    pub uuid: Option<&'a str>,
    /// Explicit baseline runs; when non-empty they replace the time window
    pub baseline: &'a [String],
}

/// Supplies the runs of a test
pub trait DatasetSource {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<RunRecord>>;
}

/// Reads run records from JSON files, one array per index
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDirSource;

impl JsonDirSource {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetSource for JsonDirSource {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<RunRecord>> {
        let path = request
            .datasource
            .location
            .join(format!("{}.json", request.index));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run records: {}", path.display()))?;
        let runs: Vec<RunRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run records: {}", path.display()))?;

        tracing::debug!(index = request.index, path = %path.display(), runs = runs.len(), "loaded run records");
        scope_runs(runs, request)
    }
}

/// Apply baseline or window scoping to fetched runs
pub fn scope_runs(runs: Vec<RunRecord>, request: &FetchRequest<'_>) -> Result<Vec<RunRecord>> {
    if !request.baseline.is_empty() {
        let mut keep: HashSet<&str> = request.baseline.iter().map(String::as_str).collect();
        keep.extend(request.uuid);
        return Ok(runs
            .into_iter()
            .filter(|run| keep.contains(run.run_id.as_str()))
            .collect());
    }

    let cutoff = match request.uuid {
        Some(uuid) => {
            let anchor = runs
                .iter()
                .find(|run| run.run_id == uuid)
                .with_context(|| format!("Run '{}' not found in index '{}'", uuid, request.index))?;
            Some(anchor.timestamp)
        }
        None => None,
    };

    Ok(runs
        .into_iter()
        .filter(|run| request.window_start.map_or(true, |start| run.timestamp >= start))
        .filter(|run| cutoff.map_or(true, |end| run.timestamp <= end))
        .collect())
}
