use std::collections::HashSet;
use std::fs;

use camino::Utf8PathBuf;
use chrono::{Days, NaiveDate};

use crate::domain::{DATE_FORMAT, DatasetId};
use crate::error::MirrorError;
use crate::remote::MetadataSource;

const ACCESSION_COLUMN: &str = "accession_number";
const SNAPSHOT_COLUMN: &str = "most_recent_snapshot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSelection {
    Explicit(Vec<String>),
    ListFile(Utf8PathBuf),
    RecentDays(u32),
    Since(NaiveDate),
    Nothing,
}

impl DatasetSelection {
    pub fn from_list_arg(value: &str) -> Self {
        DatasetSelection::Explicit(value.split(',').map(str::to_string).collect())
    }
}

pub fn resolve_datasets(
    selection: &DatasetSelection,
    today: NaiveDate,
    metadata: &dyn MetadataSource,
) -> Result<Vec<DatasetId>, MirrorError> {
    let ids = match selection {
        DatasetSelection::Explicit(values) => parse_ids(values.iter().map(String::as_str))?,
        DatasetSelection::ListFile(path) => {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| MirrorError::Filesystem(format!("read {path}: {err}")))?;
            parse_ids(content.lines())?
        }
        DatasetSelection::RecentDays(days) => {
            datasets_since(&metadata.fetch_table()?, recent_cutoff(today, *days)?)?
        }
        DatasetSelection::Since(cutoff) => datasets_since(&metadata.fetch_table()?, *cutoff)?,
        DatasetSelection::Nothing => Vec::new(),
    };
    Ok(dedup_preserving_order(ids))
}

// The window starts `days` ago at the current time of day, so that date itself is outside.
fn recent_cutoff(today: NaiveDate, days: u32) -> Result<NaiveDate, MirrorError> {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .and_then(|start| start.checked_add_days(Days::new(1)))
        .ok_or_else(|| MirrorError::InvalidDate(format!("{days} days before {today}")))
}

fn parse_ids<'a>(values: impl Iterator<Item = &'a str>) -> Result<Vec<DatasetId>, MirrorError> {
    values
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse::<DatasetId>)
        .collect()
}

pub fn datasets_since(table: &str, cutoff: NaiveDate) -> Result<Vec<DatasetId>, MirrorError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(table.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| MirrorError::MetadataParse(err.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| MirrorError::MetadataParse(format!("missing column {name}")))
    };
    let accession = column(ACCESSION_COLUMN)?;
    let snapshot = column(SNAPSHOT_COLUMN)?;

    let mut out = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| MirrorError::MetadataParse(err.to_string()))?;
        let raw_date = record.get(snapshot).map(str::trim).unwrap_or_default();
        if raw_date.is_empty() {
            continue;
        }
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|_| {
            MirrorError::MetadataParse(format!("row {}: bad snapshot date {raw_date:?}", index + 2))
        })?;
        if date < cutoff {
            continue;
        }
        let raw_id = record.get(accession).map(str::trim).unwrap_or_default();
        match raw_id.parse::<DatasetId>() {
            Ok(id) => out.push(id),
            Err(_) => tracing::warn!(value = raw_id, "skipping metadata row with invalid accession"),
        }
    }
    Ok(out)
}

fn dedup_preserving_order(ids: Vec<DatasetId>) -> Vec<DatasetId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
