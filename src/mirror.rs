use std::collections::BTreeSet;
use std::fs;

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;

use crate::domain::{DatasetId, Pipeline};
use crate::error::MirrorError;
use crate::vcs::MirrorVcs;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MirrorRecord {
    pub dataset: DatasetId,
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorIndex {
    records: BTreeSet<MirrorRecord>,
}

impl MirrorIndex {
    pub fn scan(root: &Utf8Path) -> Result<Self, MirrorError> {
        let entries = fs::read_dir(root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("read {root}: {err}")))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(Self::from_names(names.iter().map(String::as_str)))
    }

    pub fn refresh_and_scan(vcs: &dyn MirrorVcs, root: &Utf8Path) -> Result<Self, MirrorError> {
        if let Err(err) = vcs.update_superdataset(root.as_std_path()) {
            tracing::warn!(root = %root, error = %err, "superdataset refresh failed");
        }
        Self::scan(root)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let pattern = mirror_name_pattern();
        let mut records = BTreeSet::new();
        for name in names {
            match parse_mirror_name(&pattern, name) {
                Some(record) => {
                    records.insert(record);
                }
                None => tracing::debug!(name, "ignoring superdataset entry"),
            }
        }
        Self { records }
    }

    pub fn contains(&self, dataset: &DatasetId, pipeline: Pipeline) -> bool {
        self.records.contains(&MirrorRecord {
            dataset: dataset.clone(),
            pipeline,
        })
    }

    pub fn datasets_for(&self, pipeline: Pipeline) -> BTreeSet<DatasetId> {
        self.records
            .iter()
            .filter(|record| record.pipeline == pipeline)
            .map(|record| record.dataset.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn mirror_name_pattern() -> Regex {
    // Static pattern; compiling it cannot fail.
    Regex::new(r"^(ds\d+)-([A-Za-z0-9_]+)$").unwrap()
}

fn parse_mirror_name(pattern: &Regex, name: &str) -> Option<MirrorRecord> {
    let captures = pattern.captures(name)?;
    let dataset = captures.get(1)?.as_str().parse().ok()?;
    let pipeline = captures.get(2)?.as_str().parse().ok()?;
    Some(MirrorRecord { dataset, pipeline })
}
