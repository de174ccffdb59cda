#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use openneuro_mirror::config::{Config, ConfigLoader, Settings};
use openneuro_mirror::domain::DatasetId;
use openneuro_mirror::error::MirrorError;
use openneuro_mirror::mosaic::{JobScheduler, MosaicGenerator};
use openneuro_mirror::remote::{MetadataSource, RemoteHost, dataset_source_url};
use openneuro_mirror::vcs::MirrorVcs;

pub fn ids(values: &[&str]) -> Vec<DatasetId> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn settings_in(root: &Utf8Path) -> Settings {
    let config = Config {
        raw_root: Some(root.join("raw").to_string()),
        mosaics_root: Some(root.join("mosaics").to_string()),
        superdataset_root: Some(root.join("derivatives").to_string()),
        ..Config::default()
    };
    ConfigLoader::resolve_config(config).unwrap()
}

#[derive(Default)]
pub struct MockRemote {
    pub missing: HashSet<String>,
    pub unreachable: HashSet<String>,
}

impl MockRemote {
    pub fn missing(values: &[&str]) -> Self {
        Self {
            missing: values.iter().map(|v| v.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl RemoteHost for MockRemote {
    fn source_url(&self, id: &DatasetId) -> String {
        dataset_source_url("https://example.org/datasets", id)
    }

    fn dataset_exists(&self, id: &DatasetId) -> Result<bool, MirrorError> {
        if self.unreachable.contains(id.as_str()) {
            return Err(MirrorError::RemoteHttp("connection refused".to_string()));
        }
        Ok(!self.missing.contains(id.as_str()))
    }
}

/// Simulates datalad. `install` lays down one anatomical image per dataset so
/// that `get` has something to retrieve.
#[derive(Default)]
pub struct MockVcs {
    pub fail_update: HashSet<String>,
    pub fail_install: HashSet<String>,
    pub fail_get: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockVcs {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation} {name}"));
        name
    }
}

impl MirrorVcs for MockVcs {
    fn install(&self, path: &Path, _source: &str) -> Result<(), MirrorError> {
        let name = self.record("install", path);
        if self.fail_install.contains(&name) {
            return Err(MirrorError::Vcs {
                operation: "install".to_string(),
                message: "clone failed".to_string(),
            });
        }
        let anat = path.join("sub-01").join("anat");
        fs::create_dir_all(&anat).unwrap();
        fs::write(anat.join("sub-01_T1w.nii.gz"), b"").unwrap();
        Ok(())
    }

    fn update(&self, path: &Path, _sibling: &str) -> Result<(), MirrorError> {
        let name = self.record("update", path);
        if self.fail_update.contains(&name) {
            return Err(MirrorError::Vcs {
                operation: "update".to_string(),
                message: "merge conflict".to_string(),
            });
        }
        Ok(())
    }

    fn get(&self, dataset: &Path, _files: &[PathBuf]) -> Result<(), MirrorError> {
        let name = self.record("get", dataset);
        if self.fail_get.contains(&name) {
            return Err(MirrorError::Vcs {
                operation: "get".to_string(),
                message: "annex content unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn update_superdataset(&self, path: &Path) -> Result<(), MirrorError> {
        self.record("update-super", path);
        Ok(())
    }
}

pub struct MockMetadata {
    pub table: String,
    pub fetches: Mutex<usize>,
}

impl MockMetadata {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            fetches: Mutex::new(0),
        }
    }
}

impl MetadataSource for MockMetadata {
    fn fetch_table(&self) -> Result<String, MirrorError> {
        *self.fetches.lock().unwrap() += 1;
        Ok(self.table.clone())
    }
}

#[derive(Default)]
pub struct MockGenerator {
    pub fail: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl MosaicGenerator for MockGenerator {
    fn generate(
        &self,
        id: &DatasetId,
        _dataset_dir: &Utf8Path,
        _output: &Utf8Path,
    ) -> Result<(), MirrorError> {
        self.calls.lock().unwrap().push(id.to_string());
        if self.fail.contains(id.as_str()) {
            return Err(MirrorError::MosaicGeneration {
                dataset: id.to_string(),
                message: "no anatomical images".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockScheduler {
    pub fail: bool,
    pub submitted: Mutex<Vec<String>>,
}

impl JobScheduler for MockScheduler {
    fn submit(&self, job_name: &str) -> Result<(), MirrorError> {
        self.submitted.lock().unwrap().push(job_name.to_string());
        if self.fail {
            return Err(MirrorError::Scheduler("sbatch: invalid partition".to_string()));
        }
        Ok(())
    }
}
