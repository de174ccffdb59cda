use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{DatasetId, FetchOutcome};
use crate::error::MirrorError;
use crate::fs_util;
use crate::remote::RemoteHost;
use crate::vcs::MirrorVcs;

const ORIGIN: &str = "origin";

#[derive(Debug, Clone, Serialize)]
pub struct FetchRecord {
    pub dataset: DatasetId,
    pub outcome: FetchOutcome,
    pub detail: Option<String>,
}

impl FetchRecord {
    fn ok(dataset: &DatasetId, outcome: FetchOutcome) -> Self {
        Self {
            dataset: dataset.clone(),
            outcome,
            detail: None,
        }
    }

    fn failed(dataset: &DatasetId, outcome: FetchOutcome, err: &MirrorError) -> Self {
        Self {
            dataset: dataset.clone(),
            outcome,
            detail: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub records: Vec<FetchRecord>,
    pub surviving: Vec<DatasetId>,
}

impl FetchReport {
    pub fn failed_install(&self) -> Vec<DatasetId> {
        self.with_outcome(|outcome| {
            matches!(
                outcome,
                FetchOutcome::RemoteMissing | FetchOutcome::InstallFailed
            )
        })
    }

    pub fn failed_get(&self) -> Vec<DatasetId> {
        self.with_outcome(|outcome| outcome == FetchOutcome::RetrieveFailed)
    }

    fn with_outcome(&self, pred: impl Fn(FetchOutcome) -> bool) -> Vec<DatasetId> {
        self.records
            .iter()
            .filter(|record| pred(record.outcome))
            .map(|record| record.dataset.clone())
            .collect()
    }
}

pub struct FetchPipeline<R: RemoteHost, V: MirrorVcs> {
    remote: R,
    vcs: V,
    raw_root: Utf8PathBuf,
}

impl<R: RemoteHost, V: MirrorVcs> FetchPipeline<R, V> {
    pub fn new(remote: R, vcs: V, raw_root: Utf8PathBuf) -> Self {
        Self {
            remote,
            vcs,
            raw_root,
        }
    }

    pub fn dataset_dir(&self, id: &DatasetId) -> Utf8PathBuf {
        self.raw_root.join(id.as_str())
    }

    pub fn install_or_update(&self, id: &DatasetId) -> FetchRecord {
        let source = self.remote.source_url(id);
        match self.remote.dataset_exists(id) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(dataset = %id, url = %source, "dataset not found on remote");
                return FetchRecord {
                    dataset: id.clone(),
                    outcome: FetchOutcome::RemoteMissing,
                    detail: Some(format!("{source} returned 404")),
                };
            }
            Err(err) => {
                tracing::warn!(dataset = %id, error = %err, "remote check failed");
                return FetchRecord::failed(id, FetchOutcome::InstallFailed, &err);
            }
        }

        let path = self.dataset_dir(id);
        let mut updated = false;
        if path.as_std_path().is_dir() {
            match self.vcs.update(path.as_std_path(), ORIGIN) {
                Ok(()) => updated = true,
                Err(err) => {
                    tracing::warn!(
                        dataset = %id,
                        error = %err,
                        "update failed, removing local mirror for a clean install"
                    );
                    if let Err(err) = fs_util::force_remove_dir(path.as_std_path()) {
                        tracing::error!(dataset = %id, error = %err, "could not remove mirror");
                        return FetchRecord::failed(id, FetchOutcome::InstallFailed, &err);
                    }
                }
            }
        }

        if !updated {
            if let Some(parent) = path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent.as_std_path()) {
                    let err = MirrorError::Filesystem(err.to_string());
                    return FetchRecord::failed(id, FetchOutcome::InstallFailed, &err);
                }
            }
            if let Err(err) = self.vcs.install(path.as_std_path(), &source) {
                tracing::warn!(dataset = %id, error = %err, "install failed");
                return FetchRecord::failed(id, FetchOutcome::InstallFailed, &err);
            }
        }

        if let Err(err) = self.retrieve_anat(&path) {
            tracing::warn!(dataset = %id, error = %err, "retrieving anatomical images failed");
            return FetchRecord::failed(id, FetchOutcome::RetrieveFailed, &err);
        }

        let outcome = if updated {
            FetchOutcome::FetchedUpdate
        } else {
            FetchOutcome::FetchedFresh
        };
        tracing::info!(dataset = %id, %outcome, "dataset ready");
        FetchRecord::ok(id, outcome)
    }

    fn retrieve_anat(&self, path: &Utf8Path) -> Result<(), MirrorError> {
        let images = fs_util::anat_images(path.as_std_path())?;
        if images.is_empty() {
            tracing::debug!(path = %path, "no anatomical images to retrieve");
            return Ok(());
        }
        self.vcs.get(path.as_std_path(), &images)
    }

    pub fn fetch_all(&self, ids: &[DatasetId]) -> FetchReport {
        let mut report = FetchReport::default();
        for id in ids {
            let record = self.install_or_update(id);
            if record.outcome.is_success() {
                report.surviving.push(id.clone());
            }
            report.records.push(record);
        }
        tracing::info!(
            requested = ids.len(),
            surviving = report.surviving.len(),
            "fetch stage finished"
        );
        report
    }
}
