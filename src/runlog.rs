use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;

use crate::domain::{DATE_FORMAT, DatasetId};
use crate::error::MirrorError;
use crate::fetch::FetchReport;

#[derive(Debug, Clone)]
pub struct RunLogs {
    logs_root: Utf8PathBuf,
    date: NaiveDate,
}

impl RunLogs {
    pub fn new(logs_root: impl Into<Utf8PathBuf>, date: NaiveDate) -> Self {
        Self {
            logs_root: logs_root.into(),
            date,
        }
    }

    pub fn date_stamp(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn failed_install_path(&self) -> Utf8PathBuf {
        self.logs_root
            .join("download_get")
            .join(format!("failed_install_{}", self.date_stamp()))
    }

    pub fn failed_get_path(&self) -> Utf8PathBuf {
        self.logs_root
            .join("download_get")
            .join(format!("failed_get_{}", self.date_stamp()))
    }

    pub fn dataset_list_path(&self) -> Utf8PathBuf {
        self.logs_root
            .join("ds_list")
            .join(format!("ds_list_{}", self.date_stamp()))
    }

    pub fn write_failures(&self, report: &FetchReport) -> Result<Vec<Utf8PathBuf>, MirrorError> {
        let mut written = Vec::new();
        let failed_install = report.failed_install();
        if !failed_install.is_empty() {
            let path = self.failed_install_path();
            write_lines(&path, &failed_install)?;
            written.push(path);
        }
        let failed_get = report.failed_get();
        if !failed_get.is_empty() {
            let path = self.failed_get_path();
            write_lines(&path, &failed_get)?;
            written.push(path);
        }
        Ok(written)
    }

    pub fn write_dataset_list(&self, ids: &[DatasetId]) -> Result<Utf8PathBuf, MirrorError> {
        let path = self.dataset_list_path();
        write_lines(&path, ids)?;
        Ok(path)
    }
}

pub fn write_lines(path: &Utf8Path, ids: &[DatasetId]) -> Result<(), MirrorError> {
    let content = ids
        .iter()
        .map(DatasetId::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    write_text_atomic(path, &content)
}

pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<(), MirrorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    Ok(())
}
