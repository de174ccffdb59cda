use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::DatasetId;
use crate::error::MirrorError;
use crate::runlog::write_text_atomic;

pub trait MosaicGenerator {
    fn generate(
        &self,
        id: &DatasetId,
        dataset_dir: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), MirrorError>;
}

impl<T: MosaicGenerator + ?Sized> MosaicGenerator for &T {
    fn generate(
        &self,
        id: &DatasetId,
        dataset_dir: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), MirrorError> {
        (**self).generate(id, dataset_dir, output)
    }
}

#[derive(Debug, Clone)]
pub struct CommandMosaicGenerator {
    command: Vec<String>,
}

impl CommandMosaicGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl MosaicGenerator for CommandMosaicGenerator {
    fn generate(
        &self,
        id: &DatasetId,
        dataset_dir: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), MirrorError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| MirrorError::MissingTool("mosaic_command is not configured".to_string()))?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        }
        let output_status = Command::new(program)
            .args(args)
            .arg(id.as_str())
            .arg(dataset_dir.as_str())
            .arg(output.as_str())
            .output()
            .map_err(|err| MirrorError::MosaicGeneration {
                dataset: id.to_string(),
                message: err.to_string(),
            })?;
        if output_status.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output_status.stderr).trim().to_string();
        Err(MirrorError::MosaicGeneration {
            dataset: id.to_string(),
            message: if stderr.is_empty() {
                format!("{program} exited with {}", output_status.status)
            } else {
                stderr
            },
        })
    }
}

pub trait JobScheduler {
    fn submit(&self, job_name: &str) -> Result<(), MirrorError>;
}

impl<T: JobScheduler + ?Sized> JobScheduler for &T {
    fn submit(&self, job_name: &str) -> Result<(), MirrorError> {
        (**self).submit(job_name)
    }
}

#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    sbatch: Option<PathBuf>,
    script: PathBuf,
}

impl SlurmScheduler {
    pub fn new(script: impl AsRef<Path>) -> Self {
        Self {
            sbatch: crate::vcs::find_in_path("sbatch"),
            script: script.as_ref().to_path_buf(),
        }
    }
}

impl JobScheduler for SlurmScheduler {
    fn submit(&self, job_name: &str) -> Result<(), MirrorError> {
        let sbatch = self
            .sbatch
            .as_ref()
            .ok_or_else(|| MirrorError::MissingTool("sbatch".to_string()))?;
        let output = Command::new(sbatch)
            .arg("-J")
            .arg(job_name)
            .arg(&self.script)
            .output()
            .map_err(|err| MirrorError::Scheduler(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MirrorError::Scheduler(stderr));
        }
        tracing::info!(
            job_name,
            response = %String::from_utf8_lossy(&output.stdout).trim(),
            "job submitted"
        );
        Ok(())
    }
}

pub fn launcher_lines(program: &str, config: Option<&Utf8Path>, ids: &[DatasetId]) -> Vec<String> {
    let config_arg = config
        .map(|path| format!(" --config {path}"))
        .unwrap_or_default();
    ids.iter()
        .map(|id| {
            format!(
                "{program}{config_arg} mosaics --local --skip-download --no-run-log --dataset-list {id}"
            )
        })
        .collect()
}

pub fn write_launcher(
    path: &Utf8Path,
    program: &str,
    config: Option<&Utf8Path>,
    ids: &[DatasetId],
) -> Result<Utf8PathBuf, MirrorError> {
    let mut content = launcher_lines(program, config, ids).join("\n");
    content.push('\n');
    write_text_atomic(path, &content)?;
    Ok(path.to_path_buf())
}
