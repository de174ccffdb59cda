use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::MirrorError;

pub trait MirrorVcs: Send + Sync {
    fn install(&self, path: &Path, source: &str) -> Result<(), MirrorError>;
    fn update(&self, path: &Path, sibling: &str) -> Result<(), MirrorError>;
    fn get(&self, dataset: &Path, files: &[PathBuf]) -> Result<(), MirrorError>;
    fn update_superdataset(&self, path: &Path) -> Result<(), MirrorError>;
}

impl<T: MirrorVcs + ?Sized> MirrorVcs for &T {
    fn install(&self, path: &Path, source: &str) -> Result<(), MirrorError> {
        (**self).install(path, source)
    }

    fn update(&self, path: &Path, sibling: &str) -> Result<(), MirrorError> {
        (**self).update(path, sibling)
    }

    fn get(&self, dataset: &Path, files: &[PathBuf]) -> Result<(), MirrorError> {
        (**self).get(dataset, files)
    }

    fn update_superdataset(&self, path: &Path) -> Result<(), MirrorError> {
        (**self).update_superdataset(path)
    }
}

const GET_CHUNK: usize = 64;

#[derive(Debug, Clone)]
pub struct DataladCli {
    datalad: Option<PathBuf>,
}

impl DataladCli {
    pub fn new() -> Self {
        Self {
            datalad: find_in_path("datalad"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            datalad: Some(program.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.datalad.is_some()
    }

    fn run(&self, operation: &str, args: &[String]) -> Result<(), MirrorError> {
        let program = self
            .datalad
            .as_ref()
            .ok_or_else(|| MirrorError::MissingTool("datalad".to_string()))?;
        tracing::debug!(operation, ?args, "running datalad");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| MirrorError::Vcs {
                operation: operation.to_string(),
                message: err.to_string(),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        Err(MirrorError::Vcs {
            operation: operation.to_string(),
            message,
        })
    }
}

impl Default for DataladCli {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorVcs for DataladCli {
    fn install(&self, path: &Path, source: &str) -> Result<(), MirrorError> {
        let args = vec![
            "install".to_string(),
            "-s".to_string(),
            source.to_string(),
            path.to_string_lossy().to_string(),
        ];
        self.run("install", &args)
    }

    fn update(&self, path: &Path, sibling: &str) -> Result<(), MirrorError> {
        let args = vec![
            "update".to_string(),
            "-d".to_string(),
            path.to_string_lossy().to_string(),
            "-s".to_string(),
            sibling.to_string(),
            "--merge".to_string(),
        ];
        self.run("update", &args)
    }

    fn get(&self, dataset: &Path, files: &[PathBuf]) -> Result<(), MirrorError> {
        for chunk in files.chunks(GET_CHUNK) {
            let mut args = vec![
                "get".to_string(),
                "-d".to_string(),
                dataset.to_string_lossy().to_string(),
            ];
            args.extend(chunk.iter().map(|file| file.to_string_lossy().to_string()));
            self.run("get", &args)?;
        }
        Ok(())
    }

    fn update_superdataset(&self, path: &Path) -> Result<(), MirrorError> {
        let args = vec![
            "update".to_string(),
            "-d".to_string(),
            path.to_string_lossy().to_string(),
            "--merge".to_string(),
        ];
        self.run("update", &args)
    }
}

pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
