use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

pub const CONFIG_FILE_NAME: &str = "openneuro-mirror.json";

const DEFAULT_REMOTE_BASE_URL: &str = "https://github.com/OpenNeuroDatasets";
const DEFAULT_METADATA_URL: &str =
    "https://raw.githubusercontent.com/jbwexler/openneuro_metadata/main/metadata.csv";
const DEFAULT_RAW_ROOT: &str = "/corral-repl/utexas/poldracklab/data/OpenNeuro/raw";
const DEFAULT_MOSAICS_ROOT: &str = "/corral-repl/utexas/poldracklab/data/OpenNeuro/mosaics";
const DEFAULT_SUPERDATASET_ROOT: &str = "/work2/03201/jbwexler/frontera/OpenNeuroDerivatives";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    #[serde(default)]
    pub remote_base_url: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub raw_root: Option<String>,
    #[serde(default)]
    pub mosaics_root: Option<String>,
    #[serde(default)]
    pub superdataset_root: Option<String>,
    #[serde(default)]
    pub mosaic_command: Option<Vec<String>>,
    #[serde(default)]
    pub slurm_script: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub remote_status: Option<String>,
    #[serde(default)]
    pub local_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub path: Utf8PathBuf,
    pub id_column: String,
    pub remote_status: String,
    pub local_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub schema_version: u32,
    pub ledger: LedgerSettings,
    pub remote_base_url: String,
    pub metadata_url: String,
    pub raw_root: Utf8PathBuf,
    pub mosaics_root: Utf8PathBuf,
    pub superdataset_root: Utf8PathBuf,
    pub mosaic_command: Vec<String>,
    pub slurm_script: Utf8PathBuf,
    pub config_path: Option<Utf8PathBuf>,
}

impl Settings {
    pub fn dataset_dir(&self, id: &crate::domain::DatasetId) -> Utf8PathBuf {
        self.raw_root.join(id.as_str())
    }

    pub fn logs_root(&self) -> Utf8PathBuf {
        self.mosaics_root.join("logs")
    }

    pub fn mosaic_output_path(&self, id: &crate::domain::DatasetId) -> Utf8PathBuf {
        self.mosaics_root
            .join("mosaics")
            .join(format!("{}_mosaic.pdf", id.as_str()))
    }

    pub fn launcher_path(&self) -> Utf8PathBuf {
        self.mosaics_root.join("mosaics_launcher")
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<Settings, MirrorError> {
        let config_path = match path {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(MirrorError::MissingConfig(path));
                }
                Some(path)
            }
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MirrorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MirrorError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        let absolute = fs::canonicalize(&config_path)
            .map_err(|_| MirrorError::ConfigRead(config_path.clone()))?;
        let absolute = Utf8PathBuf::from_path_buf(absolute).map_err(MirrorError::ConfigRead)?;
        let mut settings = Self::resolve_config(config)?;
        settings.config_path = Some(absolute);
        Ok(settings)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| {
                dirs.config_dir()
                    .join("openneuro-mirror")
                    .join("config.json")
            })
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<Settings, MirrorError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(MirrorError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let ledger = config.ledger.unwrap_or_default();
        let ledger = LedgerSettings {
            path: Utf8PathBuf::from(ledger.path.unwrap_or_else(|| "status.csv".to_string())),
            id_column: non_empty(ledger.id_column, "ledger.id_column", "dataset_number")?,
            remote_status: non_empty(ledger.remote_status, "ledger.remote_status", "REMOTE")?,
            local_status: non_empty(ledger.local_status, "ledger.local_status", "LOCAL")?,
        };
        if ledger.remote_status == ledger.local_status {
            return Err(MirrorError::ConfigParse(
                "ledger.remote_status and ledger.local_status must differ".to_string(),
            ));
        }

        Ok(Settings {
            schema_version,
            ledger,
            remote_base_url: config
                .remote_base_url
                .unwrap_or_else(|| DEFAULT_REMOTE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            metadata_url: config
                .metadata_url
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            raw_root: Utf8PathBuf::from(
                config
                    .raw_root
                    .unwrap_or_else(|| DEFAULT_RAW_ROOT.to_string()),
            ),
            mosaics_root: Utf8PathBuf::from(
                config
                    .mosaics_root
                    .unwrap_or_else(|| DEFAULT_MOSAICS_ROOT.to_string()),
            ),
            superdataset_root: Utf8PathBuf::from(
                config
                    .superdataset_root
                    .unwrap_or_else(|| DEFAULT_SUPERDATASET_ROOT.to_string()),
            ),
            mosaic_command: config.mosaic_command.unwrap_or_default(),
            slurm_script: Utf8PathBuf::from(
                config
                    .slurm_script
                    .unwrap_or_else(|| "mosaics.slurm".to_string()),
            ),
            config_path: None,
        })
    }
}

fn non_empty(value: Option<String>, field: &str, default: &str) -> Result<String, MirrorError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => {
            Err(MirrorError::ConfigParse(format!("{field} must not be empty")))
        }
        Some(value) => Ok(value),
    }
}
