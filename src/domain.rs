use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = normalized
            .strip_prefix("ds")
            .map(|digits| !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(MirrorError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for DatasetId {
    type Error = MirrorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Fmriprep,
    Mriqc,
}

impl Pipeline {
    pub const ALL: [Pipeline; 2] = [Pipeline::Fmriprep, Pipeline::Mriqc];

    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::Fmriprep => "fmriprep",
            Pipeline::Mriqc => "mriqc",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "fmriprep" => Ok(Pipeline::Fmriprep),
            "mriqc" => Ok(Pipeline::Mriqc),
            other => Err(MirrorError::InvalidPipeline(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchOutcome {
    FetchedFresh,
    FetchedUpdate,
    RemoteMissing,
    InstallFailed,
    RetrieveFailed,
}

impl FetchOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, FetchOutcome::FetchedFresh | FetchOutcome::FetchedUpdate)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchOutcome::FetchedFresh => "fetched-fresh",
            FetchOutcome::FetchedUpdate => "fetched-update",
            FetchOutcome::RemoteMissing => "remote-missing",
            FetchOutcome::InstallFailed => "install-failed",
            FetchOutcome::RetrieveFailed => "retrieve-failed",
        };
        f.write_str(label)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, MirrorError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| MirrorError::InvalidDate(value.to_string()))
}
