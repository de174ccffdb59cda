use chrono::NaiveDate;
use serde::Serialize;

use crate::config::Settings;
use crate::domain::DatasetId;
use crate::error::MirrorError;
use crate::fetch::{FetchPipeline, FetchReport};
use crate::mosaic::{JobScheduler, MosaicGenerator, write_launcher};
use crate::remote::{MetadataSource, RemoteHost};
use crate::runlog::RunLogs;
use crate::select::{DatasetSelection, resolve_datasets};
use crate::vcs::MirrorVcs;

const DEFAULT_PROGRAM: &str = "on-mirror";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    #[default]
    None,
    Local,
    Job,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub skip_download: bool,
    pub dispatch: Dispatch,
    pub write_run_log: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            skip_download: false,
            dispatch: Dispatch::None,
            write_run_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MosaicFailure {
    pub dataset: DatasetId,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub no_datasets: bool,
    pub requested: Vec<DatasetId>,
    pub fetch: Option<FetchReport>,
    pub datasets: Vec<DatasetId>,
    pub generated: Vec<DatasetId>,
    pub mosaic_failures: Vec<MosaicFailure>,
    pub failure_logs: Vec<String>,
    pub dataset_log: Option<String>,
    pub launcher: Option<String>,
    pub job_name: Option<String>,
}

pub struct BatchRunner<R, V, M, G, S>
where
    R: RemoteHost,
    V: MirrorVcs,
    M: MetadataSource,
    G: MosaicGenerator,
    S: JobScheduler,
{
    settings: Settings,
    fetch: FetchPipeline<R, V>,
    metadata: M,
    generator: G,
    scheduler: S,
    program: String,
}

impl<R, V, M, G, S> BatchRunner<R, V, M, G, S>
where
    R: RemoteHost,
    V: MirrorVcs,
    M: MetadataSource,
    G: MosaicGenerator,
    S: JobScheduler,
{
    pub fn new(
        settings: Settings,
        remote: R,
        vcs: V,
        metadata: M,
        generator: G,
        scheduler: S,
    ) -> Self {
        let fetch = FetchPipeline::new(remote, vcs, settings.raw_root.clone());
        Self {
            settings,
            fetch,
            metadata,
            generator,
            scheduler,
            program: DEFAULT_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn run(
        &self,
        selection: &DatasetSelection,
        options: &BatchOptions,
        today: NaiveDate,
    ) -> Result<BatchReport, MirrorError> {
        let requested = resolve_datasets(selection, today, &self.metadata)?;
        if requested.is_empty() {
            tracing::info!("no datasets found");
            return Ok(BatchReport {
                no_datasets: true,
                ..BatchReport::default()
            });
        }
        tracing::info!(count = requested.len(), "resolved dataset list");

        let logs = RunLogs::new(self.settings.logs_root(), today);
        let mut report = BatchReport {
            requested: requested.clone(),
            ..BatchReport::default()
        };

        let datasets = if options.skip_download {
            requested
        } else {
            let fetched = self.fetch.fetch_all(&requested);
            report.failure_logs = logs
                .write_failures(&fetched)?
                .into_iter()
                .map(|path| path.to_string())
                .collect();
            let surviving = fetched.surviving.clone();
            report.fetch = Some(fetched);
            surviving
        };

        let dispatched = match options.dispatch {
            Dispatch::None => Ok(()),
            Dispatch::Local => {
                self.generate_local(&datasets, &mut report);
                Ok(())
            }
            Dispatch::Job => self.submit_job(&datasets, &logs, &mut report),
        };

        if options.write_run_log {
            let path = logs.write_dataset_list(&datasets)?;
            report.dataset_log = Some(path.to_string());
        }
        report.datasets = datasets;
        dispatched?;
        Ok(report)
    }

    fn generate_local(&self, datasets: &[DatasetId], report: &mut BatchReport) {
        for id in datasets {
            let dataset_dir = self.settings.dataset_dir(id);
            let output = self.settings.mosaic_output_path(id);
            match self.generator.generate(id, &dataset_dir, &output) {
                Ok(()) => {
                    tracing::info!(dataset = %id, output = %output, "mosaic written");
                    report.generated.push(id.clone());
                }
                Err(err) => {
                    tracing::error!(dataset = %id, error = %err, "mosaic generation failed");
                    report.mosaic_failures.push(MosaicFailure {
                        dataset: id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn submit_job(
        &self,
        datasets: &[DatasetId],
        logs: &RunLogs,
        report: &mut BatchReport,
    ) -> Result<(), MirrorError> {
        if datasets.is_empty() {
            tracing::warn!("no datasets survived the fetch stage, not submitting a job");
            return Ok(());
        }
        let launcher = write_launcher(
            &self.settings.launcher_path(),
            &self.program,
            self.settings.config_path.as_deref(),
            datasets,
        )?;
        report.launcher = Some(launcher.to_string());
        let job_name = format!("mosaics_{}", logs.date_stamp());
        report.job_name = Some(job_name.clone());
        self.scheduler.submit(&job_name)
    }
}
