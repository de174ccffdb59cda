use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::domain::{DatasetId, Pipeline};
use crate::error::MirrorError;
use crate::ledger::{CellRef, LedgerSource, StatusLedger};
use crate::mirror::MirrorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    LedgerRemoteNotMirrored,
    MirroredNotLedgerRemote,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::LedgerRemoteNotMirrored => f.write_str("on ledger but not mirrored"),
            DiscrepancyKind::MirroredNotLedgerRemote => f.write_str("mirrored but not on ledger"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscrepancySet {
    pub pipeline: Pipeline,
    pub kind: DiscrepancyKind,
    pub datasets: BTreeSet<DatasetId>,
}

impl DiscrepancySet {
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn joined(&self) -> String {
        self.datasets
            .iter()
            .map(DatasetId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for DiscrepancySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.pipeline, self.kind, self.joined())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCount {
    pub written: usize,
    pub skipped: usize,
}

pub trait ConfirmGate {
    fn confirm(&mut self, set: &DiscrepancySet) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct AssumeYes;

#[derive(Debug, Clone, Copy)]
pub struct AssumeNo;

impl ConfirmGate for AssumeYes {
    fn confirm(&mut self, _set: &DiscrepancySet) -> bool {
        true
    }
}

impl ConfirmGate for AssumeNo {
    fn confirm(&mut self, _set: &DiscrepancySet) -> bool {
        false
    }
}

impl<F> ConfirmGate for F
where
    F: FnMut(&DiscrepancySet) -> bool,
{
    fn confirm(&mut self, set: &DiscrepancySet) -> bool {
        self(set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileEntry {
    pub set: DiscrepancySet,
    pub confirmed: bool,
    pub applied: AppliedCount,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
}

impl ReconcileReport {
    pub fn total_written(&self) -> usize {
        self.entries.iter().map(|entry| entry.applied.written).sum()
    }
}

pub struct ReconciliationEngine<'a, L: LedgerSource> {
    ledger: &'a StatusLedger<L>,
    mirror: &'a MirrorIndex,
    pipelines: Vec<Pipeline>,
}

impl<'a, L: LedgerSource> ReconciliationEngine<'a, L> {
    pub fn new(ledger: &'a StatusLedger<L>, mirror: &'a MirrorIndex) -> Self {
        Self {
            ledger,
            mirror,
            pipelines: Pipeline::ALL.to_vec(),
        }
    }

    pub fn with_pipelines(mut self, pipelines: Vec<Pipeline>) -> Self {
        self.pipelines = pipelines;
        self
    }

    pub fn detect(&self, pipeline: Pipeline) -> Result<[DiscrepancySet; 2], MirrorError> {
        let statuses = self.ledger.statuses(pipeline)?;
        let mirrored = self.mirror.datasets_for(pipeline);

        let mut ledger_remote = BTreeSet::new();
        let mut ledger_not_remote = BTreeSet::new();
        for (dataset, status) in statuses {
            if self.ledger.is_remote(&status) {
                ledger_remote.insert(dataset);
            } else {
                ledger_not_remote.insert(dataset);
            }
        }

        let remote_not_mirrored = ledger_remote.difference(&mirrored).cloned().collect();
        let mirrored_not_remote = mirrored.intersection(&ledger_not_remote).cloned().collect();

        Ok([
            DiscrepancySet {
                pipeline,
                kind: DiscrepancyKind::LedgerRemoteNotMirrored,
                datasets: remote_not_mirrored,
            },
            DiscrepancySet {
                pipeline,
                kind: DiscrepancyKind::MirroredNotLedgerRemote,
                datasets: mirrored_not_remote,
            },
        ])
    }

    pub fn detect_all(&self) -> Result<Vec<DiscrepancySet>, MirrorError> {
        let mut sets = Vec::with_capacity(self.pipelines.len() * 2);
        for pipeline in &self.pipelines {
            sets.extend(self.detect(*pipeline)?);
        }
        Ok(sets)
    }

    /// All rows are resolved before the first write.
    pub fn apply(&self, set: &DiscrepancySet) -> Result<AppliedCount, MirrorError> {
        let cells = self.locate_all(set)?;
        self.write_located(set, &cells)
    }

    fn locate_all(&self, set: &DiscrepancySet) -> Result<Vec<(DatasetId, CellRef)>, MirrorError> {
        let mut cells = Vec::with_capacity(set.datasets.len());
        for dataset in &set.datasets {
            cells.push((dataset.clone(), self.ledger.locate(dataset, set.pipeline)?));
        }
        Ok(cells)
    }

    fn write_located(
        &self,
        set: &DiscrepancySet,
        cells: &[(DatasetId, CellRef)],
    ) -> Result<AppliedCount, MirrorError> {
        let settings = self.ledger.settings();
        let (expected, replacement) = match set.kind {
            DiscrepancyKind::LedgerRemoteNotMirrored => {
                (settings.remote_status.as_str(), settings.local_status.as_str())
            }
            DiscrepancyKind::MirroredNotLedgerRemote => {
                (settings.local_status.as_str(), settings.remote_status.as_str())
            }
        };

        let mut count = AppliedCount::default();
        for (dataset, cell) in cells {
            if self.ledger.compare_and_set(*cell, expected, replacement)? {
                tracing::info!(
                    dataset = %dataset,
                    pipeline = %set.pipeline,
                    from = expected,
                    to = replacement,
                    "ledger corrected"
                );
                count.written += 1;
            } else {
                tracing::debug!(
                    dataset = %dataset,
                    pipeline = %set.pipeline,
                    "ledger cell changed since detection, skipping"
                );
                count.skipped += 1;
            }
        }
        Ok(count)
    }

    pub fn reconcile(&self, gate: &mut dyn ConfirmGate) -> Result<ReconcileReport, MirrorError> {
        let mut decided = Vec::new();
        for set in self.detect_all()? {
            if set.is_empty() {
                continue;
            }
            tracing::info!(
                pipeline = %set.pipeline,
                count = set.datasets.len(),
                "{}: {}",
                set.kind,
                set.joined()
            );
            let confirmed = gate.confirm(&set);
            decided.push((set, confirmed));
        }

        let mut located = Vec::with_capacity(decided.len());
        for (set, confirmed) in &decided {
            let cells = if *confirmed {
                self.locate_all(set)?
            } else {
                Vec::new()
            };
            located.push(cells);
        }

        let mut report = ReconcileReport::default();
        for ((set, confirmed), cells) in decided.into_iter().zip(located) {
            let applied = if confirmed {
                self.write_located(&set, &cells)?
            } else {
                AppliedCount::default()
            };
            report.entries.push(ReconcileEntry {
                set,
                confirmed,
                applied,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::LedgerSettings;
    use crate::ledger::{CellRef, LedgerTable};

    struct MemoryLedger {
        table: Mutex<LedgerTable>,
    }

    impl MemoryLedger {
        fn new(rows: &[[&str; 3]]) -> Self {
            Self {
                table: Mutex::new(LedgerTable {
                    headers: vec![
                        "dataset_number".to_string(),
                        "fmriprep".to_string(),
                        "mriqc".to_string(),
                    ],
                    rows: rows
                        .iter()
                        .map(|row| row.iter().map(|v| v.to_string()).collect())
                        .collect(),
                }),
            }
        }
    }

    impl LedgerSource for MemoryLedger {
        fn records(&self) -> Result<LedgerTable, MirrorError> {
            Ok(self.table.lock().unwrap().clone())
        }

        fn read_cell(&self, cell: CellRef) -> Result<String, MirrorError> {
            Ok(self.table.lock().unwrap().cell(cell).unwrap().to_string())
        }

        fn write_cell(&self, cell: CellRef, value: &str) -> Result<(), MirrorError> {
            self.table.lock().unwrap().rows[cell.row][cell.column] = value.to_string();
            Ok(())
        }
    }

    fn settings() -> LedgerSettings {
        LedgerSettings {
            path: "status.csv".into(),
            id_column: "dataset_number".to_string(),
            remote_status: "REMOTE".to_string(),
            local_status: "LOCAL".to_string(),
        }
    }

    #[test]
    fn sets_are_disjoint_per_pipeline() {
        let ledger = StatusLedger::new(
            MemoryLedger::new(&[
                ["ds001", "REMOTE", "LOCAL"],
                ["ds002", "LOCAL", "REMOTE"],
                ["ds003", "REMOTE", "REMOTE"],
            ]),
            settings(),
        );
        let mirror = MirrorIndex::from_names(["ds002-fmriprep", "ds003-fmriprep", "ds001-mriqc"]);
        let engine = ReconciliationEngine::new(&ledger, &mirror);

        let [remote, mirrored] = engine.detect(Pipeline::Fmriprep).unwrap();
        assert_eq!(remote.joined(), "ds001");
        assert_eq!(mirrored.joined(), "ds002");
        assert!(remote.datasets.is_disjoint(&mirrored.datasets));

        let [remote, mirrored] = engine.detect(Pipeline::Mriqc).unwrap();
        assert_eq!(remote.joined(), "ds002,ds003");
        assert_eq!(mirrored.joined(), "ds001");
    }

    #[test]
    fn closure_gate_sees_each_non_empty_set() {
        let ledger = StatusLedger::new(
            MemoryLedger::new(&[["ds001", "REMOTE", "LOCAL"]]),
            settings(),
        );
        let mirror = MirrorIndex::default();
        let engine = ReconciliationEngine::new(&ledger, &mirror);

        let mut seen = Vec::new();
        let mut gate = |set: &DiscrepancySet| {
            seen.push((set.pipeline, set.kind));
            true
        };
        let report = engine.reconcile(&mut gate).unwrap();

        assert_eq!(
            seen,
            vec![(Pipeline::Fmriprep, DiscrepancyKind::LedgerRemoteNotMirrored)]
        );
        assert_eq!(report.total_written(), 1);
        let cell = ledger.locate(&"ds001".parse().unwrap(), Pipeline::Fmriprep).unwrap();
        assert_eq!(ledger.read(cell).unwrap(), "LOCAL");
    }
}
