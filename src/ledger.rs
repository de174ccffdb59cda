use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::LedgerSettings;
use crate::domain::{DatasetId, Pipeline};
use crate::error::MirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl LedgerTable {
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|value| value.trim() == header)
    }

    /// Short rows read as blank up to the header width.
    pub fn cell(&self, cell: CellRef) -> Option<&str> {
        if cell.column >= self.headers.len() {
            return None;
        }
        let row = self.rows.get(cell.row)?;
        Some(row.get(cell.column).map(String::as_str).unwrap_or_default())
    }

    pub fn rows_matching(&self, column: usize, value: &str) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(column).map(|cell| cell.trim()) == Some(value))
            .map(|(index, _)| index)
            .collect()
    }
}

pub trait LedgerSource: Send + Sync {
    fn records(&self) -> Result<LedgerTable, MirrorError>;
    fn read_cell(&self, cell: CellRef) -> Result<String, MirrorError>;
    fn write_cell(&self, cell: CellRef, value: &str) -> Result<(), MirrorError>;

    fn find_row(&self, id_column: &str, dataset: &str) -> Result<usize, MirrorError> {
        let table = self.records()?;
        let column = table
            .column_index(id_column)
            .ok_or_else(|| MirrorError::LedgerColumnNotFound(id_column.to_string()))?;
        let matches = table.rows_matching(column, dataset);
        match matches.as_slice() {
            [row] => Ok(*row),
            [] => Err(MirrorError::LedgerRowNotFound(dataset.to_string())),
            many => Err(MirrorError::AmbiguousLedgerRow {
                dataset: dataset.to_string(),
                count: many.len(),
            }),
        }
    }

    fn find_column(&self, header: &str) -> Result<usize, MirrorError> {
        self.records()?
            .column_index(header)
            .ok_or_else(|| MirrorError::LedgerColumnNotFound(header.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: Utf8PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn save(&self, table: &LedgerTable) -> Result<(), MirrorError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix("ledger")
            .suffix(".csv.tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(temp.as_file());
            writer
                .write_record(&table.headers)
                .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            for row in &table.rows {
                writer
                    .write_record(row)
                    .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        }
        temp.persist(self.path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl LedgerSource for CsvLedger {
    fn records(&self) -> Result<LedgerTable, MirrorError> {
        let content = fs::read(self.path.as_std_path())
            .map_err(|err| MirrorError::LedgerRead(format!("{}: {err}", self.path)))?;
        parse_table(&content)
    }

    fn read_cell(&self, cell: CellRef) -> Result<String, MirrorError> {
        let table = self.records()?;
        table.cell(cell).map(str::to_string).ok_or_else(|| {
            MirrorError::LedgerRead(format!(
                "cell row={} column={} out of range",
                cell.row, cell.column
            ))
        })
    }

    fn write_cell(&self, cell: CellRef, value: &str) -> Result<(), MirrorError> {
        let mut table = self.records()?;
        let width = table.headers.len();
        let row = table.rows.get_mut(cell.row).ok_or_else(|| {
            MirrorError::LedgerRead(format!("row {} out of range", cell.row))
        })?;
        if cell.column >= width {
            return Err(MirrorError::LedgerRead(format!(
                "column {} out of range",
                cell.column
            )));
        }
        if row.len() <= cell.column {
            row.resize(cell.column + 1, String::new());
        }
        row[cell.column] = value.to_string();
        self.save(&table)
    }
}

pub fn parse_table(content: &[u8]) -> Result<LedgerTable, MirrorError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);
    let headers = reader
        .headers()
        .map_err(|err| MirrorError::LedgerRead(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| MirrorError::LedgerRead(err.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    Ok(LedgerTable { headers, rows })
}

pub struct StatusLedger<L: LedgerSource> {
    source: L,
    settings: LedgerSettings,
}

impl<L: LedgerSource> StatusLedger<L> {
    pub fn new(source: L, settings: LedgerSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn statuses(&self, pipeline: Pipeline) -> Result<Vec<(DatasetId, String)>, MirrorError> {
        let table = self.source.records()?;
        let id_column = table
            .column_index(&self.settings.id_column)
            .ok_or_else(|| MirrorError::LedgerColumnNotFound(self.settings.id_column.clone()))?;
        let status_column = table
            .column_index(pipeline.as_str())
            .ok_or_else(|| MirrorError::LedgerColumnNotFound(pipeline.as_str().to_string()))?;

        let mut out = Vec::new();
        for row in &table.rows {
            let raw_id = row.get(id_column).map(|v| v.trim()).unwrap_or_default();
            let status = row.get(status_column).map(|v| v.trim()).unwrap_or_default();
            if raw_id.is_empty() {
                continue;
            }
            match raw_id.parse::<DatasetId>() {
                Ok(id) => out.push((id, status.to_string())),
                Err(_) => tracing::warn!(value = raw_id, "skipping ledger row with invalid dataset id"),
            }
        }
        Ok(out)
    }

    pub fn is_remote(&self, status: &str) -> bool {
        status.trim() == self.settings.remote_status
    }

    pub fn locate(&self, dataset: &DatasetId, pipeline: Pipeline) -> Result<CellRef, MirrorError> {
        let row = self
            .source
            .find_row(&self.settings.id_column, dataset.as_str())?;
        let column = self.source.find_column(pipeline.as_str())?;
        Ok(CellRef { row, column })
    }

    pub fn read(&self, cell: CellRef) -> Result<String, MirrorError> {
        self.source.read_cell(cell)
    }

    /// Writes only if the cell still holds `expected`; `false` means skipped.
    pub fn compare_and_set(
        &self,
        cell: CellRef,
        expected: &str,
        new_value: &str,
    ) -> Result<bool, MirrorError> {
        let current = self.source.read_cell(cell)?;
        if current.trim() != expected {
            return Ok(false);
        }
        self.source.write_cell(cell, new_value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SHEET: &str = "dataset_number,fmriprep,mriqc\nds001,REMOTE,LOCAL\nds002,LOCAL,\nds002,REMOTE,REMOTE\n";

    #[test]
    fn short_rows_read_blank_cells() {
        let table = parse_table(b"a,b,c\n1,2\n").unwrap();
        assert_eq!(table.rows[0], vec!["1", "2"]);
        assert_eq!(table.cell(CellRef { row: 0, column: 2 }), Some(""));
        assert_eq!(table.cell(CellRef { row: 0, column: 3 }), None);
    }

    #[test]
    fn write_cell_leaves_other_short_rows_alone() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("status.csv")).unwrap();
        fs::write(
            path.as_std_path(),
            "dataset_number,fmriprep,mriqc\nds001,REMOTE\nds002,LOCAL\n",
        )
        .unwrap();
        let ledger = CsvLedger::new(path.clone());

        ledger.write_cell(CellRef { row: 1, column: 1 }, "REMOTE").unwrap();
        assert_eq!(
            fs::read_to_string(path.as_std_path()).unwrap(),
            "dataset_number,fmriprep,mriqc\nds001,REMOTE\nds002,REMOTE\n"
        );
    }

    #[test]
    fn duplicate_rows_are_ambiguous() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("status.csv")).unwrap();
        fs::write(path.as_std_path(), SHEET).unwrap();
        let ledger = CsvLedger::new(path);

        assert_eq!(ledger.find_row("dataset_number", "ds001").unwrap(), 0);
        assert_matches!(
            ledger.find_row("dataset_number", "ds002"),
            Err(MirrorError::AmbiguousLedgerRow { count: 2, .. })
        );
        assert_matches!(
            ledger.find_row("dataset_number", "ds999"),
            Err(MirrorError::LedgerRowNotFound(_))
        );
        assert_matches!(
            ledger.find_column("qsiprep"),
            Err(MirrorError::LedgerColumnNotFound(_))
        );
    }

    #[test]
    fn write_cell_preserves_other_cells() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("status.csv")).unwrap();
        fs::write(path.as_std_path(), SHEET).unwrap();
        let ledger = CsvLedger::new(path);

        ledger.write_cell(CellRef { row: 1, column: 2 }, "LOCAL").unwrap();
        let table = ledger.records().unwrap();
        assert_eq!(table.rows[1], vec!["ds002", "LOCAL", "LOCAL"]);
        assert_eq!(table.rows[0], vec!["ds001", "REMOTE", "LOCAL"]);
        assert_eq!(table.rows.len(), 3);
    }
}
