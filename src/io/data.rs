//! Tab-separated numeric data files.
//!
//! Layout:
//! - one header row of column names (lower-cased on read)
//! - `#` starts a comment line
//! - every other row holds one float per column
//!
//! Floats are written in Rust's shortest round-trip form, so reading a
//! written file reproduces the values exactly.

use std::fs::File;
use std::path::Path;

use crate::error::AppError;

/// Named columns of equal length, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Its length must match the existing ones.
    pub fn push(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), AppError> {
        let name = name.into();
        if let Some((first, existing)) = self.columns.first() {
            if existing.len() != values.len() {
                return Err(AppError::input(format!(
                    "Column '{name}' has {} rows, column '{first}' has {}.",
                    values.len(),
                    existing.len()
                )));
            }
        }
        if self.get(&name).is_some() {
            return Err(AppError::input(format!("Duplicate column '{name}'.")));
        }
        self.columns.push((name, values));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }
}

/// Read a tab-separated data file.
pub fn read_data_file(path: &Path) -> Result<DataTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open data file '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read header of '{}': {e}", path.display())))?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(AppError::input(format!("Data file '{}' has no header row.", path.display())));
    }

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (idx, record) in reader.records().enumerate() {
        // +2: 1-based, after the header
        let line = idx + 2;
        let record = record.map_err(|e| AppError::new(2, format!("Parse error in '{}': {e}", path.display())))?;
        for (col, field) in record.iter().enumerate() {
            let v: f64 = field.parse().map_err(|_| {
                AppError::input(format!(
                    "Invalid number '{field}' in column '{}' (row {line}) of '{}'.",
                    headers[col],
                    path.display()
                ))
            })?;
            values[col].push(v);
        }
    }

    let mut table = DataTable::new();
    for (name, column) in headers.into_iter().zip(values) {
        table.push(name, column)?;
    }
    Ok(table)
}

/// Write `table` as a tab-separated file with a header row.
pub fn write_data_file(path: &Path, table: &DataTable) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create data file '{}': {e}", path.display())))?;
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write data file '{}': {e}", path.display()));

    writer.write_record(table.names()).map_err(write_err)?;
    for row in 0..table.n_rows() {
        let fields = table.columns.iter().map(|(_, v)| v[row].to_string());
        writer.write_record(fields).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush data file '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("psd-fit-data-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn comments_and_case_are_handled() {
        let path = tmp("comments.dat");
        std::fs::write(&path, "# measured today\nFreq\tPSD_X\n0\t1e-3\n# mid comment\n10\t2.5e-7\n").unwrap();
        let table = read_data_file(&path).unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), ["freq", "psd_x"]);
        assert_eq!(table.get("freq").unwrap(), [0.0, 10.0]);
        assert_eq!(table.get("psd_x").unwrap(), [1e-3, 2.5e-7]);
    }

    #[test]
    fn written_floats_read_back_exactly() {
        let path = tmp("exact.dat");
        let mut table = DataTable::new();
        table.push("freq", vec![0.0, 0.1, 1.0 / 3.0]).unwrap();
        table.push("psd_y", vec![1.234_567_890_123e-9, f64::MIN_POSITIVE, 7.0]).unwrap();
        write_data_file(&path, &table).unwrap();
        assert_eq!(read_data_file(&path).unwrap(), table);
    }

    #[test]
    fn mismatched_column_is_rejected() {
        let mut table = DataTable::new();
        table.push("a", vec![1.0]).unwrap();
        assert!(table.push("b", vec![1.0, 2.0]).is_err());
        assert!(table.push("a", vec![3.0]).is_err());
    }

    #[test]
    fn bad_number_reports_row() {
        let path = tmp("bad.dat");
        std::fs::write(&path, "freq\tpsd_x\n1\tabc\n").unwrap();
        let err = read_data_file(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("row 2"));
    }
}
