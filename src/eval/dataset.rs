/// Evaluation dataset CSV: `query_id, query, pdf_filename, answer[, keywords]`.
///
/// Rows are kept as raw string records so columns the tools do not know
/// about survive a rewrite untouched.
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::Deserialize;
use thiserror::Error;

pub const KEYWORDS_COLUMN: &str = "keywords";
pub const ANSWER_COLUMN: &str = "answer";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("column '{0}' not found")]
    MissingColumn(String),
}

/// One question of the evaluation set.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EvalRecord {
    #[serde(default)]
    pub query_id: String,
    pub query: String,
    #[serde(default)]
    pub pdf_filename: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub keywords: String,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Dataset {
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let read_err = |source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;
        let headers = reader.headers().map_err(read_err)?.clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;

        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let write_err = |source| DatasetError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(write_err)?;
        writer.write_record(&self.headers).map_err(write_err)?;
        for row in &self.rows {
            writer.write_record(row).map_err(write_err)?;
        }
        writer
            .flush()
            .map_err(|e| write_err(csv::Error::from(e)))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of column `name`, `""` where a row is short.
    pub fn column_values(&self, name: &str) -> Result<Vec<String>, DatasetError> {
        let idx = self
            .column(name)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).unwrap_or_default().to_string())
            .collect())
    }

    /// Replace column `name` with `values`, appending it if absent.
    /// Every other column keeps its position and contents.
    pub fn set_column(&mut self, name: &str, values: &[String]) {
        let width = self.headers.len();
        let idx = match self.column(name) {
            Some(idx) => idx,
            None => {
                self.headers.push_field(name);
                width
            }
        };

        for (row, value) in self.rows.iter_mut().zip(values) {
            let mut fields: Vec<&str> = row.iter().collect();
            fields.resize(fields.len().max(idx + 1), "");
            fields[idx] = value.as_str();
            *row = StringRecord::from(fields);
        }
    }

    /// Typed view of every row.
    pub fn records(&self) -> Result<Vec<EvalRecord>, DatasetError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.deserialize(Some(&self.headers))
                    .map_err(|source| DatasetError::Row { row: i + 1, source })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "query_id,query,pdf_filename,answer,extra\n\
                          1,What grew?,Report_2023.pdf,\"Revenue grew, a lot\",x\n\
                          2,Who?,notes.pdf,Alice,y\n";

    fn write_sample(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("eval.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_records_without_keywords_column() {
        let tmp = TempDir::new().unwrap();
        let dataset = Dataset::read(&write_sample(&tmp)).unwrap();

        assert_eq!(dataset.len(), 2);
        assert!(dataset.column(KEYWORDS_COLUMN).is_none());

        let records = dataset.records().unwrap();
        assert_eq!(records[0].query_id, "1");
        assert_eq!(records[0].answer, "Revenue grew, a lot");
        assert_eq!(records[0].keywords, "");
    }

    #[test]
    fn test_set_column_appends_then_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = write_sample(&tmp);
        let mut dataset = Dataset::read(&path).unwrap();

        dataset.set_column(KEYWORDS_COLUMN, &["revenue".into(), "alice".into()]);
        dataset.write(&path).unwrap();

        let reread = Dataset::read(&path).unwrap();
        assert_eq!(reread.column(KEYWORDS_COLUMN), Some(5));
        assert_eq!(reread.column("extra"), Some(4));
        assert_eq!(reread.records().unwrap()[1].keywords, "alice");

        let mut again = reread.clone();
        again.set_column(KEYWORDS_COLUMN, &["growth".into(), "".into()]);
        assert_eq!(again.column_values(KEYWORDS_COLUMN).unwrap(), vec!["growth", ""]);
        assert_eq!(again.column_values("extra").unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_missing_column_error() {
        let tmp = TempDir::new().unwrap();
        let dataset = Dataset::read(&write_sample(&tmp)).unwrap();
        let err = dataset.column_values("nope").unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn(_)));
    }

    #[test]
    fn test_read_missing_file() {
        let err = Dataset::read(Path::new("/nonexistent/eval.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/eval.csv"));
    }
}
