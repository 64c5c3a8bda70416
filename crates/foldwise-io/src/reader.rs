//! CSV dataset reader with full input validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use foldwise_cv::Task;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ClassEncoding, FeatureTable, TabularDataset, Targets};

/// Reads a tabular dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required, with unique column names
/// - One column is the target; every other column is a numeric feature
/// - All rows must have the same number of columns
///
/// Class labels may be any non-empty string; they are encoded to dense
/// indices by [`ClassEncoding`]. Regression targets and feature cells must
/// parse as finite floats.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::DuplicateColumn`] | Header repeats a column name |
/// | [`IoError::MissingTargetColumn`] | Target column not in header |
/// | [`IoError::NoFeatureColumns`] | Target is the only column |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Numeric cell is NaN, Inf, or unparseable |
/// | [`IoError::EmptyLabel`] | Class label cell is blank |
pub struct CsvReader {
    path: PathBuf,
}

impl CsvReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read features plus the `target` column, typed by `task`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, target: &str, task: Task) -> Result<TabularDataset, IoError> {
        let (header, records) = self.load()?;

        let Some(target_idx) = header.iter().position(|h| h == target) else {
            return Err(IoError::MissingTargetColumn {
                path: self.path.clone(),
                target: target.to_string(),
                available: header.join(","),
            });
        };
        let feature_cols: Vec<usize> = (0..header.len()).filter(|&i| i != target_idx).collect();
        if feature_cols.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        let mut features = Vec::with_capacity(records.len());
        for (row_index, record) in records.iter().enumerate() {
            features.push(self.parse_row(&header, record, row_index, &feature_cols)?);
        }

        let targets = match task {
            Task::Classification => {
                let mut raw = Vec::with_capacity(records.len());
                for (row_index, record) in records.iter().enumerate() {
                    let cell = record.get(target_idx).unwrap_or("").trim();
                    if cell.is_empty() {
                        return Err(IoError::EmptyLabel {
                            path: self.path.clone(),
                            row_index,
                        });
                    }
                    raw.push(cell);
                }
                let encoding = ClassEncoding::fit(raw.iter().copied());
                let labels = raw
                    .iter()
                    .map(|c| encoding.encode(c).unwrap_or_default())
                    .collect();
                debug!(n_classes = encoding.len(), "class labels encoded");
                Targets::Classes { labels, encoding }
            }
            Task::Regression => {
                let mut values = Vec::with_capacity(records.len());
                for (row_index, record) in records.iter().enumerate() {
                    values.push(self.parse_cell(&header, record, row_index, target_idx)?);
                }
                Targets::Values(values)
            }
        };

        let feature_names: Vec<String> = feature_cols.iter().map(|&i| header[i].clone()).collect();
        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            target_column = target,
            task = %task,
            "dataset loaded"
        );
        Ok(TabularDataset::new(
            feature_names,
            features,
            target.to_string(),
            targets,
        ))
    }

    /// Read rows to predict on.
    ///
    /// With `columns`, picks exactly those columns in that order, so a file
    /// that still carries its target (or extra columns) can be scored.
    /// Without, every column is a feature.
    ///
    /// # Errors
    ///
    /// As for [`CsvReader::read`], plus [`IoError::MissingFeatureColumn`].
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn read_features(&self, columns: Option<&[String]>) -> Result<FeatureTable, IoError> {
        let (header, records) = self.load()?;

        let cols: Vec<usize> = match columns {
            Some(names) => names
                .iter()
                .map(|name| {
                    header
                        .iter()
                        .position(|h| h == name)
                        .ok_or_else(|| IoError::MissingFeatureColumn {
                            path: self.path.clone(),
                            column: name.clone(),
                        })
                })
                .collect::<Result<_, _>>()?,
            None => (0..header.len()).collect(),
        };

        let mut features = Vec::with_capacity(records.len());
        for (row_index, record) in records.iter().enumerate() {
            features.push(self.parse_row(&header, record, row_index, &cols)?);
        }

        info!(n_samples = features.len(), n_features = cols.len(), "feature rows loaded");
        Ok(FeatureTable {
            feature_names: cols.iter().map(|&i| header[i].clone()).collect(),
            features,
        })
    }

    /// Header and records, with shape checks applied.
    fn load(&self) -> Result<(Vec<String>, Vec<csv::StringRecord>), IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that ragged rows surface as InconsistentRowLength
        // rather than a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| self.csv_error(e))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut seen = HashSet::new();
        for name in &header {
            if !seen.insert(name.as_str()) {
                return Err(IoError::DuplicateColumn {
                    path: self.path.clone(),
                    name: name.clone(),
                });
            }
        }
        debug!(n_columns = header.len(), "read CSV header");

        let mut records = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            if record.len() != header.len() {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: header.len(),
                    got: record.len(),
                });
            }
            records.push(record);
        }

        if records.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        Ok((header, records))
    }

    fn parse_row(
        &self,
        header: &[String],
        record: &csv::StringRecord,
        row_index: usize,
        cols: &[usize],
    ) -> Result<Vec<f64>, IoError> {
        cols.iter()
            .map(|&col| self.parse_cell(header, record, row_index, col))
            .collect()
    }

    fn parse_cell(
        &self,
        header: &[String],
        record: &csv::StringRecord,
        row_index: usize,
        col: usize,
    ) -> Result<f64, IoError> {
        let raw = record.get(col).unwrap_or("");
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: header[col].clone(),
                raw: raw.to_string(),
            }),
        }
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_classification_with_text_labels() {
        let f = write_csv("x,species,y\n1.0,setosa,2.0\n3.0,virginica,4.0\n5.0,setosa,6.0\n");
        let ds = CsvReader::new(f.path())
            .read("species", Task::Classification)
            .unwrap();
        assert_eq!(ds.feature_names(), &["x", "y"]);
        assert_eq!(ds.features()[1], vec![3.0, 4.0]);
        let Targets::Classes { labels, encoding } = ds.targets() else {
            panic!("expected classes");
        };
        assert_eq!(labels, &vec![0, 1, 0]);
        assert_eq!(encoding.classes(), &["setosa", "virginica"]);
        assert_eq!(ds.class_counts().unwrap()["setosa"], 2);
    }

    #[test]
    fn read_regression_target() {
        let f = write_csv("a,b,price\n1,2,10.5\n3,4,11.25\n");
        let ds = CsvReader::new(f.path()).read("price", Task::Regression).unwrap();
        assert_eq!(ds.targets(), &Targets::Values(vec![10.5, 11.25]));
        assert_eq!(ds.targets().task(), Task::Regression);
        assert_eq!(ds.n_features(), 2);
        assert!(ds.class_counts().is_none());
    }

    #[test]
    fn value_round_trip() {
        let f = write_csv("t,v\n0,1.23456789\n");
        let ds = CsvReader::new(f.path()).read("t", Task::Regression).unwrap();
        assert!((ds.features()[0][0] - 1.23456789).abs() < 1e-12);
    }

    #[test]
    fn error_file_not_found() {
        let result = CsvReader::new(Path::new("/nonexistent/file.csv")).read("y", Task::Regression);
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_missing_target() {
        let f = write_csv("a,b\n1,2\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(
            result,
            Err(IoError::MissingTargetColumn { available, .. }) if available == "a,b"
        ));
    }

    #[test]
    fn error_target_only_column() {
        let f = write_csv("label\na\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(result, Err(IoError::NoFeatureColumns { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("a,label\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_duplicate_column() {
        let f = write_csv("a,a,label\n1,2,x\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(result, Err(IoError::DuplicateColumn { name, .. }) if name == "a"));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let f = write_csv("a,b,label\n1,2,x\n1,y\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength {
                row_index: 1,
                expected: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn error_non_finite_feature_names_column() {
        let f = write_csv("a,b,label\n1,NaN,x\n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(
            result,
            Err(IoError::NonFiniteValue { row_index: 0, column, .. }) if column == "b"
        ));
    }

    #[test]
    fn error_unparseable_regression_target() {
        let f = write_csv("a,y\n1,2\n2,abc\n");
        let result = CsvReader::new(f.path()).read("y", Task::Regression);
        assert!(matches!(
            result,
            Err(IoError::NonFiniteValue { row_index: 1, column, raw, .. }) if column == "y" && raw == "abc"
        ));
    }

    #[test]
    fn error_blank_label() {
        let f = write_csv("a,label\n1,x\n2, \n");
        let result = CsvReader::new(f.path()).read("label", Task::Classification);
        assert!(matches!(result, Err(IoError::EmptyLabel { row_index: 1, .. })));
    }

    #[test]
    fn read_features_selects_named_columns() {
        let f = write_csv("b,label,a\n2,x,1\n4,y,3\n");
        let names = vec!["a".to_string(), "b".to_string()];
        let table = CsvReader::new(f.path()).read_features(Some(&names)).unwrap();
        assert_eq!(table.feature_names, names);
        assert_eq!(table.features, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let missing = vec!["c".to_string()];
        assert!(matches!(
            CsvReader::new(f.path()).read_features(Some(&missing)),
            Err(IoError::MissingFeatureColumn { column, .. }) if column == "c"
        ));
    }
}
