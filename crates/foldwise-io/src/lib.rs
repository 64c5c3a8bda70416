//! CSV datasets, parameter grids, and JSON reports for the foldwise CLI.

mod domain;
mod error;
mod grid;
mod reader;
mod writer;

pub use domain::{ClassEncoding, ExperimentName, FeatureTable, TabularDataset, Targets};
pub use error::IoError;
pub use grid::read_param_grid;
pub use reader::CsvReader;
pub use writer::{ReportWriter, RunSummary, TrainingReport, read_training_report};
