//! Parameter-grid loading.

use std::fs;
use std::path::Path;

use foldwise_cv::ParamGrid;
use tracing::{info, instrument};

use crate::IoError;

/// Read a parameter grid from a JSON object of name to candidate list.
///
/// ```json
/// { "max_depth": [3, null], "n_trees": [50, 100] }
/// ```
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if the file cannot be read and
/// [`IoError::JsonParse`] if it is not an object of arrays.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_param_grid(path: &Path) -> Result<ParamGrid, IoError> {
    let text = fs::read_to_string(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    let grid: ParamGrid = serde_json::from_str(&text).map_err(|e| IoError::JsonParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!(n_candidates = grid.n_candidates(), "parameter grid loaded");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldwise_cv::ParamValue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn grid_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_mixed_value_grid() {
        let f = grid_file(r#"{"max_depth": [3, null], "max_features": ["sqrt", 2], "lr": [0.1]}"#);
        let grid = read_param_grid(f.path()).unwrap();
        assert_eq!(grid.n_candidates(), 4);

        let candidates = grid.candidates().unwrap();
        assert_eq!(candidates[0]["lr"], ParamValue::Float(0.1));
        assert_eq!(candidates[0]["max_depth"], ParamValue::Int(3));
        assert_eq!(candidates[0]["max_features"], ParamValue::Text("sqrt".into()));
        assert_eq!(candidates[1]["max_features"], ParamValue::Int(2));
        assert_eq!(candidates[3]["max_depth"], ParamValue::Null);
    }

    #[test]
    fn scalar_axis_is_rejected() {
        let f = grid_file(r#"{"n_trees": 10}"#);
        assert!(matches!(
            read_param_grid(f.path()),
            Err(IoError::JsonParse { .. })
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_param_grid(Path::new("/nonexistent/grid.json")),
            Err(IoError::FileNotFound { .. })
        ));
    }
}
