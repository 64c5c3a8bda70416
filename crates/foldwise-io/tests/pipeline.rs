//! End-to-end integration tests: CSV -> cross-validate/tune/train -> JSON -> read back.

use std::fs;
use std::path::{Path, PathBuf};

use foldwise_cv::{Model, ParamGrid, SupervisedModel, Task};
use foldwise_io::{
    ClassEncoding, CsvReader, ExperimentName, IoError, ReportWriter, RunSummary, Targets,
    TrainingReport, read_training_report,
};
use foldwise_models::{EnsembleConfig, MaxFeatures, TreeEnsembleClassifier, TreeEnsembleRegressor};
use tempfile::TempDir;

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn config(n_trees: usize) -> EnsembleConfig {
    EnsembleConfig::new(n_trees)
        .unwrap()
        .with_max_features(MaxFeatures::All)
}

fn class_targets(targets: &Targets) -> (&[usize], &ClassEncoding) {
    match targets {
        Targets::Classes { labels, encoding } => (labels.as_slice(), encoding),
        Targets::Values(_) => panic!("expected class targets"),
    }
}

#[test]
fn classification_cv_round_trip() {
    // 1. Read CSV
    let data_path = fixture_path("flowers_30.csv");
    let dataset = CsvReader::new(&data_path)
        .read("species", Task::Classification)
        .expect("fixture should parse");
    assert_eq!(dataset.n_samples(), 30);
    assert_eq!(dataset.feature_names(), &["sepal", "petal"]);
    let (labels, encoding) = class_targets(dataset.targets());
    assert_eq!(encoding.classes(), &["setosa", "versicolor", "virginica"]);

    // 2. Cross-validate (three well separated groups)
    let mut model = SupervisedModel::new("flowers", TreeEnsembleClassifier::new(config(20)))
        .with_feature_names(dataset.feature_names().to_vec());
    let cv = model
        .cross_validate_classification(dataset.features(), labels, 3, true)
        .unwrap();
    assert!(cv.mean_accuracy > 0.9, "mean accuracy {}", cv.mean_accuracy);

    // 3. Write JSON artifact
    let dir = TempDir::new().unwrap();
    let writer =
        ReportWriter::new(dir.path(), ExperimentName::new("flowers_cv".into()).unwrap()).unwrap();
    let summary = RunSummary {
        model_type: "tree_ensemble_classifier",
        task: Task::Classification,
        data: &data_path,
        target: dataset.target_name(),
        n_samples: dataset.n_samples(),
        feature_names: dataset.feature_names(),
    };
    let record = model.get_cross_validation_results().unwrap();
    let path = writer.write_cv(&summary, record).unwrap();

    // 4. Read back and verify
    let content = read_json(&path);
    assert_eq!(content["experiment"], "flowers_cv");
    assert_eq!(content["target"], "species");
    let result = &content["result"]["classification"];
    assert_eq!(result["cv_folds"], 3);
    let accuracies = result["accuracy_scores"].as_array().unwrap();
    assert_eq!(accuracies.len(), 3);
    for a in accuracies {
        let a = a.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&a));
    }
}

#[test]
fn regression_cv_writes_regression_record() {
    let data_path = fixture_path("prices_24.csv");
    let dataset = CsvReader::new(&data_path)
        .read("price", Task::Regression)
        .unwrap();
    let Targets::Values(targets) = dataset.targets() else {
        panic!("expected continuous targets");
    };

    let mut model = SupervisedModel::new("prices", TreeEnsembleRegressor::new(config(30)));
    let cv = model
        .cross_validate_regression(dataset.features(), targets, 3)
        .unwrap();
    assert!(cv.mean_r2 > 0.5, "mean r2 {}", cv.mean_r2);

    let dir = TempDir::new().unwrap();
    let writer =
        ReportWriter::new(dir.path(), ExperimentName::new("prices".into()).unwrap()).unwrap();
    let summary = RunSummary {
        model_type: "tree_ensemble_regressor",
        task: Task::Regression,
        data: &data_path,
        target: dataset.target_name(),
        n_samples: dataset.n_samples(),
        feature_names: dataset.feature_names(),
    };
    let path = writer
        .write_cv(&summary, model.get_cross_validation_results().unwrap())
        .unwrap();

    let content = read_json(&path);
    assert_eq!(content["task"], "regression");
    assert!(content["result"].get("classification").is_none());
    assert_eq!(
        content["result"]["regression"]["r2_scores"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn tune_train_save_predict_round_trip() {
    let dataset = CsvReader::new(&fixture_path("flowers_30.csv"))
        .read("species", Task::Classification)
        .unwrap();
    let (labels, encoding) = class_targets(dataset.targets());
    let dir = TempDir::new().unwrap();
    let writer =
        ReportWriter::new(dir.path(), ExperimentName::new("flowers".into()).unwrap()).unwrap();

    // 1. Tune
    let mut model = SupervisedModel::new("flowers", TreeEnsembleClassifier::new(config(10)))
        .with_feature_names(dataset.feature_names().to_vec());
    let grid = ParamGrid::new().with_axis("n_trees", [5usize, 15]);
    let tuning = model
        .hyperparameter_tune(dataset.features(), labels, grid, 3, None, 1)
        .unwrap();
    assert_eq!(tuning.cv_results.len(), 2);

    // 2. Train on everything and persist model plus report
    model.train(dataset.features(), labels, 0.0).unwrap();
    model.save(writer.model_path()).unwrap();
    let report = TrainingReport {
        experiment: "flowers".into(),
        feature_names: model.feature_names().to_vec(),
        target: dataset.target_name().to_string(),
        classes: encoding.classes().to_vec(),
        params: tuning.best_params.clone(),
        feature_importance: model.ranked_importances(),
        metadata: model.metadata().clone(),
    };
    let report_path = writer.write_training(&report).unwrap();

    // 3. Reload both and score unlabeled rows whose columns are reordered
    let loaded: SupervisedModel<TreeEnsembleClassifier> =
        SupervisedModel::load(writer.model_path()).unwrap();
    let report = read_training_report(&report_path).unwrap();
    assert!(report.metadata.trained);
    assert!(report.metadata.hyperparameter_tuning.is_some());

    let table = CsvReader::new(&fixture_path("unlabeled_3.csv"))
        .read_features(Some(report.feature_names.as_slice()))
        .unwrap();
    assert_eq!(table.feature_names, vec!["sepal", "petal"]);

    let encoding = ClassEncoding::from_classes(report.classes);
    let predicted: Vec<String> = loaded
        .predict(&table.features)
        .unwrap()
        .into_iter()
        .map(|label| encoding.decode(label))
        .collect();
    assert_eq!(predicted, vec!["setosa", "versicolor", "virginica"]);

    let proba = loaded.predict_proba(&table.features).unwrap();
    let path = writer
        .write_predictions(
            loaded.name(),
            predicted.as_slice(),
            Some(proba.as_slice()),
            Some(encoding.classes()),
        )
        .unwrap();
    let content = read_json(&path);
    assert_eq!(content["n_samples"], 3);
    assert_eq!(content["predictions"][2], "virginica");
    assert_eq!(content["probabilities"].as_array().unwrap().len(), 3);
}

#[test]
fn unknown_target_lists_columns() {
    let err = CsvReader::new(&fixture_path("prices_24.csv"))
        .read("cost", Task::Regression)
        .unwrap_err();
    match err {
        IoError::MissingTargetColumn { available, .. } => assert_eq!(available, "a,b,price"),
        other => panic!("unexpected error: {other}"),
    }
}
