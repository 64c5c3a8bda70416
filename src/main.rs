use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use foldwise_cv::{
    CrossValidation, CrossValidationRecord, CvError, Estimator, GridSearch, Model, ParamGrid,
    ParamSet, ParamValue, Scoring, SupervisedModel, Target, Task, Tunable,
};
use foldwise_io::{
    ClassEncoding, CsvReader, ExperimentName, FeatureTable, ReportWriter, RunSummary,
    TabularDataset, Targets, TrainingReport, read_param_grid, read_training_report,
};
use foldwise_models::{
    NeuralClassifier, NeuralRegressor, TreeEnsembleClassifier, TreeEnsembleRegressor,
};

#[derive(Parser)]
#[command(name = "foldwise")]
#[command(about = "K-fold cross-validation and grid-search tuning for supervised models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for fold shuffling and estimator initialization
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TaskArg {
    Classification,
    Regression,
}

impl From<TaskArg> for Task {
    fn from(task: TaskArg) -> Self {
        match task {
            TaskArg::Classification => Task::Classification,
            TaskArg::Regression => Task::Regression,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelFamily {
    /// Bagged CART trees
    Tree,
    /// One-hidden-layer network
    Neural,
}

/// Dataset, estimator, and output options shared by the fitting commands.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the input CSV file (header row required)
    #[arg(long)]
    data: PathBuf,

    /// Name of the target column
    #[arg(long)]
    target: String,

    /// Learning task
    #[arg(long, value_enum, default_value_t = TaskArg::Classification)]
    task: TaskArg,

    /// Estimator family
    #[arg(long, value_enum, default_value_t = ModelFamily::Tree)]
    model: ModelFamily,

    /// Estimator hyperparameter as name=value (repeatable), e.g. max_depth=5
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Cross-validate one estimator configuration
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        /// Number of cross-validation folds
        #[arg(long, default_value_t = 5)]
        cv: usize,

        /// Plain shuffled folds instead of class-stratified ones
        #[arg(long, default_value_t = false)]
        no_stratify: bool,
    },

    /// Grid-search hyperparameters with cross-validation
    Tune {
        #[command(flatten)]
        data: DataArgs,

        /// JSON file mapping each parameter name to its candidate values
        #[arg(long)]
        grid: PathBuf,

        /// Number of cross-validation folds per candidate
        #[arg(long, default_value_t = 5)]
        cv: usize,

        /// Scorer used to rank candidates (defaults to accuracy or r2)
        #[arg(long)]
        scoring: Option<String>,

        /// Parallel candidate evaluations; negative counts back from all cores
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        n_jobs: i32,
    },

    /// Fit on the whole dataset and save the model
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Fraction of rows held out for a validation score (0 disables)
        #[arg(long, default_value_t = 0.2)]
        validation_split: f64,
    },

    /// Predict targets for new rows with a saved model
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the CSV file with feature columns
        #[arg(long)]
        data: PathBuf,

        /// Training report written beside the model (derived from --model if omitted)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    experiment: &'a str,
    model_type: &'a str,
    task: Task,
    n_samples: usize,
    n_features: usize,
    result: &'a CrossValidationRecord,
    report: PathBuf,
}

#[derive(Serialize)]
struct TuneOutput<'a> {
    experiment: &'a str,
    model_type: &'a str,
    scoring: Scoring,
    n_candidates: usize,
    best_params: &'a ParamSet,
    best_score: f64,
    report: PathBuf,
}

#[derive(Serialize)]
struct TrainOutput<'a> {
    experiment: &'a str,
    model_type: &'a str,
    scoring: Scoring,
    train_score: f64,
    val_score: Option<f64>,
    n_train: usize,
    n_validation: usize,
    model: PathBuf,
    report: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput<'a> {
    experiment: &'a str,
    model_type: &'a str,
    n_samples: usize,
    report: PathBuf,
}

/// Per-task glue between datasets, the CV engine, and prediction reports.
trait TaskTarget: Target {
    /// Borrow the dataset's targets as this type.
    fn targets(dataset: &TabularDataset) -> Result<&[Self]>;

    fn cross_validate<M: Model<Target = Self>>(
        cv: &CrossValidation,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[Self],
    ) -> Result<CrossValidationRecord, CvError>;

    fn write_predictions<M: Model<Target = Self>>(
        model: &M,
        table: &FeatureTable,
        writer: &ReportWriter,
        classes: &ClassEncoding,
    ) -> Result<PathBuf>;
}

impl TaskTarget for usize {
    fn targets(dataset: &TabularDataset) -> Result<&[Self]> {
        match dataset.targets() {
            Targets::Classes { labels, .. } => Ok(labels.as_slice()),
            Targets::Values(_) => bail!("dataset was loaded for regression"),
        }
    }

    fn cross_validate<M: Model<Target = Self>>(
        cv: &CrossValidation,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[Self],
    ) -> Result<CrossValidationRecord, CvError> {
        cv.classification(model, features, targets)
            .map(CrossValidationRecord::Classification)
    }

    fn write_predictions<M: Model<Target = Self>>(
        model: &M,
        table: &FeatureTable,
        writer: &ReportWriter,
        classes: &ClassEncoding,
    ) -> Result<PathBuf> {
        let labels = model.predict(&table.features).context("prediction failed")?;
        let proba = model
            .predict_proba(&table.features)
            .context("probability prediction failed")?;
        let names: Vec<String> = labels.into_iter().map(|l| classes.decode(l)).collect();
        Ok(writer.write_predictions(
            model.name(),
            names.as_slice(),
            Some(proba.as_slice()),
            Some(classes.classes()),
        )?)
    }
}

impl TaskTarget for f64 {
    fn targets(dataset: &TabularDataset) -> Result<&[Self]> {
        match dataset.targets() {
            Targets::Values(values) => Ok(values.as_slice()),
            Targets::Classes { .. } => bail!("dataset was loaded for classification"),
        }
    }

    fn cross_validate<M: Model<Target = Self>>(
        cv: &CrossValidation,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[Self],
    ) -> Result<CrossValidationRecord, CvError> {
        cv.regression(model, features, targets)
            .map(CrossValidationRecord::Regression)
    }

    fn write_predictions<M: Model<Target = Self>>(
        model: &M,
        table: &FeatureTable,
        writer: &ReportWriter,
        _classes: &ClassEncoding,
    ) -> Result<PathBuf> {
        let values = model.predict(&table.features).context("prediction failed")?;
        Ok(writer.write_predictions(model.name(), values.as_slice(), None, None)?)
    }
}

/// A command body that runs against one concrete estimator type.
trait EstimatorJob {
    /// Run with `prototype` as the unfitted estimator (or type witness for loading).
    fn run<E>(self, prototype: E) -> Result<()>
    where
        E: Estimator + Serialize + DeserializeOwned,
        E::Target: TaskTarget;
}

fn dispatch<J: EstimatorJob>(task: Task, family: ModelFamily, job: J) -> Result<()> {
    match (task, family) {
        (Task::Classification, ModelFamily::Tree) => job.run(TreeEnsembleClassifier::default()),
        (Task::Classification, ModelFamily::Neural) => job.run(NeuralClassifier::default()),
        (Task::Regression, ModelFamily::Tree) => job.run(TreeEnsembleRegressor::default()),
        (Task::Regression, ModelFamily::Neural) => job.run(NeuralRegressor::default()),
    }
}

fn family_of(model_type: &str) -> Result<ModelFamily> {
    match model_type {
        "tree_ensemble_classifier" | "tree_ensemble_regressor" => Ok(ModelFamily::Tree),
        "neural_classifier" | "neural_regressor" => Ok(ModelFamily::Neural),
        other => bail!("unknown model type in training report: {other}"),
    }
}

/// Parse `name=value`; the value is read as JSON, falling back to a bare string.
fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("invalid --param {raw:?} (expected name=value)");
    };
    let value = serde_json::from_str::<ParamValue>(value)
        .unwrap_or_else(|_| ParamValue::Text(value.to_string()));
    Ok((name.trim().to_string(), value))
}

/// `{exp}_model.bin` -> `{exp}_metadata.json` in the same directory.
fn sibling_report_path(model: &Path) -> Result<PathBuf> {
    let stem = model
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix("_model.bin"));
    match stem {
        Some(stem) => Ok(model.with_file_name(format!("{stem}_metadata.json"))),
        None => bail!(
            "cannot derive the training report path from {}; pass --report",
            model.display()
        ),
    }
}

/// Loaded dataset plus everything needed to build a model and write reports.
struct RunContext {
    data: PathBuf,
    dataset: TabularDataset,
    writer: ReportWriter,
    overrides: ParamSet,
    seed: u64,
}

impl RunContext {
    fn load(args: &DataArgs, seed: u64) -> Result<Self> {
        let experiment = ExperimentName::new(args.experiment.clone())?;
        let overrides = args
            .params
            .iter()
            .map(|raw| parse_param(raw))
            .collect::<Result<ParamSet>>()?;

        let dataset = CsvReader::new(&args.data)
            .read(&args.target, args.task.into())
            .context("failed to read input CSV")?;
        info!(
            n_samples = dataset.n_samples(),
            n_features = dataset.n_features(),
            "dataset loaded"
        );
        if let Some(counts) = dataset.class_counts() {
            debug!(?counts, "class distribution");
        }

        let writer = ReportWriter::new(&args.output_dir, experiment)?;
        Ok(Self {
            data: args.data.clone(),
            dataset,
            writer,
            overrides,
            seed,
        })
    }

    fn experiment(&self) -> &str {
        self.writer.experiment().as_str()
    }

    /// Seed and configure `estimator`, then wrap it in a named model.
    fn model<E: Estimator>(&self, mut estimator: E) -> Result<SupervisedModel<E>> {
        let seed = i64::try_from(self.seed).context("--seed must fit in a signed 64-bit integer")?;
        estimator.set_param("seed", &ParamValue::from(seed))?;
        estimator
            .set_params(&self.overrides)
            .context("invalid --param")?;
        debug!(params = ?estimator.params(), "estimator configured");

        Ok(SupervisedModel::new(self.experiment(), estimator)
            .with_feature_names(self.dataset.feature_names().to_vec()))
    }

    fn summary<'a>(&'a self, model_type: &'a str) -> RunSummary<'a> {
        RunSummary {
            model_type,
            task: self.dataset.targets().task(),
            data: &self.data,
            target: self.dataset.target_name(),
            n_samples: self.dataset.n_samples(),
            feature_names: self.dataset.feature_names(),
        }
    }
}

struct EvaluateJob {
    ctx: RunContext,
    cv: usize,
    stratified: bool,
}

impl EstimatorJob for EvaluateJob {
    fn run<E>(self, prototype: E) -> Result<()>
    where
        E: Estimator + Serialize + DeserializeOwned,
        E::Target: TaskTarget,
    {
        let ctx = &self.ctx;
        let model_type = prototype.kind();
        let mut model = ctx.model(prototype)?;
        let targets = <E::Target as TaskTarget>::targets(&ctx.dataset)?;

        let cv = CrossValidation::new(self.cv)?
            .with_seed(ctx.seed)
            .with_stratified(self.stratified);
        let record =
            <E::Target as TaskTarget>::cross_validate(&cv, &mut model, ctx.dataset.features(), targets)
                .context("cross-validation failed")?;

        let report = ctx.writer.write_cv(&ctx.summary(model_type), &record)?;

        let output = EvaluateOutput {
            experiment: ctx.experiment(),
            model_type,
            task: ctx.dataset.targets().task(),
            n_samples: ctx.dataset.n_samples(),
            n_features: ctx.dataset.n_features(),
            result: &record,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

struct TuneJob {
    ctx: RunContext,
    grid: ParamGrid,
    cv: usize,
    scoring: Option<Scoring>,
    n_jobs: i32,
}

impl EstimatorJob for TuneJob {
    fn run<E>(self, prototype: E) -> Result<()>
    where
        E: Estimator + Serialize + DeserializeOwned,
        E::Target: TaskTarget,
    {
        let ctx = &self.ctx;
        let model_type = prototype.kind();
        let mut model = ctx.model(prototype)?;
        let targets = <E::Target as TaskTarget>::targets(&ctx.dataset)?;

        let mut search = GridSearch::new(self.grid, self.cv)?.with_n_jobs(self.n_jobs);
        if let Some(scoring) = self.scoring {
            search = search.with_scoring(scoring);
        }
        let result = search
            .run(&mut model, ctx.dataset.features(), targets)
            .context("grid search failed")?;

        let report = ctx.writer.write_tuning(&ctx.summary(model_type), &result)?;

        let output = TuneOutput {
            experiment: ctx.experiment(),
            model_type,
            scoring: result.scoring,
            n_candidates: result.n_candidates,
            best_params: &result.best_params,
            best_score: result.best_score,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

struct TrainJob {
    ctx: RunContext,
    validation_split: f64,
}

impl EstimatorJob for TrainJob {
    fn run<E>(self, prototype: E) -> Result<()>
    where
        E: Estimator + Serialize + DeserializeOwned,
        E::Target: TaskTarget,
    {
        let ctx = &self.ctx;
        let model_type = prototype.kind();
        let mut model = ctx.model(prototype)?;
        let targets = <E::Target as TaskTarget>::targets(&ctx.dataset)?;

        let metrics = model
            .train(ctx.dataset.features(), targets, self.validation_split)
            .context("training failed")?;

        let model_path = ctx.writer.model_path();
        model.save(&model_path).context("failed to save model")?;

        let classes = match ctx.dataset.targets() {
            Targets::Classes { encoding, .. } => encoding.classes().to_vec(),
            Targets::Values(_) => Vec::new(),
        };
        let training = TrainingReport {
            experiment: ctx.experiment().to_string(),
            feature_names: model.feature_names().to_vec(),
            target: ctx.dataset.target_name().to_string(),
            classes,
            params: model.estimator().map(Estimator::params).unwrap_or_default(),
            feature_importance: model.ranked_importances(),
            metadata: model.metadata().clone(),
        };
        let report = ctx.writer.write_training(&training)?;

        let output = TrainOutput {
            experiment: ctx.experiment(),
            model_type,
            scoring: metrics.scoring,
            train_score: metrics.train_score,
            val_score: metrics.val_score,
            n_train: metrics.n_train,
            n_validation: metrics.n_validation,
            model: model_path,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

struct PredictJob {
    model_path: PathBuf,
    table: FeatureTable,
    classes: ClassEncoding,
    writer: ReportWriter,
}

impl EstimatorJob for PredictJob {
    fn run<E>(self, _prototype: E) -> Result<()>
    where
        E: Estimator + Serialize + DeserializeOwned,
        E::Target: TaskTarget,
    {
        let model = SupervisedModel::<E>::load(&self.model_path).context("failed to load model")?;
        info!(
            model = model.name(),
            n_features = model.feature_names().len(),
            "model loaded"
        );

        let report = <E::Target as TaskTarget>::write_predictions(
            &model,
            &self.table,
            &self.writer,
            &self.classes,
        )?;

        let output = PredictOutput {
            experiment: self.writer.experiment().as_str(),
            model_type: &model.metadata().model_type,
            n_samples: self.table.features.len(),
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Evaluate {
            data,
            cv,
            no_stratify,
        } => {
            let ctx = RunContext::load(&data, cli.seed)?;
            let job = EvaluateJob {
                ctx,
                cv,
                stratified: !no_stratify,
            };
            dispatch(data.task.into(), data.model, job)?;
        }

        Command::Tune {
            data,
            grid,
            cv,
            scoring,
            n_jobs,
        } => {
            let scoring = scoring
                .as_deref()
                .map(str::parse::<Scoring>)
                .transpose()?;
            let grid = read_param_grid(&grid).context("failed to read parameter grid")?;
            let ctx = RunContext::load(&data, cli.seed)?;
            let job = TuneJob {
                ctx,
                grid,
                cv,
                scoring,
                n_jobs,
            };
            dispatch(data.task.into(), data.model, job)?;
        }

        Command::Train {
            data,
            validation_split,
        } => {
            let ctx = RunContext::load(&data, cli.seed)?;
            let job = TrainJob {
                ctx,
                validation_split,
            };
            dispatch(data.task.into(), data.model, job)?;
        }

        Command::Predict {
            model,
            data,
            report,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment)?;

            // 1. Training report: model family, feature order, class names
            let report_path = match report {
                Some(path) => path,
                None => sibling_report_path(&model)?,
            };
            let training = read_training_report(&report_path).with_context(|| {
                format!("failed to read training report {}", report_path.display())
            })?;
            let family = family_of(&training.metadata.model_type)?;

            // 2. Feature rows, in the column order the model was trained on
            let table = CsvReader::new(&data)
                .read_features(Some(training.feature_names.as_slice()))
                .context("failed to read input CSV")?;

            // 3. Predict and write
            let writer = ReportWriter::new(&output_dir, experiment_name)?;
            let job = PredictJob {
                model_path: model,
                table,
                classes: ClassEncoding::from_classes(training.classes),
                writer,
            };
            dispatch(training.metadata.task, family, job)?;
        }
    }

    Ok(())
}
