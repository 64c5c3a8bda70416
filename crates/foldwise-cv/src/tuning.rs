//! Exhaustive grid search over estimator hyperparameters.

use std::num::NonZeroUsize;

use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::error::CvError;
use crate::estimator::Estimator;
use crate::metadata::TuningRecord;
use crate::metrics::Scoring;
use crate::model::{Model, SupervisedModel, Tunable};
use crate::params::{ParamGrid, ParamSet};
use crate::partition::{FoldPartitioner, take_rows};
use crate::result::mean_std;
use crate::target::Target;

/// One row of the grid search score table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    /// The candidate's parameter combination.
    pub params: ParamSet,
    /// Validation score of each fold.
    pub split_scores: Vec<f64>,
    /// Mean of `split_scores`.
    pub mean_score: f64,
    /// Population std of `split_scores`.
    pub std_score: f64,
    /// 1-based rank by mean score; tied candidates share the lower rank.
    pub rank: usize,
}

/// Outcome of a grid search.
#[derive(Debug, Clone, Serialize)]
pub struct TuningResult<E> {
    /// The winning parameter combination.
    pub best_params: ParamSet,
    /// Its mean cross-validated score.
    pub best_score: f64,
    /// The winner refitted on all rows; also installed in the model.
    #[serde(skip)]
    pub best_estimator: E,
    /// One row per candidate, in grid order.
    pub cv_results: Vec<CandidateScore>,
    /// Scorer used to rank candidates.
    pub scoring: Scoring,
    /// Number of folds.
    pub cv: usize,
    /// Number of candidates evaluated.
    pub n_candidates: usize,
}

/// Resolve an `n_jobs` value to a worker count.
///
/// `-1` is every core, `k > 0` is `k` workers capped at the core count,
/// `k <= -2` is every core but `|k| - 1`.
///
/// # Errors
///
/// Returns [`CvError::InvalidParallelism`] for `0` or when fewer than one
/// worker would remain.
pub fn resolve_n_jobs(n_jobs: i32) -> Result<usize, CvError> {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    match n_jobs {
        0 => Err(CvError::InvalidParallelism { n_jobs }),
        k if k > 0 => Ok((k as usize).min(cores)),
        k => {
            let reserved = k.unsigned_abs() as usize - 1;
            cores
                .checked_sub(reserved)
                .filter(|&w| w >= 1)
                .ok_or(CvError::InvalidParallelism { n_jobs })
        }
    }
}

/// Grid search configuration.
///
/// Construct via [`GridSearch::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `scoring` | task default (`accuracy` or `r2`) |
/// | `n_jobs`  | -1 (all cores) |
///
/// Folds are unshuffled, and stratified for classification.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: ParamGrid,
    n_folds: usize,
    scoring: Option<Scoring>,
    n_jobs: i32,
}

impl GridSearch {
    /// Create a grid search over `grid` scored with `n_folds`-fold CV.
    ///
    /// # Errors
    ///
    /// Returns [`CvError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(grid: ParamGrid, n_folds: usize) -> Result<Self, CvError> {
        if n_folds < 2 {
            return Err(CvError::InvalidFoldCount { n_folds });
        }
        Ok(Self {
            grid,
            n_folds,
            scoring: None,
            n_jobs: -1,
        })
    }

    /// Set the scorer used to rank candidates.
    #[must_use]
    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = Some(scoring);
        self
    }

    /// Set the parallelism degree (see [`resolve_n_jobs`]).
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Evaluate every candidate, refit the best on all rows, and install it
    /// in `model`.
    ///
    /// On success `model` is trained with the winning estimator and
    /// `metadata.hyperparameter_tuning` is replaced. If any candidate fails
    /// the model is unchanged.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::InvalidScoring`] | Scorer does not fit the model's task |
    /// | [`CvError::MissingEstimator`] | Model holds no estimator |
    /// | [`CvError::TargetLengthMismatch`] | `targets.len() != features.len()` |
    /// | [`CvError::EmptyParamGrid`] | A grid axis has no values |
    /// | [`CvError::InsufficientData`] | Fewer samples than folds |
    /// | [`CvError::InvalidParallelism`] | `n_jobs` resolves to no workers |
    /// | [`CvError::CandidateParams`] | A candidate's parameters are rejected |
    /// | [`CvError::CandidateExecution`] | A candidate fails on some fold |
    /// | [`CvError::Model`] | Refitting the winner fails |
    #[instrument(skip_all, fields(model = model.name(), n_folds = self.n_folds, n_candidates = self.grid.n_candidates()))]
    pub fn run<M: Tunable>(
        &self,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[M::Target],
    ) -> Result<TuningResult<M::Estimator>, CvError> {
        self.search(model, features, targets)
            .inspect_err(|e| error!(model = model.name(), error = %e, "hyperparameter tuning failed"))
    }

    fn search<M: Tunable>(
        &self,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[M::Target],
    ) -> Result<TuningResult<M::Estimator>, CvError> {
        let task = <M::Target as Target>::TASK;
        let scoring = self
            .scoring
            .unwrap_or_else(<M::Target as Target>::default_scoring);
        if scoring.task() != task {
            return Err(CvError::InvalidScoring {
                scoring: scoring.to_string(),
                task: task.to_string(),
            });
        }

        let base = model
            .estimator()
            .cloned()
            .ok_or_else(|| CvError::MissingEstimator {
                name: model.name().to_string(),
            })?;

        if targets.len() != features.len() {
            return Err(CvError::TargetLengthMismatch {
                n_samples: features.len(),
                n_targets: targets.len(),
            });
        }

        let candidates = self.grid.candidates()?;
        let strata = <M::Target as Target>::strata(targets);
        let folds: Vec<FoldData<M::Target>> = FoldPartitioner::new(self.n_folds)?
            .with_shuffle(false)
            .split(features.len(), strata)?
            .map(|fold| FoldData {
                train_x: take_rows(features, &fold.train_indices),
                train_y: take_rows(targets, &fold.train_indices),
                val_x: take_rows(features, &fold.validation_indices),
                val_y: take_rows(targets, &fold.validation_indices),
            })
            .collect();

        // At most one worker per candidate.
        let workers = resolve_n_jobs(self.n_jobs)?.min(candidates.len().max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|source| CvError::ThreadPool { source })?;

        info!(
            n_candidates = candidates.len(),
            workers,
            %scoring,
            "starting grid search"
        );

        let outcomes: Vec<Result<Vec<f64>, CvError>> = pool.install(|| {
            candidates
                .par_iter()
                .enumerate()
                .map(|(candidate, params)| {
                    score_candidate(&base, candidate, params, &folds, scoring)
                })
                .collect()
        });

        let mut split_scores = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            split_scores.push(outcome?);
        }

        let mut cv_results: Vec<CandidateScore> = candidates
            .into_iter()
            .zip(split_scores)
            .map(|(params, scores)| {
                let (mean_score, std_score) = mean_std(&scores);
                CandidateScore {
                    params,
                    split_scores: scores,
                    mean_score,
                    std_score,
                    rank: 0,
                }
            })
            .collect();
        assign_ranks(&mut cv_results);

        let mut best_idx = 0;
        for (i, row) in cv_results.iter().enumerate() {
            if row.mean_score > cv_results[best_idx].mean_score {
                best_idx = i;
            }
        }
        let best_params = cv_results[best_idx].params.clone();
        let best_score = cv_results[best_idx].mean_score;

        let mut winner = base;
        winner.set_params(&best_params)?;
        model.install_estimator(winner);
        model.train(features, targets, 0.0)?;
        let best_estimator = model
            .estimator()
            .cloned()
            .ok_or_else(|| CvError::MissingEstimator {
                name: model.name().to_string(),
            })?;

        let n_candidates = cv_results.len();
        model.metadata_mut().hyperparameter_tuning = Some(TuningRecord {
            best_params: best_params.clone(),
            best_score,
            cv: self.n_folds,
            scoring,
            n_candidates,
        });

        info!(best_score, best_candidate = best_idx, ?best_params, "grid search complete");

        Ok(TuningResult {
            best_params,
            best_score,
            best_estimator,
            cv_results,
            scoring,
            cv: self.n_folds,
            n_candidates,
        })
    }
}

/// Pre-sliced rows of one fold, shared read-only by every candidate.
struct FoldData<T> {
    train_x: Vec<Vec<f64>>,
    train_y: Vec<T>,
    val_x: Vec<Vec<f64>>,
    val_y: Vec<T>,
}

fn score_candidate<E: Estimator>(
    base: &E,
    candidate: usize,
    params: &ParamSet,
    folds: &[FoldData<E::Target>],
    scoring: Scoring,
) -> Result<Vec<f64>, CvError> {
    let mut estimator = base.clone();
    estimator
        .set_params(params)
        .map_err(|source| CvError::CandidateParams { candidate, source })?;

    let mut scores = Vec::with_capacity(folds.len());
    for (fold, data) in folds.iter().enumerate() {
        let wrap = |source| CvError::CandidateExecution {
            candidate,
            fold,
            source,
        };
        estimator.fit(&data.train_x, &data.train_y).map_err(wrap)?;
        let predictions = estimator.predict(&data.val_x).map_err(wrap)?;
        let score = <E::Target as Target>::score(scoring, &data.val_y, &predictions)
            .map_err(|e| wrap(e.into()))?;
        scores.push(score);
    }
    debug!(candidate, ?params, ?scores, "candidate scored");
    Ok(scores)
}

/// Rank by descending mean score; ties share the lowest rank.
fn assign_ranks(rows: &mut [CandidateScore]) {
    let means: Vec<f64> = rows.iter().map(|r| r.mean_score).collect();
    for row in rows.iter_mut() {
        row.rank = 1 + means.iter().filter(|&&m| m > row.mean_score).count();
    }
}

impl<E: Estimator> SupervisedModel<E> {
    /// Grid-search this model's estimator and install the refitted winner.
    ///
    /// `scoring` defaults to accuracy for classifiers and R² for regressors.
    ///
    /// # Errors
    ///
    /// See [`GridSearch::run`]; also [`CvError::InvalidFoldCount`] if `cv` < 2.
    pub fn hyperparameter_tune(
        &mut self,
        features: &[Vec<f64>],
        targets: &[E::Target],
        grid: ParamGrid,
        cv: usize,
        scoring: Option<Scoring>,
        n_jobs: i32,
    ) -> Result<TuningResult<E>, CvError> {
        let mut search = GridSearch::new(grid, cv)
            .inspect_err(|e| error!(model = %self.name, error = %e, "invalid grid search config"))?
            .with_n_jobs(n_jobs);
        if let Some(scoring) = scoring {
            search = search.with_scoring(scoring);
        }
        search.run(self, features, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{MajorityClassifier, SlopeRegressor, two_class_data};
    use crate::params::ParamValue;

    fn bias_grid() -> ParamGrid {
        ParamGrid::new().with_axis("bias", [1usize, 0, 2])
    }

    #[test]
    fn n_jobs_resolution() {
        assert!(matches!(
            resolve_n_jobs(0),
            Err(CvError::InvalidParallelism { n_jobs: 0 })
        ));
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        assert_eq!(resolve_n_jobs(1).unwrap(), 1);
        assert_eq!(resolve_n_jobs(3).unwrap(), 3usize.min(cores));
        assert_eq!(resolve_n_jobs(i32::MAX).unwrap(), cores);
        assert_eq!(resolve_n_jobs(-1).unwrap(), cores);
        assert!(resolve_n_jobs(-1000).is_err());
    }

    #[test]
    fn picks_best_and_installs_it() {
        let (x, y) = two_class_data(20);
        let mut model = SupervisedModel::new(
            "m",
            MajorityClassifier {
                bias: 5,
                ..Default::default()
            },
        );
        let result = model
            .hyperparameter_tune(&x, &y, bias_grid(), 4, None, 2)
            .unwrap();

        // Bias 0 scores 0.4 per fold, bias 1 averages 0.3, bias 2 never matches.
        assert_eq!(result.best_params["bias"], ParamValue::from(0usize));
        assert_eq!(result.n_candidates, 3);
        assert_eq!(result.cv_results.len(), 3);
        assert_eq!(result.cv_results[1].rank, 1);
        assert_eq!(result.scoring, Scoring::Accuracy);

        assert!(model.is_trained());
        assert_eq!(model.estimator().unwrap().bias, 0);
        let tuning = model.metadata().hyperparameter_tuning.as_ref().unwrap();
        assert_eq!(tuning.cv, 4);
        assert!((tuning.best_score - result.best_score).abs() < f64::EPSILON);
    }

    #[test]
    fn oversized_n_jobs_still_searches() {
        let (x, y) = two_class_data(20);
        let mut model = SupervisedModel::new("m", MajorityClassifier::default());
        let result = model
            .hyperparameter_tune(&x, &y, bias_grid(), 4, None, i32::MAX)
            .unwrap();
        assert_eq!(result.best_params["bias"], ParamValue::from(0usize));
    }

    #[test]
    fn ties_go_to_first_candidate() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let grid = ParamGrid::new().with_axis("slope", [2.0, 0.5, 1.0]);
        let mut model = SupervisedModel::new("r", SlopeRegressor::new(0.0));
        let result = model
            .hyperparameter_tune(&x, &y, grid, 2, Some(Scoring::NegMeanSquaredError), 1)
            .unwrap();
        assert_eq!(result.best_params["slope"], ParamValue::from(1.0));

        let grid = ParamGrid::new().with_axis("slope", [2.0, 0.0, 3.0]);
        let result = model
            .hyperparameter_tune(&x, &y, grid, 2, Some(Scoring::NegMeanAbsoluteError), 1)
            .unwrap();
        // Slopes 2 and 0 both miss y = x by |x|; the earlier one wins.
        assert_eq!(result.best_params["slope"], ParamValue::from(2.0));
        assert_eq!(result.cv_results[0].rank, 1);
        assert_eq!(result.cv_results[1].rank, 1);
        assert_eq!(result.cv_results[2].rank, 3);
    }

    #[test]
    fn scoring_must_match_task() {
        let (x, y) = two_class_data(10);
        let mut model = SupervisedModel::new("m", MajorityClassifier::default());
        let err = model
            .hyperparameter_tune(&x, &y, bias_grid(), 2, Some(Scoring::R2), 1)
            .unwrap_err();
        assert!(matches!(err, CvError::InvalidScoring { .. }));
    }

    #[test]
    fn missing_estimator() {
        let (x, y) = two_class_data(10);
        let mut model: SupervisedModel<MajorityClassifier> = SupervisedModel::unconfigured("bare");
        let err = model
            .hyperparameter_tune(&x, &y, bias_grid(), 2, None, 1)
            .unwrap_err();
        assert!(matches!(err, CvError::MissingEstimator { name } if name == "bare"));
    }

    #[test]
    fn failing_candidate_aborts() {
        let (x, y) = two_class_data(10);
        let mut model = SupervisedModel::new(
            "m",
            MajorityClassifier {
                fail_on_fit: true,
                ..Default::default()
            },
        );
        let err = model
            .hyperparameter_tune(&x, &y, bias_grid(), 2, None, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            CvError::CandidateExecution {
                candidate: 0,
                fold: 0,
                ..
            }
        ));
        assert!(model.metadata().hyperparameter_tuning.is_none());
        assert!(!model.is_trained());
    }

    #[test]
    fn unknown_param_is_reported() {
        let (x, y) = two_class_data(10);
        let mut model = SupervisedModel::new("m", MajorityClassifier::default());
        let grid = ParamGrid::new().with_axis("depth", [1usize]);
        let err = model.hyperparameter_tune(&x, &y, grid, 2, None, 1).unwrap_err();
        assert!(matches!(err, CvError::CandidateParams { candidate: 0, .. }));
    }
}
