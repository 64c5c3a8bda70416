//! Single-hidden-layer perceptrons trained by full-batch gradient descent.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use foldwise_cv::{
    Estimator, ModelError, ParamSet, ParamValue, validate_rows, validate_training,
};

use crate::classes::ClassIndex;

/// Configuration for a one-hidden-layer network.
///
/// Construct via [`NeuralConfig::new`], which validates the layer width,
/// step size, and epoch count. `with_l2` validates its penalty the same
/// way, so a config that builds is ready to fit.
///
/// # Defaults
///
/// | Parameter       | Default  |
/// |-----------------|----------|
/// | `hidden_units`  | 16       |
/// | `learning_rate` | 0.1      |
/// | `epochs`        | 500      |
/// | `l2`            | 1e-4     |
/// | `seed`          | 42       |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NeuralConfig {
    pub(crate) hidden_units: usize,
    pub(crate) learning_rate: f64,
    pub(crate) epochs: usize,
    pub(crate) l2: f64,
    pub(crate) seed: u64,
}

impl NeuralConfig {
    /// Create a config with the given layer width, step size, and epoch
    /// count; `l2` and `seed` take their defaults.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::InvalidParamValue`] | `hidden_units` or `epochs` is 0 |
    /// | [`ModelError::InvalidParamValue`] | `learning_rate` is not positive and finite |
    pub fn new(hidden_units: usize, learning_rate: f64, epochs: usize) -> Result<Self, ModelError> {
        let config = Self {
            hidden_units,
            learning_rate,
            epochs,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the L2 penalty on weights (biases are not penalized).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] if `l2` is negative or non-finite.
    pub fn with_l2(mut self, l2: f64) -> Result<Self, ModelError> {
        self.l2 = l2;
        self.validate()?;
        Ok(self)
    }

    /// Set the random seed for weight initialization.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the hidden layer width.
    #[must_use]
    pub fn hidden_units(&self) -> usize {
        self.hidden_units
    }

    /// Return the learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Return the number of epochs.
    #[must_use]
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Return the L2 penalty.
    #[must_use]
    pub fn l2(&self) -> f64 {
        self.l2
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.hidden_units == 0 {
            return Err(ParamValue::from(0usize).invalid("hidden_units", "must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ParamValue::from(self.learning_rate)
                .invalid("learning_rate", "must be positive and finite"));
        }
        if self.epochs == 0 {
            return Err(ParamValue::from(0usize).invalid("epochs", "must be at least 1"));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(ParamValue::from(self.l2).invalid("l2", "must be non-negative and finite"));
        }
        Ok(())
    }

    fn set(&mut self, estimator: &'static str, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        let mut next = self.clone();
        match name {
            "hidden_units" => next.hidden_units = value.as_usize(name)?,
            "learning_rate" => next.learning_rate = value.as_f64(name)?,
            "epochs" => next.epochs = value.as_usize(name)?,
            "l2" => next.l2 = value.as_f64(name)?,
            "seed" => next.seed = value.as_u64(name)?,
            other => {
                return Err(ModelError::UnknownParam {
                    estimator,
                    name: other.to_string(),
                });
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn params(&self) -> ParamSet {
        [
            ("hidden_units", ParamValue::from(self.hidden_units)),
            ("learning_rate", ParamValue::from(self.learning_rate)),
            ("epochs", ParamValue::from(self.epochs)),
            ("l2", ParamValue::from(self.l2)),
            ("seed", ParamValue::from(self.seed)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            learning_rate: 0.1,
            epochs: 500,
            l2: 1e-4,
            seed: 42,
        }
    }
}

/// Per-column affine map to zero mean and unit variance.
///
/// Constant columns keep a scale of 1.0 so they map to zero.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    pub(crate) fn fit(features: &[Vec<f64>]) -> Self {
        let n_features = features.first().map_or(0, Vec::len);
        let n = features.len().max(1) as f64;
        let mut mean = vec![0.0; n_features];
        for row in features {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }
        let mut scale = vec![0.0; n_features];
        for row in features {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scale {
            let std = (*s / n).sqrt();
            *s = if std > 1e-12 { std } else { 1.0 };
        }
        Self { mean, scale }
    }

    pub(crate) fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

/// How the output layer turns pre-activations into predictions.
enum Output<'a> {
    /// Softmax over classes, trained on cross-entropy.
    Softmax(&'a [usize]),
    /// Identity, trained on half squared error.
    Identity(&'a [f64]),
}

/// Weights of a fitted network. Matrices are row-major by output unit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Network {
    scaler: Standardizer,
    n_inputs: usize,
    n_hidden: usize,
    n_outputs: usize,
    w1: Vec<f64>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: Vec<f64>,
}

impl Network {
    /// Glorot-uniform weights and zero biases.
    fn init(scaler: Standardizer, n_inputs: usize, n_hidden: usize, n_outputs: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut uniform = |n_in: usize, n_out: usize| -> Vec<f64> {
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();
            (0..n_in * n_out)
                .map(|_| rng.gen_range(-limit..limit))
                .collect()
        };
        let w1 = uniform(n_inputs, n_hidden);
        let w2 = uniform(n_hidden, n_outputs);
        Self {
            scaler,
            n_inputs,
            n_hidden,
            n_outputs,
            w1,
            b1: vec![0.0; n_hidden],
            w2,
            b2: vec![0.0; n_outputs],
        }
    }

    /// Hidden activations and output pre-activations for one standardized row.
    fn forward(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hidden: Vec<f64> = (0..self.n_hidden)
            .map(|h| {
                let w = &self.w1[h * self.n_inputs..(h + 1) * self.n_inputs];
                let z: f64 = w.iter().zip(x).map(|(a, b)| a * b).sum::<f64>() + self.b1[h];
                z.tanh()
            })
            .collect();
        let out: Vec<f64> = (0..self.n_outputs)
            .map(|o| {
                let w = &self.w2[o * self.n_hidden..(o + 1) * self.n_hidden];
                w.iter().zip(&hidden).map(|(a, b)| a * b).sum::<f64>() + self.b2[o]
            })
            .collect();
        (hidden, out)
    }

    /// Raw output-layer values for each row.
    fn outputs(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        validate_rows(features, self.n_inputs)?;
        Ok(features
            .iter()
            .map(|row| self.forward(&self.scaler.transform(row)).1)
            .collect())
    }

    /// Full-batch gradient descent on `inputs` (already standardized).
    fn train(&mut self, config: &NeuralConfig, inputs: &[Vec<f64>], output: &Output<'_>) -> f64 {
        let n = inputs.len() as f64;
        let mut loss = f64::INFINITY;
        for epoch in 0..config.epochs {
            let mut g_w1 = vec![0.0; self.w1.len()];
            let mut g_b1 = vec![0.0; self.b1.len()];
            let mut g_w2 = vec![0.0; self.w2.len()];
            let mut g_b2 = vec![0.0; self.b2.len()];
            let mut total = 0.0;

            for (i, x) in inputs.iter().enumerate() {
                let (hidden, mut delta) = self.forward(x);
                match output {
                    Output::Softmax(labels) => {
                        softmax_in_place(&mut delta);
                        total -= delta[labels[i]].max(1e-15).ln();
                        delta[labels[i]] -= 1.0;
                    }
                    Output::Identity(targets) => {
                        delta[0] -= targets[i];
                        total += 0.5 * delta[0] * delta[0];
                    }
                }

                for o in 0..self.n_outputs {
                    g_b2[o] += delta[o];
                    let row = &mut g_w2[o * self.n_hidden..(o + 1) * self.n_hidden];
                    for (g, a) in row.iter_mut().zip(&hidden) {
                        *g += delta[o] * a;
                    }
                }
                for h in 0..self.n_hidden {
                    let back: f64 = (0..self.n_outputs)
                        .map(|o| self.w2[o * self.n_hidden + h] * delta[o])
                        .sum();
                    let d = back * (1.0 - hidden[h] * hidden[h]);
                    g_b1[h] += d;
                    let row = &mut g_w1[h * self.n_inputs..(h + 1) * self.n_inputs];
                    for (g, xv) in row.iter_mut().zip(x) {
                        *g += d * xv;
                    }
                }
            }

            let lr = config.learning_rate;
            step(&mut self.w1, &g_w1, n, lr, config.l2);
            step(&mut self.b1, &g_b1, n, lr, 0.0);
            step(&mut self.w2, &g_w2, n, lr, config.l2);
            step(&mut self.b2, &g_b2, n, lr, 0.0);

            loss = total / n;
            if epoch % 100 == 0 {
                debug!(epoch, loss, "network epoch");
            }
        }
        loss
    }

    fn is_finite(&self) -> bool {
        [&self.w1, &self.b1, &self.w2, &self.b2]
            .iter()
            .all(|p| p.iter().all(|v| v.is_finite()))
    }
}

fn step(params: &mut [f64], grads: &[f64], n: f64, lr: f64, l2: f64) {
    for (p, g) in params.iter_mut().zip(grads) {
        *p -= lr * (g / n + l2 * *p);
    }
}

fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// Standardize, build, and train a network; fails if the weights diverge.
#[instrument(skip_all, fields(n_samples = features.len(), n_outputs = n_outputs))]
fn fit_network(
    config: &NeuralConfig,
    features: &[Vec<f64>],
    n_outputs: usize,
    output: &Output<'_>,
) -> Result<Network, ModelError> {
    config.validate()?;
    let n_inputs = features.first().map_or(0, Vec::len);
    let scaler = Standardizer::fit(features);
    let inputs: Vec<Vec<f64>> = features.iter().map(|row| scaler.transform(row)).collect();

    info!(
        n_inputs,
        hidden_units = config.hidden_units,
        n_outputs,
        epochs = config.epochs,
        "training neural network"
    );

    let mut network = Network::init(scaler, n_inputs, config.hidden_units, n_outputs, config.seed);
    let loss = network.train(config, &inputs, output);
    if !network.is_finite() || !loss.is_finite() {
        return Err(ParamValue::from(config.learning_rate)
            .invalid("learning_rate", "training diverged to non-finite weights"));
    }
    debug!(final_loss = loss, "neural network trained");
    Ok(network)
}

/// Neural classifier: tanh hidden layer, softmax output, cross-entropy loss.
///
/// Tunable parameters: `hidden_units`, `learning_rate`, `epochs`, `l2`, `seed`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NeuralClassifier {
    config: NeuralConfig,
    classes: ClassIndex,
    network: Option<Network>,
}

impl NeuralClassifier {
    /// Create an unfitted classifier.
    #[must_use]
    pub fn new(config: NeuralConfig) -> Self {
        Self {
            config,
            classes: ClassIndex::default(),
            network: None,
        }
    }

    /// Return the current configuration.
    #[must_use]
    pub fn config(&self) -> &NeuralConfig {
        &self.config
    }

    /// Sorted labels seen at fit time, one per output column.
    #[must_use]
    pub fn classes(&self) -> &[usize] {
        self.classes.labels()
    }

    fn fitted(&self) -> Result<&Network, ModelError> {
        self.network.as_ref().ok_or_else(|| ModelError::UntrainedModel {
            name: self.kind().to_string(),
        })
    }
}

impl Estimator for NeuralClassifier {
    type Target = usize;

    fn kind(&self) -> &'static str {
        "neural_classifier"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[usize]) -> Result<(), ModelError> {
        validate_training(features, targets)?;
        self.network = None;
        let (classes, encoded) = ClassIndex::fit(targets);
        let output = Output::Softmax(&encoded);
        let network = fit_network(&self.config, features, classes.len(), &output)?;
        self.classes = classes;
        self.network = Some(network);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, ModelError> {
        // Softmax is monotone, so the argmax of the raw outputs suffices.
        Ok(self
            .fitted()?
            .outputs(features)?
            .iter()
            .map(|out| {
                let mut best = 0;
                for (i, &v) in out.iter().enumerate().skip(1) {
                    if v > out[best] {
                        best = i;
                    }
                }
                self.classes.label(best)
            })
            .collect())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        let mut outputs = self.fitted()?.outputs(features)?;
        for out in &mut outputs {
            softmax_in_place(out);
        }
        Ok(outputs)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        let kind = self.kind();
        self.config.set(kind, name, value)
    }

    fn params(&self) -> ParamSet {
        self.config.params()
    }
}

/// Neural regressor: tanh hidden layer, identity output, squared-error loss.
///
/// Targets are standardized with training statistics and mapped back at
/// prediction time.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NeuralRegressor {
    config: NeuralConfig,
    network: Option<Network>,
    target_mean: f64,
    target_scale: f64,
}

impl NeuralRegressor {
    /// Create an unfitted regressor.
    #[must_use]
    pub fn new(config: NeuralConfig) -> Self {
        Self {
            config,
            network: None,
            target_mean: 0.0,
            target_scale: 1.0,
        }
    }

    /// Return the current configuration.
    #[must_use]
    pub fn config(&self) -> &NeuralConfig {
        &self.config
    }
}

impl Estimator for NeuralRegressor {
    type Target = f64;

    fn kind(&self) -> &'static str {
        "neural_regressor"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        validate_training(features, targets)?;
        self.network = None;

        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let std = (targets.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / n).sqrt();
        let scale = if std > 1e-12 { std } else { 1.0 };
        let scaled: Vec<f64> = targets.iter().map(|t| (t - mean) / scale).collect();

        self.network = Some(fit_network(
            &self.config,
            features,
            1,
            &Output::Identity(&scaled),
        )?);
        self.target_mean = mean;
        self.target_scale = scale;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let network = self.network.as_ref().ok_or_else(|| ModelError::UntrainedModel {
            name: self.kind().to_string(),
        })?;
        Ok(network
            .outputs(features)?
            .into_iter()
            .map(|out| out[0] * self.target_scale + self.target_mean)
            .collect())
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        let kind = self.kind();
        self.config.set(kind, name, value)
    }

    fn params(&self) -> ParamSet {
        self.config.params()
    }
}
