//! Position-budget auto-tuner.
//!
//! The threat-space search trades depth for throughput through its
//! `max_positions` budget. The tuner keeps two candidate budgets (the
//! current one and `TUNING_STEP` times more), alternates between them
//! while recording the resulting search speed, and moves the budget when
//! linear regression over the samples says one candidate is faster with
//! high confidence.

use tracing::debug;

/// Multiplicative step between the two candidate budgets.
const TUNING_STEP: u64 = 2;

/// Largest budget the tuner will ever choose.
const MAX_BUDGET: u64 = 6400;

/// Smallest budget the tuner will ever choose.
const MIN_BUDGET: u64 = 50;

/// Speed samples for one candidate budget, with a linear trend fit.
#[derive(Debug, Clone)]
pub struct Measurement {
    param_value: u64,
    samples: Vec<(f32, f32)>,
}

impl Measurement {
    pub fn new(param_value: u64) -> Measurement {
        Measurement { param_value, samples: Vec::with_capacity(10) }
    }

    pub fn param_value(&self) -> u64 {
        self.param_value
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Record one `(step, speed)` sample, keeping the last ten.
    pub fn update(&mut self, step: u64, speed: f32) {
        if self.samples.len() >= 10 {
            self.samples.remove(0);
        }
        self.samples.push((step as f32, speed));
    }

    /// Predicted `(mean, stddev)` of the speed at `step`, from a least
    /// squares line over the samples. Useless until five samples exist.
    pub fn predict(&self, step: u64) -> (f32, f32) {
        if self.samples.len() < 5 {
            return (0.0, 1.0e6);
        }
        let n = self.samples.len() as f32;
        let mean_x: f32 = self.samples.iter().map(|s| s.0).sum::<f32>() / n;
        let mean_y: f32 = self.samples.iter().map(|s| s.1).sum::<f32>() / n;
        let mut sxx = 0.0f32;
        let mut sxy = 0.0f32;
        for &(x, y) in &self.samples {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;

        let mut residual = 0.0f32;
        for &(x, y) in &self.samples {
            let fitted = intercept + slope * x;
            residual += (y - fitted) * (y - fitted);
        }
        let stddev = (residual / (n - 2.0)).max(0.0).sqrt();
        (intercept + slope * step as f32, stddev)
    }
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
fn gaussian_cdf(x: f32) -> f32 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let poly = t
        * (0.319381530 + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let density = (-0.5 * x * x).exp() / (2.0 * std::f32::consts::PI).sqrt();
    let upper = density * poly;
    if x >= 0.0 { 1.0 - upper } else { upper }
}

/// Slowly adjusts the position budget toward the faster setting.
pub struct BudgetTuner {
    lower: Measurement,
    upper: Measurement,
    step_counter: u64,
    current: u64,
}

impl BudgetTuner {
    pub fn new(initial_budget: u64) -> BudgetTuner {
        BudgetTuner {
            lower: Measurement::new(initial_budget),
            upper: Measurement::new(TUNING_STEP * initial_budget),
            step_counter: 0,
            current: initial_budget,
        }
    }

    /// The budget to use for the next search.
    pub fn budget(&self) -> u64 {
        self.current
    }

    /// Reset all samples, falling back to the lower candidate.
    pub fn reset(&mut self) {
        self.lower.clear();
        self.upper.clear();
        self.step_counter = 0;
        self.current = self.lower.param_value();
    }

    /// Record the speed achieved with the current budget and pick the
    /// budget for the next step.
    pub fn update(&mut self, speed: f32) {
        if self.current == self.lower.param_value() {
            self.lower.update(self.step_counter, speed);
            self.current = self.upper.param_value();
        } else {
            self.upper.update(self.step_counter, speed);
            self.current = self.lower.param_value();
        }
        self.step_counter += 1;

        let (lower_mean, lower_dev) = self.lower.predict(self.step_counter);
        let (upper_mean, upper_dev) = self.upper.predict(self.step_counter);
        let mean = lower_mean - upper_mean;
        let stddev = lower_dev.hypot(upper_dev).max(1.0e-6);

        let probability = 1.0 - gaussian_cdf(mean / stddev);
        if probability > 0.95 && self.lower.param_value() * TUNING_STEP <= MAX_BUDGET {
            // the larger budget is very likely faster
            let new_budget = self.lower.param_value() * TUNING_STEP;
            debug!(budget = new_budget, probability, "position budget increased");
            self.rebase(new_budget);
        } else if probability < 0.05 && self.lower.param_value() / TUNING_STEP >= MIN_BUDGET {
            let new_budget = self.lower.param_value() / TUNING_STEP;
            debug!(budget = new_budget, probability, "position budget decreased");
            self.rebase(new_budget);
        }
    }

    fn rebase(&mut self, budget: u64) {
        self.lower = Measurement::new(budget);
        self.upper = Measurement::new(TUNING_STEP * budget);
        self.current = budget;
    }
}
