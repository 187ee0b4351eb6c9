//! Streaming statistics over weighted observations

use serde::Serialize;

/// A value with its weight in the population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub value: f64,
    pub weight: f64,
}

impl Observation {
    pub fn new(value: f64) -> Self {
        Self { value, weight: 1.0 }
    }

    pub fn weighted(value: f64, weight: f64) -> Self {
        Self { value, weight }
    }
}

/// Snapshot returned by [`RunningStats::summary`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// Incremental min/max/mean/stddev without keeping the samples
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: usize,
    total_weight: f64,
    weighted_sum: f64,
    weighted_sum_squared: f64,
    min_value: f64,
    max_value: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            total_weight: 0.0,
            weighted_sum: 0.0,
            weighted_sum_squared: 0.0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }

    /// Add a unit-weight value; NaN is ignored
    pub fn add_value(&mut self, value: f64) {
        self.add(Observation::new(value));
    }

    /// Add an observation; NaN values and non-positive weights are ignored
    pub fn add(&mut self, observation: Observation) {
        if observation.value.is_nan() || observation.weight <= 0.0 {
            return;
        }
        self.count += 1;
        self.total_weight += observation.weight;
        self.weighted_sum += observation.weight * observation.value;
        self.weighted_sum_squared += observation.weight * observation.value * observation.value;
        self.min_value = self.min_value.min(observation.value);
        self.max_value = self.max_value.max(observation.value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn average(&self) -> f64 {
        if self.total_weight == 0.0 {
            f64::NAN
        } else {
            self.weighted_sum / self.total_weight
        }
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.total_weight == 0.0 {
            return f64::NAN;
        }
        let avg = self.average();
        // rounding can push the difference slightly below zero
        ((self.weighted_sum_squared / self.total_weight) - (avg * avg)).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            average: self.average(),
            min: if self.count > 0 { self.min_value } else { f64::NAN },
            max: if self.count > 0 { self.max_value } else { f64::NAN },
            std_dev: self.std_dev(),
            count: self.count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Observation> for RunningStats {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        let mut stats = RunningStats::new();
        for observation in iter {
            stats.add(observation);
        }
        stats
    }
}
