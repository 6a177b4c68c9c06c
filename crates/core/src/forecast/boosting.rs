use super::DemandModel;
use crate::domain::ModelKind;
use crate::error::ForecastError;
use crate::features::{FeatureRecord, TrainingExample, FEATURE_COUNT};

/// Splits must improve the squared error by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_leaf: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

/// Gradient-boosted regression trees (squared loss) predicting rooms sold from a feature record.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedModel {
    base: f64,
    learning_rate: f64,
    trees: Vec<Node>,
}

impl GradientBoostedModel {
    /// Trains on `examples`. Non-finite inputs, feature columns with no variance or a diverging
    /// fit are reported as [`ForecastError::ModelTraining`].
    pub fn fit(
        examples: &[TrainingExample],
        params: &BoostingParams,
    ) -> Result<Self, ForecastError> {
        if examples.is_empty() {
            return Err(ForecastError::ModelTraining("no training examples".into()));
        }
        if params.n_estimators == 0
            || params.max_depth == 0
            || !(params.learning_rate.is_finite() && params.learning_rate > 0.0)
        {
            return Err(ForecastError::ModelTraining(format!(
                "invalid boosting parameters: {params:?}"
            )));
        }

        let rows: Vec<[f64; FEATURE_COUNT]> =
            examples.iter().map(|e| e.features.to_vector()).collect();
        let targets: Vec<f64> = examples.iter().map(|e| e.occupancy).collect();

        if rows.iter().flatten().chain(&targets).any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelTraining(
                "non-finite value in training data".into(),
            ));
        }
        if !(0..FEATURE_COUNT).any(|f| column_varies(&rows, f)) {
            return Err(ForecastError::ModelTraining(
                "training features have no variance".into(),
            ));
        }

        let base = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let indices: Vec<usize> = (0..rows.len()).collect();
        let min_leaf = params.min_samples_leaf.max(1);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let tree = grow(&rows, &residuals, &indices, 0, params.max_depth, min_leaf);
            for (p, row) in predictions.iter_mut().zip(&rows) {
                *p += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::ModelTraining("training diverged".into()));
        }

        tracing::debug!(
            examples = rows.len(),
            trees = trees.len(),
            "trained gradient-boosted demand model"
        );

        Ok(Self {
            base,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl DemandModel for GradientBoostedModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Primary
    }

    fn predict(&self, record: &FeatureRecord) -> f64 {
        let x = record.to_vector();
        self.base
            + self.learning_rate * self.trees.iter().map(|t| t.predict(&x)).sum::<f64>()
    }
}

fn column_varies(rows: &[[f64; FEATURE_COUNT]], feature: usize) -> bool {
    rows.first()
        .map(|first| rows.iter().any(|r| r[feature] != first[feature]))
        .unwrap_or(false)
}

fn grow(
    rows: &[[f64; FEATURE_COUNT]],
    residuals: &[f64],
    indices: &[usize],
    depth: usize,
    max_depth: usize,
    min_leaf: usize,
) -> Node {
    let leaf_value = indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64;
    if depth >= max_depth || indices.len() < 2 * min_leaf {
        return Node::Leaf(leaf_value);
    }

    let Some((feature, threshold)) = best_split(rows, residuals, indices, min_leaf) else {
        return Node::Leaf(leaf_value);
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| rows[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, residuals, &left, depth + 1, max_depth, min_leaf)),
        right: Box::new(grow(rows, residuals, &right, depth + 1, max_depth, min_leaf)),
    }
}

/// Exhaustive search for the split maximising squared-error reduction.
fn best_split(
    rows: &[[f64; FEATURE_COUNT]],
    residuals: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<(usize, f64)> = None;
    let mut best_gain = MIN_SPLIT_GAIN;
    let mut sorted = indices.to_vec();

    for feature in 0..FEATURE_COUNT {
        sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += residuals[sorted[k]];
            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let here = rows[sorted[k]][feature];
            let next = rows[sorted[k + 1]][feature];
            if here == next {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64
                - parent_score;
            if gain > best_gain {
                best_gain = gain;
                best = Some((feature, (here + next) / 2.0));
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn record(stay_date: NaiveDate, level: f64) -> FeatureRecord {
        FeatureRecord {
            stay_date,
            room_type: "Standard".to_string(),
            day_of_week: 0,
            is_weekend: false,
            trailing_occupancy_mean: level,
            weighted_occupancy: level,
            last_occupancy: level,
            dow_occupancy_mean: level,
            dow_observation_count: 4,
            trailing_adr_mean: 120.0,
            capacity: Some(80),
            competitor_mean: None,
            competitor_spread: None,
            observation_count: 60,
        }
    }

    fn linear_examples() -> Vec<TrainingExample> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        (0..60)
            .map(|i| {
                let level = i as f64;
                TrainingExample {
                    features: record(start + Duration::days(i), level),
                    occupancy: level,
                }
            })
            .collect()
    }

    #[test]
    fn fits_and_is_monotone_in_trailing_occupancy() {
        let model = GradientBoostedModel::fit(&linear_examples(), &BoostingParams::default())
            .expect("training should succeed");
        assert_eq!(model.kind(), ModelKind::Primary);
        assert_eq!(model.tree_count(), 300);

        let d = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let low = model.predict(&record(d, 5.0));
        let mid = model.predict(&record(d, 30.0));
        let high = model.predict(&record(d, 55.0));
        assert!(low < mid && mid < high, "low={low} mid={mid} high={high}");
        assert!((high - 55.0).abs() < 5.0, "high={high}");
    }

    #[test]
    fn rejects_features_without_variance() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let examples: Vec<_> = (0..40)
            .map(|i| TrainingExample {
                features: record(start, 10.0),
                occupancy: (i % 5) as f64,
            })
            .collect();
        let err = GradientBoostedModel::fit(&examples, &BoostingParams::default()).unwrap_err();
        assert!(matches!(err, ForecastError::ModelTraining(_)));
    }

    #[test]
    fn rejects_non_finite_targets() {
        let mut examples = linear_examples();
        examples[3].occupancy = f64::NAN;
        let err = GradientBoostedModel::fit(&examples, &BoostingParams::default()).unwrap_err();
        assert_eq!(
            err,
            ForecastError::ModelTraining("non-finite value in training data".into())
        );
    }

    #[test]
    fn rejects_empty_training_set() {
        assert!(GradientBoostedModel::fit(&[], &BoostingParams::default()).is_err());
    }
}
