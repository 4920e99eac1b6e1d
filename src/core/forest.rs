//! Bootstrap-aggregated ensemble of decision trees.
//!
//! Each tree is grown on a bootstrap resample of the training set with Gini
//! impurity splits. Predictions average the leaf probabilities of all trees.
//! The forest is plain data so that it can be written to and read back from
//! the model store with serde.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Hyper-parameters for fitting a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestSettings {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Maximum depth of a single tree
    pub max_depth: usize,
    /// Minimum number of samples a node needs before it may be split
    pub min_samples_split: usize,
}

impl Default for ForestSettings {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 2,
        }
    }
}

/// Errors raised while fitting.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    EmptyTrainingSet,
    LengthMismatch { features: usize, labels: usize },
    NonFiniteFeature { index: usize },
    NoTrees,
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::EmptyTrainingSet => write!(f, "Training set is empty"),
            FitError::LengthMismatch { features, labels } => {
                write!(f, "Got {features} feature rows but {labels} labels")
            }
            FitError::NonFiniteFeature { index } => {
                write!(f, "Feature at row {index} is not finite")
            }
            FitError::NoTrees => write!(f, "Forest must contain at least one tree"),
        }
    }
}

impl std::error::Error for FitError {}

/// Errors raised while predicting.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictError {
    /// The input row does not have the width the forest was trained on
    FeatureMismatch { expected: usize, got: usize },
    /// A split points at a node that does not exist
    MalformedTree { tree: usize },
    NoTrees,
}

impl std::fmt::Display for PredictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictError::FeatureMismatch { expected, got } => {
                write!(f, "Model expects {expected} features, got {got}")
            }
            PredictError::MalformedTree { tree } => write!(f, "Tree {tree} is malformed"),
            PredictError::NoTrees => write!(f, "Model has no trees"),
        }
    }
}

impl std::error::Error for PredictError {}

/// A node of a decision tree, stored in a flat arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Fraction of training samples at this leaf labeled abnormal
        abnormal: f64,
    },
    Split {
        feature: usize,
        /// Samples with `x[feature] <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single decision tree. The root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn probability(&self, row: &[f64], tree_index: usize) -> Result<f64, PredictError> {
        let malformed = PredictError::MalformedTree { tree: tree_index };
        let mut index = 0;

        // A well-formed tree reaches a leaf in at most `nodes.len()` steps.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index).ok_or_else(|| malformed.clone())? {
                Node::Leaf { abnormal } => return Ok(*abnormal),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row.get(*feature).ok_or_else(|| malformed.clone())?;
                    index = if *x <= *threshold { *left } else { *right };
                }
            }
        }

        Err(malformed)
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize, budget: usize) -> usize {
            match nodes.get(index) {
                Some(Node::Split { left, right, .. }) if budget > 0 => {
                    1 + walk(nodes, *left, budget - 1).max(walk(nodes, *right, budget - 1))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0, self.nodes.len())
    }
}

/// Bagged decision-tree classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    n_features: usize,
    trees: Vec<Tree>,
}

impl Forest {
    /// Fit a forest on single-feature rows.
    ///
    /// A training set holding only one class is valid and yields a forest
    /// that always answers that class.
    pub fn fit(
        features: &[f64],
        labels: &[bool],
        settings: &ForestSettings,
        seed: u64,
    ) -> Result<Self, FitError> {
        if features.len() != labels.len() {
            return Err(FitError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        if features.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        if settings.n_trees == 0 {
            return Err(FitError::NoTrees);
        }
        if let Some(index) = features.iter().position(|x| !x.is_finite()) {
            return Err(FitError::NonFiniteFeature { index });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let n = features.len();

        let trees = (0..settings.n_trees)
            .map(|_| {
                let mut sample: Vec<(f64, bool)> = (0..n)
                    .map(|_| {
                        let i = rng.gen_range(0..n);
                        (features[i], labels[i])
                    })
                    .collect();

                let mut builder = TreeBuilder {
                    nodes: Vec::new(),
                    settings,
                };
                builder.grow(&mut sample, 0);
                Tree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Ok(Self {
            n_features: 1,
            trees,
        })
    }

    /// Predict whether a row is abnormal.
    pub fn predict(&self, row: &[f64]) -> Result<bool, PredictError> {
        self.predict_proba(row).map(|p| p > 0.5)
    }

    /// Mean abnormal probability over all trees.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, PredictError> {
        if row.len() != self.n_features {
            return Err(PredictError::FeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        if self.trees.is_empty() {
            return Err(PredictError::NoTrees);
        }

        let total = self
            .trees
            .iter()
            .enumerate()
            .map(|(i, tree)| tree.probability(row, i))
            .sum::<Result<f64, _>>()?;

        Ok(total / self.trees.len() as f64)
    }

    /// Whether the forest carries fitted parameters.
    pub fn is_fitted(&self) -> bool {
        self.n_features > 0
            && !self.trees.is_empty()
            && self.trees.iter().all(|t| !t.nodes.is_empty())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}

struct TreeBuilder<'a> {
    nodes: Vec<Node>,
    settings: &'a ForestSettings,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `sample` and return its node index.
    fn grow(&mut self, sample: &mut [(f64, bool)], depth: usize) -> usize {
        let abnormal = sample.iter().filter(|(_, y)| *y).count();
        let fraction = abnormal as f64 / sample.len() as f64;
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { abnormal: fraction });

        let pure = abnormal == 0 || abnormal == sample.len();
        if pure
            || depth >= self.settings.max_depth
            || sample.len() < self.settings.min_samples_split.max(2)
        {
            return index;
        }

        sample.sort_by(|a, b| a.0.total_cmp(&b.0));
        let Some((split_at, threshold)) = best_split(sample) else {
            return index;
        };

        let (left_sample, right_sample) = sample.split_at_mut(split_at);
        let left = self.grow(left_sample, depth + 1);
        let right = self.grow(right_sample, depth + 1);

        self.nodes[index] = Node::Split {
            feature: 0,
            threshold,
            left,
            right,
        };
        index
    }
}

/// Find the split of a sorted sample with the lowest weighted Gini impurity.
///
/// Returns the number of samples going left and the threshold between them.
fn best_split(sorted: &[(f64, bool)]) -> Option<(usize, f64)> {
    let n = sorted.len();
    let total_abnormal = sorted.iter().filter(|(_, y)| *y).count();

    let mut best: Option<(f64, usize, f64)> = None;
    let mut left_abnormal = 0;

    for i in 1..n {
        if sorted[i - 1].1 {
            left_abnormal += 1;
        }
        let (prev, next) = (sorted[i - 1].0, sorted[i].0);
        if prev == next {
            continue;
        }

        let left_n = i;
        let right_n = n - i;
        let impurity = (left_n as f64 * gini(left_abnormal, left_n)
            + right_n as f64 * gini(total_abnormal - left_abnormal, right_n))
            / n as f64;

        if best.map_or(true, |(b, _, _)| impurity < b) {
            best = Some((impurity, i, prev + (next - prev) / 2.0));
        }
    }

    best.map(|(_, split_at, threshold)| (split_at, threshold))
}

fn gini(abnormal: usize, n: usize) -> f64 {
    let p = abnormal as f64 / n as f64;
    2.0 * p * (1.0 - p)
}
