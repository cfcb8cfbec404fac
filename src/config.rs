use crate::distance::DistanceMetric;
use crate::error::KMeansError;
use crate::store::HistoryMode;
use ndarray::Array2;

/// Arguments of a single algorithm run. Supplied once and never mutated.
#[derive(Debug, Clone)]
pub struct KMeansArgs {
    /// Target number of centroids
    pub k: usize,

    /// Centroids to start from. An empty matrix is treated like `None`.
    pub initial_centroids: Option<Array2<f32>>,

    /// Distance used for assignment and for the objective
    pub distance: DistanceMetric,

    /// Upper bound on the iteration index reached by Lloyd's refinement
    pub max_num_iterations: usize,

    /// Refinement stops once the fraction of reassigned points is at or below this value
    pub min_frac_reassigned: f64,
}

impl KMeansArgs {
    /// Create arguments for `k` centroids with defaults for everything else
    pub fn new(k: usize) -> Self {
        Self {
            k,
            initial_centroids: None,
            distance: DistanceMetric::SquaredL2,
            max_num_iterations: 20,
            min_frac_reassigned: 0.001,
        }
    }

    pub fn with_initial_centroids(mut self, centroids: Array2<f32>) -> Self {
        self.initial_centroids = Some(centroids);
        self
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_max_num_iterations(mut self, max_num_iterations: usize) -> Self {
        self.max_num_iterations = max_num_iterations;
        self
    }

    pub fn with_min_frac_reassigned(mut self, min_frac_reassigned: f64) -> Self {
        self.min_frac_reassigned = min_frac_reassigned;
        self
    }

    /// Check the arguments against a point source with `n_features` features
    pub fn validate(&self, n_features: usize) -> Result<(), KMeansError> {
        if self.k == 0 {
            return Err(KMeansError::InvalidK(
                "k must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_frac_reassigned) {
            return Err(KMeansError::InvalidArgument(format!(
                "min_frac_reassigned must be in [0, 1], got {}",
                self.min_frac_reassigned
            )));
        }

        if let Some(centroids) = &self.initial_centroids {
            if centroids.nrows() > self.k {
                return Err(KMeansError::InvalidArgument(format!(
                    "{} initial centroids given for k = {}",
                    centroids.nrows(),
                    self.k
                )));
            }
            if centroids.nrows() > 0 && centroids.ncols() != n_features {
                return Err(KMeansError::InvalidDimensions(format!(
                    "Initial centroids have {} features, points have {}",
                    centroids.ncols(),
                    n_features
                )));
            }
        }

        Ok(())
    }
}

/// How the per-iteration scan-and-reduce step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionStrategy {
    /// Parallel when the rayon pool has more than one thread
    #[default]
    Auto,
    Serial,
    Parallel,
}

impl ReductionStrategy {
    /// Resolve `Auto` against the current rayon pool. Never returns `Auto`.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if rayon::current_num_threads() > 1 => Self::Parallel,
            Self::Auto => Self::Serial,
            other => other,
        }
    }
}

/// Settings of the machinery around a run, as opposed to its arguments
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Random seed for every sampling step
    pub seed: u64,

    /// Keep every snapshot, or only the latest
    pub history: HistoryMode,

    /// Scan-and-reduce execution strategy
    pub reduction: ReductionStrategy,

    /// Number of points per block handed to one worker
    pub block_size: usize,

    /// Number of sampling rounds random seeding may use before giving up
    pub max_seeding_rounds: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            history: HistoryMode::Preserve,
            reduction: ReductionStrategy::Auto,
            block_size: 8_192,
            max_seeding_rounds: 64,
        }
    }
}

impl RunConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn with_reduction(mut self, reduction: ReductionStrategy) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_max_seeding_rounds(mut self, rounds: usize) -> Self {
        self.max_seeding_rounds = rounds;
        self
    }
}

/// Seeding method used by [`crate::KMeans::fit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seeding {
    Random,
    #[default]
    PlusPlus,
}

/// Configuration for the [`crate::KMeans`] facade
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum iteration index reached by Lloyd's refinement
    pub max_iters: usize,

    /// Convergence threshold on the fraction of reassigned points
    pub min_frac_reassigned: f64,

    /// Distance metric
    pub distance: DistanceMetric,

    /// Seeding used when no initial centroids are given
    pub seeding: Seeding,

    /// Random seed for seeding and reseeding
    pub seed: u64,

    /// Snapshot retention
    pub history: HistoryMode,

    /// Scan-and-reduce execution strategy
    pub reduction: ReductionStrategy,

    /// Points per parallel block
    pub block_size: usize,

    /// Round cap for random seeding
    pub max_seeding_rounds: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        let run = RunConfig::default();
        Self {
            k: 8,
            max_iters: 20,
            min_frac_reassigned: 0.001,
            distance: DistanceMetric::SquaredL2,
            seeding: Seeding::PlusPlus,
            seed: run.seed,
            history: HistoryMode::Truncate,
            reduction: run.reduction,
            block_size: run.block_size,
            max_seeding_rounds: run.max_seeding_rounds,
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the maximum number of iterations
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the convergence threshold
    pub fn with_min_frac_reassigned(mut self, min_frac_reassigned: f64) -> Self {
        self.min_frac_reassigned = min_frac_reassigned;
        self
    }

    /// Set the distance metric
    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }

    /// Set the seeding method
    pub fn with_seeding(mut self, seeding: Seeding) -> Self {
        self.seeding = seeding;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the snapshot retention mode
    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    /// Set the reduction strategy
    pub fn with_reduction(mut self, reduction: ReductionStrategy) -> Self {
        self.reduction = reduction;
        self
    }

    /// Set the number of points per block
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the round cap for random seeding
    pub fn with_max_seeding_rounds(mut self, rounds: usize) -> Self {
        self.max_seeding_rounds = rounds;
        self
    }

    /// Run arguments, optionally starting from the given centroids
    pub fn args(&self, initial_centroids: Option<Array2<f32>>) -> KMeansArgs {
        KMeansArgs {
            k: self.k,
            initial_centroids,
            distance: self.distance,
            max_num_iterations: self.max_iters,
            min_frac_reassigned: self.min_frac_reassigned,
        }
    }

    /// Run configuration shared by every run this config starts
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            seed: self.seed,
            history: self.history,
            reduction: self.reduction,
            block_size: self.block_size,
            max_seeding_rounds: self.max_seeding_rounds,
        }
    }
}
