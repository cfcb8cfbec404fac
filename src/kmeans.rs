use crate::config::{KMeansConfig, Seeding};
use crate::distance::predict_labels;
use crate::error::KMeansError;
use crate::lloyd::run_lloyd;
use crate::oracle::NdarrayOracle;
use crate::seeding::{run_kmeanspp_seeding, run_random_seeding};
use ndarray::{Array1, Array2, ArrayView2};

/// Centroids per chunk when predicting with a Euclidean metric
const PREDICT_CHUNK_CENTROIDS: usize = 1_024;

/// Outcome of a refinement run
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Final centroids, one per row
    pub centroids: Array2<f32>,

    /// Sum of the distances of all points to their assigned centroid.
    /// Infinite if the run ended on a reseeding iteration.
    pub objective_fn: f64,

    /// Fraction of points reassigned by the last iteration
    pub frac_reassigned: f64,

    /// Final iteration index of the refinement run
    pub num_iterations: usize,
}

/// k-means clustering over in-memory points.
///
/// Seeds with random seeding or k-means++ and refines with Lloyd's
/// algorithm. Each step is an iteration run over its own snapshot store;
/// the facade keeps only the resulting centroids.
///
/// # Example
///
/// ```
/// use iterkmeans_rs::{KMeans, KMeansConfig};
/// use ndarray::Array2;
/// use ndarray_rand::RandomExt;
/// use ndarray_rand::rand_distr::Uniform;
///
/// let data = Array2::random((1000, 16), Uniform::new(-1.0f32, 1.0));
///
/// let mut kmeans = KMeans::with_config(KMeansConfig::new(8).with_seed(7));
/// let result = kmeans.fit(&data.view()).unwrap();
/// assert_eq!(result.centroids.nrows(), 8);
///
/// let labels = kmeans.predict(&data.view()).unwrap();
/// assert_eq!(labels.len(), 1000);
/// ```
pub struct KMeans {
    /// Model configuration
    config: KMeansConfig,

    /// Number of features, 0 until fitted
    d: usize,

    /// Result of the last fit
    result: Option<KMeansResult>,
}

impl KMeans {
    /// Create a model with the default configuration for `k` clusters
    pub fn new(k: usize) -> Self {
        Self::with_config(KMeansConfig::new(k))
    }

    /// Create a model with a custom configuration
    pub fn with_config(config: KMeansConfig) -> Self {
        Self {
            config,
            d: 0,
            result: None,
        }
    }

    fn oracle(&self) -> NdarrayOracle {
        NdarrayOracle::new(&self.config.run_config())
    }

    /// Draw `k` centroids with random seeding.
    ///
    /// Does not change the fitted state of the model.
    pub fn seed_random(&self, data: &ArrayView2<f32>) -> Result<Array2<f32>, KMeansError> {
        let (centroids, _) = run_random_seeding(
            &self.config.args(None),
            data,
            &self.oracle(),
            &self.config.run_config(),
        )?;
        Ok(centroids)
    }

    /// Draw `k` centroids with k-means++.
    ///
    /// Does not change the fitted state of the model.
    pub fn seed_plus_plus(&self, data: &ArrayView2<f32>) -> Result<Array2<f32>, KMeansError> {
        let (centroids, _) = run_kmeanspp_seeding(
            &self.config.args(None),
            data,
            &self.oracle(),
            &self.config.run_config(),
        )?;
        Ok(centroids)
    }

    /// Seed with the configured method, then refine.
    pub fn fit(&mut self, data: &ArrayView2<f32>) -> Result<&KMeansResult, KMeansError> {
        let seeds = match self.config.seeding {
            Seeding::Random => self.seed_random(data)?,
            Seeding::PlusPlus => self.seed_plus_plus(data)?,
        };
        self.fit_from(data, seeds)
    }

    /// Refine starting from the given centroids.
    ///
    /// Fewer than `k` rows are topped up with k-means++ before the first
    /// Lloyd's iteration.
    pub fn fit_from(
        &mut self,
        data: &ArrayView2<f32>,
        initial_centroids: Array2<f32>,
    ) -> Result<&KMeansResult, KMeansError> {
        let config = self.config.run_config();
        let args = self.config.args(Some(initial_centroids));

        let (state, history) = run_lloyd(&args, data, &self.oracle(), &config)?;
        let result = KMeansResult {
            centroids: state.centroids,
            objective_fn: state.objective_fn,
            frac_reassigned: state.frac_reassigned,
            num_iterations: history.final_iteration().unwrap_or(0),
        };

        self.d = data.ncols();
        Ok(&*self.result.insert(result))
    }

    /// Predict cluster assignments for new data.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model has not been fitted yet
    /// - Data dimensions don't match the training data
    pub fn predict(&self, data: &ArrayView2<f32>) -> Result<Array1<i64>, KMeansError> {
        let centroids = self.centroids().ok_or(KMeansError::NotFitted)?;

        let n_features = data.ncols();
        if n_features != self.d {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                self.d, n_features
            )));
        }

        Ok(predict_labels(
            data,
            &centroids.view(),
            self.config.distance,
            self.config.block_size,
            PREDICT_CHUNK_CENTROIDS,
        ))
    }

    /// Fit the model and predict cluster assignments in one call
    pub fn fit_predict(&mut self, data: &ArrayView2<f32>) -> Result<Array1<i64>, KMeansError> {
        self.fit(data)?;
        self.predict(data)
    }

    /// Centroids of the fitted model, `None` before the first fit
    pub fn centroids(&self) -> Option<&Array2<f32>> {
        self.result.as_ref().map(|r| &r.centroids)
    }

    pub fn result(&self) -> Option<&KMeansResult> {
        self.result.as_ref()
    }

    pub fn k(&self) -> usize {
        self.config.k
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_kmeans_new() {
        let kmeans = KMeans::new(10);
        assert_eq!(kmeans.k(), 10);
        assert_eq!(kmeans.d(), 0);
        assert!(kmeans.centroids().is_none());
    }

    #[test]
    fn test_kmeans_fit() {
        let data = Array2::random((500, 32), Uniform::new(-1.0f32, 1.0));
        let mut kmeans = KMeans::new(5);

        let result = kmeans.fit(&data.view()).unwrap();
        assert_eq!(result.centroids.dim(), (5, 32));
        assert!(result.num_iterations >= 1);
        assert_eq!(kmeans.d(), 32);
    }

    #[test]
    fn test_kmeans_fit_random_seeding() {
        let data = Array2::random((400, 4), Uniform::new(-1.0f32, 1.0));
        let mut kmeans =
            KMeans::with_config(KMeansConfig::new(6).with_seeding(Seeding::Random).with_seed(3));

        let result = kmeans.fit(&data.view()).unwrap();
        assert_eq!(result.centroids.nrows(), 6);
    }

    #[test]
    fn test_seeding_is_deterministic_per_seed() {
        let data = Array2::random((300, 3), Uniform::new(-1.0f32, 1.0));
        let kmeans = KMeans::with_config(KMeansConfig::new(4).with_seed(21));

        let a = kmeans.seed_plus_plus(&data.view()).unwrap();
        let b = kmeans.seed_plus_plus(&data.view()).unwrap();
        assert_eq!(a, b);

        let r = kmeans.seed_random(&data.view()).unwrap();
        assert_eq!(r.nrows(), 4);
        assert!(kmeans.centroids().is_none());
    }

    #[test]
    fn test_fit_from_converges_on_two_groups() {
        let data = array![[0.0f32, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
        let mut kmeans = KMeans::with_config(
            KMeansConfig::new(2)
                .with_distance(DistanceMetric::SquaredL2)
                .with_min_frac_reassigned(0.0),
        );

        let result = kmeans
            .fit_from(&data.view(), array![[0.0f32, 0.0], [10.0, 0.0]])
            .unwrap();
        assert_eq!(result.centroids, array![[0.0f32, 0.5], [10.0, 0.5]]);
        assert_eq!(result.frac_reassigned, 0.0);
        assert_eq!(result.objective_fn, 1.0);
        assert_eq!(result.num_iterations, 2);

        let labels = kmeans.predict(&data.view()).unwrap();
        assert_eq!(labels, array![0i64, 0, 1, 1]);
    }

    #[test]
    fn test_kmeans_predict_non_euclidean() {
        let data = array![[1.0f32, 0.1], [0.9, 0.0], [0.0, 1.0], [0.1, 0.9]];
        let mut kmeans = KMeans::with_config(
            KMeansConfig::new(2)
                .with_distance(DistanceMetric::Angle)
                .with_min_frac_reassigned(0.0),
        );
        kmeans
            .fit_from(&data.view(), array![[1.0f32, 0.0], [0.0, 1.0]])
            .unwrap();

        let labels = kmeans.predict(&array![[5.0f32, 0.5], [0.2, 3.0]].view()).unwrap();
        assert_eq!(labels, array![0i64, 1]);
    }

    #[test]
    fn test_kmeans_fit_predict() {
        let data = Array2::random((300, 8), Uniform::new(-1.0f32, 1.0));
        let mut kmeans = KMeans::new(4);

        let labels = kmeans.fit_predict(&data.view()).unwrap();
        assert_eq!(labels.len(), 300);
        assert!(labels.iter().all(|&l| (0..4).contains(&l)));
    }

    #[test]
    fn test_kmeans_predict_before_fit() {
        let data = Array2::random((100, 8), Uniform::new(-1.0f32, 1.0));
        let kmeans = KMeans::new(5);

        let result = kmeans.predict(&data.view());
        assert!(matches!(result, Err(KMeansError::NotFitted)));
    }

    #[test]
    fn test_kmeans_dimension_mismatch() {
        let train_data = Array2::random((100, 8), Uniform::new(-1.0f32, 1.0));
        let test_data = Array2::random((50, 16), Uniform::new(-1.0f32, 1.0));

        let mut kmeans = KMeans::new(5);
        kmeans.fit(&train_data.view()).unwrap();

        let result = kmeans.predict(&test_data.view());
        assert!(matches!(result, Err(KMeansError::InvalidDimensions(_))));
    }

    #[test]
    fn test_kmeans_k_zero() {
        let data = Array2::random((10, 2), Uniform::new(-1.0f32, 1.0));
        let mut kmeans = KMeans::new(0);

        let result = kmeans.fit(&data.view());
        assert!(matches!(result, Err(KMeansError::InvalidK(_))));
    }

    #[test]
    fn test_kmeans_too_few_points_for_random_seeding() {
        let data = Array2::random((3, 2), Uniform::new(-1.0f32, 1.0));
        let kmeans = KMeans::with_config(KMeansConfig::new(5).with_seeding(Seeding::Random));

        let result = kmeans.seed_random(&data.view());
        assert!(matches!(result, Err(KMeansError::InsufficientData(_))));
    }

    #[test]
    fn test_kmeans_too_few_points_for_plus_plus_fit() {
        let data = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let mut kmeans = KMeans::with_config(KMeansConfig::new(5).with_max_iters(6));

        let result = kmeans.fit(&data.view());
        assert!(matches!(result, Err(KMeansError::InsufficientData(_))));
        assert!(kmeans.centroids().is_none());

        let seeded = kmeans.seed_plus_plus(&data.view());
        assert!(matches!(seeded, Err(KMeansError::InsufficientData(_))));
    }
}
