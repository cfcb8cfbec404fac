//! Numeric services the drivers build on: sampling, nearest-centroid search
//! and the grouped reductions of Lloyd's step.
//!
//! The drivers only talk to the [`AggregationOracle`] trait. [`NdarrayOracle`]
//! is the in-process implementation over [`PointSource`] blocks.

use crate::config::{ReductionStrategy, RunConfig};
use crate::distance::{nearest_centroid, DistanceMetric};
use crate::error::KMeansError;
use crate::source::PointSource;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Nearest centroid of a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestCentroid {
    pub column_id: usize,
    pub distance: f64,
}

/// Partial aggregate of the points assigned to one centroid
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPartial {
    /// Coordinate-wise sum of the points
    pub sum: Array1<f64>,
    /// Number of points
    pub count: usize,
    /// Number of points whose assignment changed
    pub reassigned: usize,
    /// Sum of the distances of the points to the centroid
    pub objective: f64,
}

impl ClusterPartial {
    pub fn new(n_features: usize) -> Self {
        Self {
            sum: Array1::zeros(n_features),
            count: 0,
            reassigned: 0,
            objective: 0.0,
        }
    }

    #[inline]
    fn add(&mut self, point: &ArrayView1<f32>, distance: f64, reassigned: bool) {
        self.sum
            .iter_mut()
            .zip(point.iter())
            .for_each(|(s, x)| *s += *x as f64);
        self.count += 1;
        self.reassigned += reassigned as usize;
        self.objective += distance;
    }

    /// Merge another partial of the same group into this one
    pub fn merge(&mut self, other: &ClusterPartial) {
        self.sum += &other.sum;
        self.count += other.count;
        self.reassigned += other.reassigned;
        self.objective += other.objective;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the group. Undefined for an empty group.
    pub fn mean(&self) -> Result<Array1<f32>, KMeansError> {
        if self.count == 0 {
            return Err(KMeansError::EmptyGroup(
                "mean of zero points".to_string(),
            ));
        }
        let count = self.count as f64;
        Ok(self.sum.mapv(|s| (s / count) as f32))
    }
}

/// Result of one assign-and-reduce scan
#[derive(Debug, Clone)]
pub struct Assignment {
    /// One partial per centroid, indexed by column id. Starved centroids have `count == 0`.
    pub partials: Vec<ClusterPartial>,
    /// Nearest column id of every point, in scan order
    pub ids: Vec<usize>,
}

impl Assignment {
    pub fn n_points(&self) -> usize {
        self.ids.len()
    }

    pub fn total_objective(&self) -> f64 {
        self.partials.iter().map(|p| p.objective).sum()
    }

    pub fn total_reassigned(&self) -> usize {
        self.partials.iter().map(|p| p.reassigned).sum()
    }
}

/// Per-point weight used by [`AggregationOracle::weighted_sample`]
pub type WeightFn<'w> = dyn Fn(&ArrayView1<f32>) -> f64 + Sync + 'w;

/// Numeric primitives consumed by the seeding and refinement drivers.
pub trait AggregationOracle: Sync {
    /// Draw `count` distinct points with probability proportional to `weight_of`.
    ///
    /// Non-finite and negative weights count as zero. Zero-weight points are
    /// only drawn once every positive-weight point has been drawn, in uniform
    /// order, so all-zero weights degrade to uniform sampling.
    fn weighted_sample(
        &self,
        source: &dyn PointSource,
        weight_of: &WeightFn<'_>,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError>;

    /// One scan accepting each point independently with probability `p`.
    /// Accepted points are shuffled and at most `limit` of them are kept.
    fn bernoulli_sample(
        &self,
        source: &dyn PointSource,
        p: f64,
        limit: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError>;

    /// Nearest centroid of `point`, `None` when there are no centroids
    fn closest_centroid(
        &self,
        centroids: &ArrayView2<f32>,
        point: &ArrayView1<f32>,
        metric: DistanceMetric,
    ) -> Option<ClosestCentroid>;

    /// Coordinate-wise mean of the points.
    ///
    /// Lloyd's refinement does not go through this: `assign_and_reduce`
    /// already folds every group into a `ClusterPartial`, whose `mean` gives
    /// the same result without a second scan.
    fn mean_aggregate(
        &self,
        points: &mut dyn Iterator<Item = ArrayView1<'_, f32>>,
    ) -> Result<Array1<f32>, KMeansError>;

    /// Stack vectors of equal length into a matrix, one row each
    fn matrix_aggregate(&self, vectors: &[Array1<f32>]) -> Result<Array2<f32>, KMeansError>;

    /// Assign every point to its nearest centroid and reduce per centroid.
    ///
    /// With `previous_ids`, a point counts as reassigned when its id differs
    /// from the previous one; without, every point counts as reassigned.
    fn assign_and_reduce(
        &self,
        source: &dyn PointSource,
        centroids: &ArrayView2<f32>,
        previous_ids: Option<&[usize]>,
        metric: DistanceMetric,
    ) -> Result<Assignment, KMeansError>;
}

/// In-process oracle over ndarray blocks
#[derive(Debug, Clone)]
pub struct NdarrayOracle {
    strategy: ReductionStrategy,
    block_size: usize,
}

impl Default for NdarrayOracle {
    fn default() -> Self {
        Self::new(&RunConfig::default())
    }
}

impl NdarrayOracle {
    /// Build an oracle, resolving the reduction strategy once
    pub fn new(config: &RunConfig) -> Self {
        Self {
            strategy: config.reduction.resolve(),
            block_size: config.block_size,
        }
    }

    pub fn strategy(&self) -> ReductionStrategy {
        self.strategy
    }

    /// Run `f` over every block with its starting offset, keeping block order
    fn map_blocks<'s, T, F>(&self, source: &'s dyn PointSource, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, ArrayView2<'s, f32>) -> T + Sync + Send,
    {
        let mut offset = 0;
        let blocks: Vec<(usize, ArrayView2<'s, f32>)> = source
            .blocks(self.block_size)
            .into_iter()
            .map(|block| {
                let start = offset;
                offset += block.nrows();
                (start, block)
            })
            .collect();

        match self.strategy {
            ReductionStrategy::Parallel => blocks
                .into_par_iter()
                .map(|(start, block)| f(start, block))
                .collect(),
            _ => blocks
                .into_iter()
                .map(|(start, block)| f(start, block))
                .collect(),
        }
    }
}

fn stack_rows(rows: &[Array1<f32>], n_features: usize) -> Array2<f32> {
    let mut matrix = Array2::zeros((rows.len(), n_features));
    for (mut dst, src) in matrix.outer_iter_mut().zip(rows) {
        dst.assign(src);
    }
    matrix
}

/// Copy the rows at `indices` out of the source, in the order given
fn gather_rows(source: &dyn PointSource, indices: &[usize]) -> Array2<f32> {
    let position: HashMap<usize, usize> = indices
        .iter()
        .enumerate()
        .map(|(pos, &idx)| (idx, pos))
        .collect();

    let mut matrix = Array2::zeros((indices.len(), source.n_features()));
    for (idx, row) in source.scan().enumerate() {
        if let Some(&pos) = position.get(&idx) {
            matrix.row_mut(pos).assign(&row);
        }
    }
    matrix
}

impl AggregationOracle for NdarrayOracle {
    fn weighted_sample(
        &self,
        source: &dyn PointSource,
        weight_of: &WeightFn<'_>,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        let n = source.count();
        if count > n {
            return Err(KMeansError::InsufficientData(format!(
                "Cannot draw {} points from {}",
                count, n
            )));
        }
        if count == 0 {
            return Ok(Array2::zeros((0, source.n_features())));
        }

        let weights: Vec<f64> = self
            .map_blocks(source, |_, block| {
                block
                    .outer_iter()
                    .map(|row| {
                        let w = weight_of(&row);
                        if w.is_finite() && w > 0.0 {
                            w
                        } else {
                            0.0
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .into_iter()
            .flatten()
            .collect();

        // Efraimidis-Spirakis: the `count` largest keys ln(u) / w form the sample.
        // Zero weights rank below every positive weight, uniformly among themselves.
        let mut keys: Vec<(bool, f64, usize)> = weights
            .iter()
            .enumerate()
            .map(|(idx, &w)| {
                let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
                if w > 0.0 {
                    (true, u.ln() / w, idx)
                } else {
                    (false, u.ln(), idx)
                }
            })
            .collect();

        let by_key_desc = |a: &(bool, f64, usize), b: &(bool, f64, usize)| {
            b.0.cmp(&a.0)
                .then(b.1.total_cmp(&a.1))
                .then(a.2.cmp(&b.2))
        };
        if count < keys.len() {
            keys.select_nth_unstable_by(count - 1, by_key_desc);
            keys.truncate(count);
        }
        keys.sort_unstable_by(by_key_desc);

        let indices: Vec<usize> = keys.iter().map(|&(_, _, idx)| idx).collect();
        Ok(gather_rows(source, &indices))
    }

    fn bernoulli_sample(
        &self,
        source: &dyn PointSource,
        p: f64,
        limit: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f32>, KMeansError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(KMeansError::InvalidArgument(format!(
                "Acceptance probability must be in [0, 1], got {}",
                p
            )));
        }

        let mut accepted: Vec<Array1<f32>> = source
            .scan()
            .filter(|_| rng.gen_bool(p))
            .map(|row| row.to_owned())
            .collect();
        let n_accepted = accepted.len();

        accepted.shuffle(rng);
        accepted.truncate(limit);

        debug!(p, accepted = n_accepted, kept = accepted.len(), "bernoulli sample");
        Ok(stack_rows(&accepted, source.n_features()))
    }

    fn closest_centroid(
        &self,
        centroids: &ArrayView2<f32>,
        point: &ArrayView1<f32>,
        metric: DistanceMetric,
    ) -> Option<ClosestCentroid> {
        nearest_centroid(metric, centroids, point).map(|(column_id, distance)| ClosestCentroid {
            column_id,
            distance,
        })
    }

    fn mean_aggregate(
        &self,
        points: &mut dyn Iterator<Item = ArrayView1<'_, f32>>,
    ) -> Result<Array1<f32>, KMeansError> {
        let first = points
            .next()
            .ok_or_else(|| KMeansError::EmptyGroup("mean of zero points".to_string()))?;

        let mut partial = ClusterPartial::new(first.len());
        partial.add(&first, 0.0, false);
        for point in points {
            if point.len() != first.len() {
                return Err(KMeansError::InvalidDimensions(format!(
                    "Expected {} features, got {}",
                    first.len(),
                    point.len()
                )));
            }
            partial.add(&point, 0.0, false);
        }
        partial.mean()
    }

    fn matrix_aggregate(&self, vectors: &[Array1<f32>]) -> Result<Array2<f32>, KMeansError> {
        let n_features = vectors
            .first()
            .ok_or_else(|| KMeansError::EmptyGroup("matrix of zero vectors".to_string()))?
            .len();

        if let Some(bad) = vectors.iter().find(|v| v.len() != n_features) {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                n_features,
                bad.len()
            )));
        }
        Ok(stack_rows(vectors, n_features))
    }

    fn assign_and_reduce(
        &self,
        source: &dyn PointSource,
        centroids: &ArrayView2<f32>,
        previous_ids: Option<&[usize]>,
        metric: DistanceMetric,
    ) -> Result<Assignment, KMeansError> {
        let k = centroids.nrows();
        let n_features = source.n_features();

        if k == 0 {
            return Err(KMeansError::EmptyGroup(
                "cannot assign points to zero centroids".to_string(),
            ));
        }
        if centroids.ncols() != n_features {
            return Err(KMeansError::InvalidDimensions(format!(
                "Centroids have {} features, points have {}",
                centroids.ncols(),
                n_features
            )));
        }
        if let Some(prev) = previous_ids {
            if prev.len() != source.count() {
                return Err(KMeansError::InvalidDimensions(format!(
                    "Expected {} previous assignments, got {}",
                    source.count(),
                    prev.len()
                )));
            }
        }

        let per_block = self.map_blocks(source, |start, block| {
            let mut partials = vec![ClusterPartial::new(n_features); k];
            let mut ids = Vec::with_capacity(block.nrows());

            for (i, row) in block.outer_iter().enumerate() {
                let (id, dist) = nearest_centroid(metric, centroids, &row).ok_or_else(|| {
                    KMeansError::InvalidArgument(format!(
                        "No finite distance for point {}",
                        start + i
                    ))
                })?;
                let reassigned = previous_ids.map_or(true, |prev| prev[start + i] != id);
                partials[id].add(&row, dist, reassigned);
                ids.push(id);
            }

            Ok::<_, KMeansError>((partials, ids))
        });

        // merged in block order so the result does not depend on scheduling
        let mut partials = vec![ClusterPartial::new(n_features); k];
        let mut ids = Vec::with_capacity(source.count());
        for block_result in per_block {
            let (block_partials, block_ids) = block_result?;
            for (acc, part) in partials.iter_mut().zip(&block_partials) {
                acc.merge(part);
            }
            ids.extend(block_ids);
        }

        Ok(Assignment { partials, ids })
    }
}
