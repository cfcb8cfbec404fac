use crate::error::KMeansError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Distance function used to assign points to centroids.
///
/// The mean of a group is used as its new centroid for every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Manhattan distance
    L1,
    /// Euclidean distance
    L2,
    /// Squared Euclidean distance
    #[default]
    SquaredL2,
    /// Angle between the vectors, in radians
    Angle,
    /// Tanimoto distance, `1 - a.b / (|a|^2 + |b|^2 - a.b)`
    Tanimoto,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length
    #[inline]
    pub fn distance(self, a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::L1 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (*x as f64 - *y as f64).abs())
                .sum(),
            Self::L2 => squared_l2(a, b).sqrt(),
            Self::SquaredL2 => squared_l2(a, b),
            Self::Angle => {
                let (dot, a_sq, b_sq) = dot_and_norms(a, b);
                if a_sq == 0.0 || b_sq == 0.0 {
                    // zero vectors only coincide with each other
                    return if a_sq == b_sq {
                        0.0
                    } else {
                        std::f64::consts::FRAC_PI_2
                    };
                }
                (dot / (a_sq.sqrt() * b_sq.sqrt())).clamp(-1.0, 1.0).acos()
            }
            Self::Tanimoto => {
                let (dot, a_sq, b_sq) = dot_and_norms(a, b);
                let denom = a_sq + b_sq - dot;
                if denom == 0.0 {
                    return 0.0;
                }
                1.0 - dot / denom
            }
        }
    }

    /// Square of a distance produced by this metric. `SquaredL2` distances are already squared.
    #[inline]
    pub fn squared(self, distance: f64) -> f64 {
        match self {
            Self::SquaredL2 => distance,
            _ => distance * distance,
        }
    }

    /// Whether the nearest centroid can be found with the `|x|^2 + |c|^2 - 2 x.c` expansion
    pub fn is_euclidean(self) -> bool {
        matches!(self, Self::L2 | Self::SquaredL2)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::SquaredL2 => "squared_l2",
            Self::Angle => "angle",
            Self::Tanimoto => "tanimoto",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = KMeansError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1" | "norm1" | "manhattan" => Ok(Self::L1),
            "l2" | "norm2" | "euclidean" => Ok(Self::L2),
            "squared_l2" | "squared_norm2" | "sqeuclidean" => Ok(Self::SquaredL2),
            "angle" | "cosine" => Ok(Self::Angle),
            "tanimoto" => Ok(Self::Tanimoto),
            other => Err(KMeansError::InvalidArgument(format!(
                "Unknown distance metric: {}",
                other
            ))),
        }
    }
}

#[inline]
fn squared_l2(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}

#[inline]
fn dot_and_norms(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> (f64, f64, f64) {
    a.iter()
        .zip(b.iter())
        .fold((0.0, 0.0, 0.0), |(dot, a_sq, b_sq), (x, y)| {
            let (x, y) = (*x as f64, *y as f64);
            (dot + x * y, a_sq + x * x, b_sq + y * y)
        })
}

/// Nearest centroid to `point` and its distance. `None` if there are no centroids.
///
/// Ties go to the lowest column id; NaN distances never win.
pub fn nearest_centroid(
    metric: DistanceMetric,
    centroids: &ArrayView2<f32>,
    point: &ArrayView1<f32>,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (j, centroid) in centroids.outer_iter().enumerate() {
        let dist = metric.distance(&centroid, point);
        if dist.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, best_dist)| dist < best_dist) {
            best = Some((j, dist));
        }
    }
    best
}

/// Compute squared L2 norms for each row of a 2D array
/// Returns a 1D array where each element is the squared norm of the corresponding row
#[inline]
pub fn compute_squared_norms(data: &ArrayView2<f32>) -> Array1<f32> {
    let norms: Vec<f32> = (0..data.nrows())
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            row.dot(&row)
        })
        .collect();

    Array1::from(norms)
}

/// Find the nearest centroid for each data point in a chunk using double-chunking
///
/// Uses the identity: ||x - c||^2 = ||x||^2 + ||c||^2 - 2*x.c
pub fn find_nearest_centroids_chunked(
    data_chunk: &ArrayView2<f32>,
    data_norms: &ArrayView1<f32>,
    centroids: &ArrayView2<f32>,
    centroid_norms: &ArrayView1<f32>,
    chunk_size_centroids: usize,
) -> Array1<i64> {
    let n_data = data_chunk.nrows();
    let k = centroids.nrows();
    let chunk_size_centroids = chunk_size_centroids.max(1);

    let mut best: Vec<(i64, f32)> = vec![(0, f32::INFINITY); n_data];

    let mut c_start = 0;
    while c_start < k {
        let c_end = (c_start + chunk_size_centroids).min(k);
        let centroid_chunk = centroids.slice(ndarray::s![c_start..c_end, ..]);
        let centroid_chunk_norms = centroid_norms.slice(ndarray::s![c_start..c_end]);

        // (n_data, chunk_centroids)
        let dot_products = data_chunk.dot(&centroid_chunk.t());

        best.par_iter_mut()
            .enumerate()
            .for_each(|(i, (label, best_dist))| {
                let x_norm = data_norms[i];

                for j in 0..(c_end - c_start) {
                    let dist = x_norm + centroid_chunk_norms[j] - 2.0 * dot_products[[i, j]];
                    if dist < *best_dist {
                        *best_dist = dist;
                        *label = (c_start + j) as i64;
                    }
                }
            });

        c_start = c_end;
    }

    best.into_iter().map(|(label, _)| label).collect()
}

/// Predict cluster assignments for data using trained centroids
pub fn predict_labels(
    data: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
    metric: DistanceMetric,
    chunk_size_data: usize,
    chunk_size_centroids: usize,
) -> Array1<i64> {
    let n_samples = data.nrows();

    if !metric.is_euclidean() {
        let labels: Vec<i64> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                nearest_centroid(metric, centroids, &data.row(i))
                    .map(|(j, _)| j as i64)
                    .unwrap_or(-1)
            })
            .collect();
        return Array1::from(labels);
    }

    let data_norms = compute_squared_norms(data);
    let centroid_norms = compute_squared_norms(centroids);
    let chunk_size_data = chunk_size_data.max(1);

    let mut labels = Array1::zeros(n_samples);

    let mut start_idx = 0;
    while start_idx < n_samples {
        let end_idx = (start_idx + chunk_size_data).min(n_samples);
        let data_chunk = data.slice(ndarray::s![start_idx..end_idx, ..]);
        let data_chunk_norms = data_norms.slice(ndarray::s![start_idx..end_idx]);

        let chunk_labels = find_nearest_centroids_chunked(
            &data_chunk,
            &data_chunk_norms,
            centroids,
            &centroid_norms.view(),
            chunk_size_centroids,
        );

        labels
            .slice_mut(ndarray::s![start_idx..end_idx])
            .assign(&chunk_labels);

        start_idx = end_idx;
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_compute_squared_norms() {
        let data = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let norms = compute_squared_norms(&data.view());

        assert_relative_eq!(norms[0], 1.0 + 4.0 + 9.0, epsilon = 1e-6);
        assert_relative_eq!(norms[1], 16.0 + 25.0 + 36.0, epsilon = 1e-6);
    }

    #[test]
    fn test_metrics() {
        let a = array![0.0f32, 0.0];
        let b = array![3.0f32, 4.0];

        assert_relative_eq!(DistanceMetric::L1.distance(&a.view(), &b.view()), 7.0);
        assert_relative_eq!(DistanceMetric::L2.distance(&a.view(), &b.view()), 5.0);
        assert_relative_eq!(
            DistanceMetric::SquaredL2.distance(&a.view(), &b.view()),
            25.0
        );
        assert_relative_eq!(DistanceMetric::L2.squared(5.0), 25.0);
        assert_relative_eq!(DistanceMetric::SquaredL2.squared(25.0), 25.0);
    }

    #[test]
    fn test_angle_and_tanimoto() {
        let x = array![1.0f32, 0.0];
        let y = array![0.0f32, 2.0];
        let zero = array![0.0f32, 0.0];

        assert_relative_eq!(
            DistanceMetric::Angle.distance(&x.view(), &y.view()),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-9
        );
        assert_relative_eq!(DistanceMetric::Angle.distance(&x.view(), &x.view()), 0.0);
        assert_relative_eq!(
            DistanceMetric::Angle.distance(&zero.view(), &zero.view()),
            0.0
        );
        assert_relative_eq!(DistanceMetric::Tanimoto.distance(&x.view(), &y.view()), 1.0);
        assert_relative_eq!(
            DistanceMetric::Tanimoto.distance(&zero.view(), &zero.view()),
            0.0
        );
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(
            "norm2".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::L2
        );
        assert_eq!(
            "cosine".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Angle
        );
        assert!("hamming".parse::<DistanceMetric>().is_err());
        assert_eq!(DistanceMetric::SquaredL2.to_string(), "squared_l2");
    }

    #[test]
    fn test_nearest_centroid_ties_to_lowest_id() {
        let centroids = array![[0.0f32, 0.0], [10.0, 10.0]];
        let point = array![5.0f32, 5.0];

        let (id, dist) =
            nearest_centroid(DistanceMetric::SquaredL2, &centroids.view(), &point.view())
                .unwrap();
        assert_eq!(id, 0);
        assert_relative_eq!(dist, 50.0);
    }

    #[test]
    fn test_nearest_centroid_empty() {
        let centroids = ndarray::Array2::<f32>::zeros((0, 2));
        let point = array![1.0f32, 1.0];
        assert!(nearest_centroid(DistanceMetric::L2, &centroids.view(), &point.view()).is_none());
    }

    #[test]
    fn test_find_nearest_centroids() {
        let data = array![[0.0f32, 0.0], [10.0, 10.0], [9.0, 8.0]];
        let centroids = array![[0.0f32, 0.0], [10.0, 10.0]];

        let data_norms = compute_squared_norms(&data.view());
        let centroid_norms = compute_squared_norms(&centroids.view());

        let labels = find_nearest_centroids_chunked(
            &data.view(),
            &data_norms.view(),
            &centroids.view(),
            &centroid_norms.view(),
            1,
        );

        assert_eq!(labels.to_vec(), vec![0, 1, 1]);
    }

    #[test]
    fn test_predict_labels_generic_metric() {
        let data = array![[1.0f32, 0.1], [0.1, 1.0]];
        let centroids = array![[0.0f32, 1.0], [1.0, 0.0]];

        let labels = predict_labels(
            &data.view(),
            &centroids.view(),
            DistanceMetric::Angle,
            16,
            16,
        );
        assert_eq!(labels.to_vec(), vec![1, 0]);
    }
}
