use crate::distance::DistanceMetric;
use crate::error::KMeansError;
use crate::source::PointSource;
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

const BLOCK_SIZE: usize = 4_096;

/// Distances to the nearest and second nearest centroid
fn two_nearest(
    metric: DistanceMetric,
    centroids: &ArrayView2<f32>,
    point: &ArrayView1<f32>,
) -> (f64, f64) {
    let mut first = f64::INFINITY;
    let mut second = f64::INFINITY;
    for centroid in centroids.outer_iter() {
        let dist = metric.distance(&centroid, point);
        if dist < first {
            second = first;
            first = dist;
        } else if dist < second {
            second = dist;
        }
    }
    (first, second)
}

/// Simplified silhouette coefficient of a clustering.
///
/// For each point, `a` is the distance to its nearest centroid and `b` the
/// distance to the second nearest; the point scores `(b - a) / max(a, b)`,
/// or 0 when there is a single centroid or both distances are 0. Returns
/// the mean score, in `[0, 1]` since `a <= b`.
pub fn simple_silhouette(
    points: &dyn PointSource,
    centroids: &ArrayView2<f32>,
    metric: DistanceMetric,
) -> Result<f64, KMeansError> {
    let n = points.count();
    if n == 0 {
        return Err(KMeansError::EmptyDataset);
    }
    if centroids.nrows() == 0 {
        return Err(KMeansError::EmptyGroup(
            "silhouette of zero centroids".to_string(),
        ));
    }
    if centroids.ncols() != points.n_features() {
        return Err(KMeansError::InvalidDimensions(format!(
            "Centroids have {} features, points have {}",
            centroids.ncols(),
            points.n_features()
        )));
    }
    if centroids.nrows() == 1 {
        return Ok(0.0);
    }

    let total: f64 = points
        .blocks(BLOCK_SIZE)
        .into_par_iter()
        .map(|block| {
            block
                .axis_iter(Axis(0))
                .map(|point| {
                    let (a, b) = two_nearest(metric, centroids, &point);
                    let denom = a.max(b);
                    if denom > 0.0 && denom.is_finite() {
                        (b - a) / denom
                    } else {
                        0.0
                    }
                })
                .sum::<f64>()
        })
        .sum();

    Ok(total / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_well_separated_is_close_to_one() {
        let data = array![[0.0f32, 0.0], [0.0, 1.0], [100.0, 0.0], [100.0, 1.0]];
        let centroids = array![[0.0f32, 0.5], [100.0, 0.5]];

        let s = simple_silhouette(&data, &centroids.view(), DistanceMetric::L2).unwrap();
        assert!(s > 0.98);
        assert!(s <= 1.0);
    }

    #[test]
    fn test_point_on_centroid_scores_one() {
        let data = array![[0.0f32, 0.0], [4.0, 0.0]];
        let centroids = array![[0.0f32, 0.0], [4.0, 0.0]];

        let s = simple_silhouette(&data, &centroids.view(), DistanceMetric::L1).unwrap();
        assert_relative_eq!(s, 1.0);
    }

    #[test]
    fn test_equidistant_point_scores_zero() {
        let data = array![[2.0f32, 0.0]];
        let centroids = array![[0.0f32, 0.0], [4.0, 0.0]];

        let s = simple_silhouette(&data, &centroids.view(), DistanceMetric::L2).unwrap();
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn test_single_centroid_scores_zero() {
        let data = array![[1.0f32, 2.0], [3.0, 4.0]];
        let centroids = array![[2.0f32, 3.0]];

        let s = simple_silhouette(&data, &centroids.view(), DistanceMetric::L2).unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_silhouette_errors() {
        let data = array![[1.0f32, 2.0]];
        let empty = Array2::<f32>::zeros((0, 2));

        assert!(matches!(
            simple_silhouette(&empty, &data.view(), DistanceMetric::L2),
            Err(KMeansError::EmptyDataset)
        ));
        assert!(matches!(
            simple_silhouette(&data, &empty.view(), DistanceMetric::L2),
            Err(KMeansError::EmptyGroup(_))
        ));
        assert!(matches!(
            simple_silhouette(&data, &array![[1.0f32]].view(), DistanceMetric::L2),
            Err(KMeansError::InvalidDimensions(_))
        ));
    }
}
