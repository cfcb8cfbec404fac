//! Seeding drivers: random seeding and k-means++.
//!
//! Both drivers keep a bare centroid matrix as their state and grow it
//! until it holds `k` rows. Initial centroids in the run arguments are used
//! as the first state; an absent or empty matrix falls back to the
//! driver's own start.

use crate::config::{KMeansArgs, RunConfig};
use crate::controller::IterationController;
use crate::error::KMeansError;
use crate::oracle::AggregationOracle;
use crate::source::PointSource;
use crate::store::{RunHistory, SnapshotStore};
use crate::tristate::{gt, holds, lt};
use ndarray::{concatenate, Array2, Axis};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// State of both seeding drivers
pub type SeedingState = Array2<f32>;

/// Acceptance probability for one Bernoulli pass that still needs `missing`
/// points out of `n`.
///
/// Oversamples so that a single pass covers `missing` with high probability.
pub fn oversampling_probability(missing: usize, n: usize) -> Result<f64, KMeansError> {
    if n == 0 {
        return Err(KMeansError::EmptyDataset);
    }
    let m = missing as f64;
    Ok(((m + 14.0 + (196.0 + 28.0 * m).sqrt()) / n as f64).min(1.0))
}

fn append_rows(current: &Array2<f32>, rows: &Array2<f32>) -> Result<Array2<f32>, KMeansError> {
    concatenate(Axis(0), &[current.view(), rows.view()])
        .map_err(|e| KMeansError::InvalidDimensions(e.to_string()))
}

/// Fail when a non-empty source holds fewer than `k` points. An empty source
/// is left to the drivers, which report it as `EmptyDataset` or `EmptyGroup`.
pub(crate) fn ensure_enough_points(source: &dyn PointSource, k: usize) -> Result<(), KMeansError> {
    let n = source.count();
    if n > 0 && n < k {
        return Err(KMeansError::InsufficientData(format!(
            "Number of samples ({}) is less than k ({})",
            n, k
        )));
    }
    Ok(())
}

/// Initial centroids from the arguments, treating an empty matrix as absent
fn initial_centroids<S, St>(ctl: &IterationController<'_, S, St>) -> Option<Array2<f32>>
where
    St: SnapshotStore<S>,
{
    ctl.evaluate(|b| {
        b.args
            .initial_centroids
            .as_ref()
            .filter(|c| c.nrows() > 0)
            .cloned()
    })
}

/// Random seeding.
///
/// Starts from the initial centroids (or none) and tops them up to `k` with
/// points accepted by independent Bernoulli passes over the source. Each
/// pass is one iteration. Returns the final iteration index.
pub fn random_seeding<St>(
    ctl: &mut IterationController<'_, SeedingState, St>,
    rng: &mut dyn RngCore,
) -> Result<usize, KMeansError>
where
    St: SnapshotStore<SeedingState>,
{
    let n_features = ctl.source().n_features();
    let initial = initial_centroids(ctl);
    let mut last =
        ctl.advance(|_| Ok(initial.unwrap_or_else(|| Array2::zeros((0, n_features)))))?;

    let mut rounds = 0;
    while let Some(missing) = ctl.evaluate(|b| {
        b.state
            .map(|c| b.args.k.saturating_sub(c.nrows()))
            .filter(|&m| m > 0)
    }) {
        let n = ctl.source().count();
        let p = oversampling_probability(missing, n)?;
        if missing > n {
            return Err(KMeansError::InsufficientData(format!(
                "Number of samples ({}) is less than the {} centroids still missing",
                n, missing
            )));
        }
        if rounds == ctl.config().max_seeding_rounds {
            return Err(KMeansError::SeedingExhausted { rounds, missing });
        }

        last = ctl.advance(|b| {
            let current = b.require_state()?;
            let sample = b.oracle.bernoulli_sample(b.source, p, missing, rng)?;
            append_rows(current, &sample)
        })?;
        rounds += 1;

        debug!(iteration = last, missing, p, "random seeding round");
    }

    info!(
        k = ctl.args().k,
        rounds,
        iteration = last,
        "random seeding finished"
    );
    Ok(last)
}

/// k-means++ seeding.
///
/// Without initial centroids the first one is drawn uniformly. Every
/// further iteration draws exactly one point with probability proportional
/// to its squared distance to the nearest existing centroid. Returns the
/// final iteration index.
pub fn kmeanspp_seeding<St>(
    ctl: &mut IterationController<'_, SeedingState, St>,
    rng: &mut dyn RngCore,
) -> Result<usize, KMeansError>
where
    St: SnapshotStore<SeedingState>,
{
    ensure_enough_points(ctl.source(), ctl.args().k)?;
    let initial = initial_centroids(ctl);
    let mut last = ctl.advance(|b| match initial {
        Some(centroids) => Ok(centroids),
        None => {
            if b.source.count() == 0 {
                return Err(KMeansError::EmptyDataset);
            }
            b.oracle.weighted_sample(b.source, &|_| 1.0, 1, rng)
        }
    })?;

    while holds(ctl.test(|b| lt(b.state.map(|c| c.nrows()), Some(b.args.k)))) {
        last = ctl.advance(|b| {
            if b.source.count() == 0 {
                return Err(KMeansError::EmptyDataset);
            }

            let current = b.require_state()?;
            let centroids = current.view();
            let metric = b.args.distance;
            let oracle = b.oracle;

            let picked = oracle.weighted_sample(
                b.source,
                &|p| {
                    oracle
                        .closest_centroid(&centroids, p, metric)
                        .map_or(0.0, |c| metric.squared(c.distance))
                },
                1,
                rng,
            )?;
            append_rows(current, &picked)
        })?;

        debug!(
            iteration = last,
            n_centroids = ctl.latest_state().map_or(0, |c| c.nrows()),
            "k-means++ picked a centroid"
        );
    }

    debug_assert!(!holds(
        ctl.test(|b| gt(b.state.map(|c| c.nrows()), Some(b.args.k)))
    ));
    Ok(last)
}

fn with_terminal_state(
    history: RunHistory<SeedingState>,
) -> Result<(SeedingState, RunHistory<SeedingState>), KMeansError> {
    let state = history
        .last_state()
        .cloned()
        .ok_or_else(|| KMeansError::Initialization("seeding wrote no state".to_string()))?;
    Ok((state, history))
}

/// Random seeding over a fresh in-memory store, seeded from `config.seed`
pub fn run_random_seeding(
    args: &KMeansArgs,
    source: &dyn PointSource,
    oracle: &dyn AggregationOracle,
    config: &RunConfig,
) -> Result<(SeedingState, RunHistory<SeedingState>), KMeansError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (_, history) = IterationController::run(args, source, oracle, config, |c| {
        random_seeding(c, &mut rng)
    })?;
    with_terminal_state(history)
}

/// k-means++ seeding over a fresh in-memory store, seeded from `config.seed`
pub fn run_kmeanspp_seeding(
    args: &KMeansArgs,
    source: &dyn PointSource,
    oracle: &dyn AggregationOracle,
    config: &RunConfig,
) -> Result<(SeedingState, RunHistory<SeedingState>), KMeansError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (_, history) = IterationController::run(args, source, oracle, config, |c| {
        kmeanspp_seeding(c, &mut rng)
    })?;
    with_terminal_state(history)
}
