//! Lloyd's k-means refinement.
//!
//! Each iteration assigns every point to its nearest centroid, replaces each
//! centroid by the mean of its points and records how many points changed
//! cluster. When a centroid ends up with no points it is dropped and the
//! remaining centroids are topped up to `k` with k-means++ in a separate
//! corrective iteration.

use crate::config::{KMeansArgs, RunConfig};
use crate::controller::IterationController;
use crate::error::KMeansError;
use crate::oracle::{AggregationOracle, Assignment};
use crate::seeding::{ensure_enough_points, kmeanspp_seeding, SeedingState};
use crate::source::PointSource;
use crate::store::{HistoryMode, RunHistory, SnapshotStore};
use crate::tristate::{and, gt, holds, lt};
use ndarray::Array2;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// State of Lloyd's refinement
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansState {
    /// Current centroids, one per row
    pub centroids: Array2<f32>,

    /// Centroid id of every point (in scan order) from the assignment that
    /// produced `centroids`, expressed as row indices of `centroids`.
    /// `None` until the first assignment.
    pub old_centroid_ids: Option<Vec<usize>>,

    /// Sum of the distances of all points to their assigned centroid
    pub objective_fn: f64,

    /// Fraction of points whose assignment changed
    pub frac_reassigned: f64,
}

impl KMeansState {
    /// State built from starting centroids; forces at least one refinement
    pub fn initial(centroids: Array2<f32>) -> Self {
        Self {
            centroids,
            old_centroid_ids: None,
            objective_fn: f64::INFINITY,
            frac_reassigned: 1.0,
        }
    }

    /// Reduce an assignment into the next state.
    ///
    /// Starved centroids are dropped; the surviving ones keep their relative
    /// order and the per-point ids are renumbered to match.
    pub fn from_assignment(
        assignment: Assignment,
        oracle: &dyn AggregationOracle,
    ) -> Result<Self, KMeansError> {
        let n_points = assignment.n_points();
        if n_points == 0 {
            return Err(KMeansError::EmptyGroup(
                "no points were assigned".to_string(),
            ));
        }

        let mut renumber = vec![usize::MAX; assignment.partials.len()];
        let mut means = Vec::with_capacity(assignment.partials.len());
        for (id, partial) in assignment.partials.iter().enumerate() {
            if partial.is_empty() {
                continue;
            }
            renumber[id] = means.len();
            means.push(partial.mean()?);
        }

        let centroids = oracle.matrix_aggregate(&means)?;
        let objective_fn = assignment.total_objective();
        let frac_reassigned = assignment.total_reassigned() as f64 / n_points as f64;
        let old_centroid_ids = assignment.ids.iter().map(|&id| renumber[id]).collect();

        Ok(Self {
            centroids,
            old_centroid_ids: Some(old_centroid_ids),
            objective_fn,
            frac_reassigned,
        })
    }

    pub fn n_centroids(&self) -> usize {
        self.centroids.nrows()
    }
}

/// If the latest state has fewer than `k` centroids, write a corrective
/// state topped up by k-means++. Returns the new iteration index, if any.
fn reseed_if_starved<St>(
    ctl: &mut IterationController<'_, KMeansState, St>,
    rng: &mut dyn RngCore,
) -> Result<Option<usize>, KMeansError>
where
    St: SnapshotStore<KMeansState>,
{
    let Some(have) = ctl.evaluate(|b| {
        b.state
            .map(KMeansState::n_centroids)
            .filter(|&n| n < b.args.k)
    }) else {
        return Ok(None);
    };

    warn!(
        iteration = ?ctl.current_iteration(),
        have,
        k = ctl.args().k,
        "centroid starvation, reseeding with k-means++"
    );

    let iteration = ctl.advance(|b| {
        let state = b.require_state()?;
        let args = b.args.clone().with_initial_centroids(state.centroids.clone());
        let config = RunConfig {
            history: HistoryMode::Truncate,
            ..b.config.clone()
        };

        let (_, history) =
            IterationController::<SeedingState>::run(&args, b.source, b.oracle, &config, |c| {
                kmeanspp_seeding(c, rng)
            })?;
        let centroids = history.into_last_state().ok_or_else(|| {
            KMeansError::Initialization("k-means++ reseeding wrote no state".to_string())
        })?;

        Ok(KMeansState {
            centroids,
            old_centroid_ids: state.old_centroid_ids.clone(),
            objective_fn: f64::INFINITY,
            frac_reassigned: 1.0,
        })
    })?;

    Ok(Some(iteration))
}

/// Lloyd's refinement.
///
/// Starts from the initial centroids in the arguments. Missing centroids
/// (none given, or fewer than `k`) are filled in by k-means++ before the
/// first assignment. Iterates while the iteration index is below
/// `max_num_iterations` and the fraction of reassigned points is above
/// `min_frac_reassigned`. Returns the final iteration index.
pub fn lloyd_refine<St>(
    ctl: &mut IterationController<'_, KMeansState, St>,
    rng: &mut dyn RngCore,
) -> Result<usize, KMeansError>
where
    St: SnapshotStore<KMeansState>,
{
    ensure_enough_points(ctl.source(), ctl.args().k)?;
    let n_features = ctl.source().n_features();
    let initial = ctl
        .evaluate(|b| {
            b.args
                .initial_centroids
                .as_ref()
                .filter(|c| c.nrows() > 0)
                .cloned()
        })
        .unwrap_or_else(|| Array2::zeros((0, n_features)));

    let mut last = ctl.advance(|_| Ok(KMeansState::initial(initial)))?;
    if let Some(iteration) = reseed_if_starved(ctl, rng)? {
        last = iteration;
    }

    while holds(ctl.test(|b| {
        and(
            lt(b.iteration, Some(b.args.max_num_iterations)),
            gt(
                b.state.map(|s| s.frac_reassigned),
                Some(b.args.min_frac_reassigned),
            ),
        )
    })) {
        last = ctl.advance(|b| {
            let state = b.require_state()?;
            let assignment = b.oracle.assign_and_reduce(
                b.source,
                &state.centroids.view(),
                state.old_centroid_ids.as_deref(),
                b.args.distance,
            )?;
            KMeansState::from_assignment(assignment, b.oracle)
        })?;

        if let Some(state) = ctl.latest_state() {
            debug!(
                iteration = last,
                objective_fn = state.objective_fn,
                frac_reassigned = state.frac_reassigned,
                n_centroids = state.n_centroids(),
                "lloyd iteration complete"
            );
        }

        if let Some(iteration) = reseed_if_starved(ctl, rng)? {
            last = iteration;
        }
    }

    let converged = holds(ctl.test(|b| {
        b.state
            .map(|s| s.frac_reassigned <= b.args.min_frac_reassigned)
    }));
    if converged {
        info!(iteration = last, "k-means converged");
    } else {
        warn!(
            iteration = last,
            max_num_iterations = ctl.args().max_num_iterations,
            "k-means stopped at the iteration limit without converging"
        );
    }

    Ok(last)
}

/// Lloyd's refinement over a fresh in-memory store, reseeding with an RNG
/// seeded from `config.seed`. Returns the terminal state and the history.
pub fn run_lloyd(
    args: &KMeansArgs,
    source: &dyn PointSource,
    oracle: &dyn AggregationOracle,
    config: &RunConfig,
) -> Result<(KMeansState, RunHistory<KMeansState>), KMeansError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (_, history) = IterationController::run(args, source, oracle, config, |c| {
        lloyd_refine(c, &mut rng)
    })?;
    let state = history
        .last_state()
        .cloned()
        .ok_or_else(|| KMeansError::Initialization("refinement wrote no state".to_string()))?;
    Ok((state, history))
}
