//! Iteration controller: owns the snapshot store of one run and moves it
//! from one iteration to the next.
//!
//! Drivers express loop guards with [`IterationController::test`] and state
//! transitions with [`IterationController::advance`]. Expressions see the
//! run arguments and the latest snapshot through [`Bindings`]; any extra
//! value an expression needs is captured by its closure. Both `evaluate`
//! and `test` return `None` when an expression depends on something absent.

use crate::config::{KMeansArgs, RunConfig};
use crate::error::KMeansError;
use crate::oracle::AggregationOracle;
use crate::source::PointSource;
use crate::store::{InMemoryStore, RunHistory, Snapshot, SnapshotStore};
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// What an expression or state computation can see
pub struct Bindings<'b, S> {
    pub args: &'b KMeansArgs,
    /// Latest snapshot's state, `None` before the first `advance`
    pub state: Option<&'b S>,
    /// Latest written iteration, `None` before the first `advance`
    pub iteration: Option<usize>,
    pub source: &'b dyn PointSource,
    pub oracle: &'b dyn AggregationOracle,
    pub config: &'b RunConfig,
}

impl<'b, S> Bindings<'b, S> {
    /// Latest state, or an error naming what needed it
    pub fn require_state(&self) -> Result<&'b S, KMeansError> {
        self.state.ok_or_else(|| {
            KMeansError::Initialization("no state has been written for this run".to_string())
        })
    }
}

/// Drives one algorithm run over a snapshot store.
///
/// The store is created by [`begin`](Self::begin) and handed back by
/// [`end`](Self::end). A controller dropped without `end` (for example
/// because a driver returned an error) destroys its store.
pub struct IterationController<'a, S, St = InMemoryStore<S>>
where
    St: SnapshotStore<S>,
{
    args: &'a KMeansArgs,
    source: &'a dyn PointSource,
    oracle: &'a dyn AggregationOracle,
    config: &'a RunConfig,
    store: Option<St>,
    iteration: Option<usize>,
    _state: PhantomData<S>,
}

impl<'a, S, St> IterationController<'a, S, St>
where
    St: SnapshotStore<S>,
{
    /// Validate the arguments and create the run's snapshot sequence
    pub fn begin(
        args: &'a KMeansArgs,
        source: &'a dyn PointSource,
        oracle: &'a dyn AggregationOracle,
        config: &'a RunConfig,
        mut store: St,
    ) -> Result<Self, KMeansError> {
        args.validate(source.n_features())?;
        store.create(config.history)?;

        info!(
            k = args.k,
            n_points = source.count(),
            n_features = source.n_features(),
            distance = %args.distance,
            history = ?config.history,
            "iteration run started"
        );

        Ok(Self {
            args,
            source,
            oracle,
            config,
            store: Some(store),
            iteration: None,
            _state: PhantomData,
        })
    }

    /// Run `body` inside a controller scope.
    ///
    /// The scope is released on every path: on success the store is
    /// returned, on failure it is destroyed before the error propagates.
    pub fn scoped<R>(
        args: &'a KMeansArgs,
        source: &'a dyn PointSource,
        oracle: &'a dyn AggregationOracle,
        config: &'a RunConfig,
        store: St,
        body: impl FnOnce(&mut Self) -> Result<R, KMeansError>,
    ) -> Result<(R, St), KMeansError> {
        let mut controller = Self::begin(args, source, oracle, config, store)?;
        let value = body(&mut controller)?;
        let store = controller.end()?;
        Ok((value, store))
    }

    pub fn args(&self) -> &'a KMeansArgs {
        self.args
    }

    pub fn source(&self) -> &'a dyn PointSource {
        self.source
    }

    pub fn oracle(&self) -> &'a dyn AggregationOracle {
        self.oracle
    }

    pub fn config(&self) -> &'a RunConfig {
        self.config
    }

    /// Latest written iteration index, `None` before the first snapshot
    pub fn current_iteration(&self) -> Option<usize> {
        self.iteration
    }

    /// State of the latest snapshot
    pub fn latest_state(&self) -> Option<&S> {
        self.store.as_ref()?.latest().map(|s| &s.state)
    }

    /// State of a retained snapshot
    pub fn state_at(&self, iteration: usize) -> Option<&S> {
        self.store.as_ref()?.get(iteration).map(|s| &s.state)
    }

    /// Number of snapshots currently retained
    pub fn retained(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.len())
    }

    fn bindings(&self) -> Bindings<'_, S> {
        Bindings {
            args: self.args,
            state: self.latest_state(),
            iteration: self.iteration,
            source: self.source,
            oracle: self.oracle,
            config: self.config,
        }
    }

    /// Evaluate an expression against the latest state
    pub fn evaluate<T>(&self, expr: impl FnOnce(&Bindings<'_, S>) -> Option<T>) -> Option<T> {
        expr(&self.bindings())
    }

    /// Evaluate a condition. `None` means unknown and must not be read as true.
    pub fn test(&self, cond: impl FnOnce(&Bindings<'_, S>) -> Option<bool>) -> Option<bool> {
        cond(&self.bindings())
    }

    /// Compute the next state from the latest one and append it.
    ///
    /// Returns the new iteration index. If `compute` fails nothing is written
    /// and the iteration index is unchanged.
    pub fn advance(
        &mut self,
        compute: impl FnOnce(&Bindings<'_, S>) -> Result<S, KMeansError>,
    ) -> Result<usize, KMeansError> {
        let next = self.iteration.map_or(0, |i| i + 1);

        let state = compute(&self.bindings()).map_err(|err| KMeansError::StateComputation {
            iteration: next,
            source: Box::new(err),
        })?;

        let store = self.store.as_mut().ok_or_else(|| {
            KMeansError::Initialization("controller has already ended".to_string())
        })?;
        store.append(Snapshot {
            iteration: next,
            state,
        })?;
        self.iteration = Some(next);

        debug!(iteration = next, retained = store.len(), "snapshot written");
        Ok(next)
    }

    /// Release the scope and hand back the store with the run's snapshots
    pub fn end(mut self) -> Result<St, KMeansError> {
        let store = self.store.take().ok_or_else(|| {
            KMeansError::Initialization("controller has already ended".to_string())
        })?;
        info!(
            final_iteration = ?self.iteration,
            retained = store.len(),
            "iteration run finished"
        );
        Ok(store)
    }
}

impl<'a, S> IterationController<'a, S, InMemoryStore<S>> {
    /// Run `body` over a fresh in-memory store and return its history
    pub fn run<R>(
        args: &'a KMeansArgs,
        source: &'a dyn PointSource,
        oracle: &'a dyn AggregationOracle,
        config: &'a RunConfig,
        body: impl FnOnce(&mut Self) -> Result<R, KMeansError>,
    ) -> Result<(R, RunHistory<S>), KMeansError> {
        let (value, store) =
            Self::scoped(args, source, oracle, config, InMemoryStore::new(), body)?;
        Ok((value, RunHistory::from_store(store)))
    }
}

impl<'a, S, St> Drop for IterationController<'a, S, St>
where
    St: SnapshotStore<S>,
{
    fn drop(&mut self) {
        if let Some(store) = self.store.as_mut() {
            warn!(
                last_iteration = ?self.iteration,
                "iteration run abandoned, discarding snapshots"
            );
            store.destroy();
        }
    }
}
