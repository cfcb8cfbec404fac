use crate::error::KMeansError;
use std::collections::VecDeque;

/// Whether a run keeps every snapshot or only the newest one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    /// Every snapshot stays readable after the run
    #[default]
    Preserve,
    /// Each write supersedes the previous snapshot
    Truncate,
}

/// The recorded state of one iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    pub iteration: usize,
    pub state: S,
}

/// Ordered log of snapshots backing one run.
///
/// A store holds at most one live run. Snapshots are never modified once
/// appended; in [`HistoryMode::Truncate`] older ones are dropped after the
/// new one is in place.
pub trait SnapshotStore<S> {
    /// Start a run. Fails if a run is already live.
    fn create(&mut self, mode: HistoryMode) -> Result<(), KMeansError>;

    /// Append the snapshot for `latest + 1` (or 0 for the first one)
    fn append(&mut self, snapshot: Snapshot<S>) -> Result<(), KMeansError>;

    /// Snapshot of the given iteration, if it is still retained
    fn get(&self, iteration: usize) -> Option<&Snapshot<S>>;

    /// Most recently written snapshot
    fn latest(&self) -> Option<&Snapshot<S>>;

    /// Number of retained snapshots
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every snapshot and end the run
    fn destroy(&mut self);

    /// Whether a run is live
    fn is_live(&self) -> bool;
}

impl<S, T> SnapshotStore<S> for &mut T
where
    T: SnapshotStore<S> + ?Sized,
{
    fn create(&mut self, mode: HistoryMode) -> Result<(), KMeansError> {
        (**self).create(mode)
    }

    fn append(&mut self, snapshot: Snapshot<S>) -> Result<(), KMeansError> {
        (**self).append(snapshot)
    }

    fn get(&self, iteration: usize) -> Option<&Snapshot<S>> {
        (**self).get(iteration)
    }

    fn latest(&self) -> Option<&Snapshot<S>> {
        (**self).latest()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }
}

/// Snapshot store kept in memory
#[derive(Debug)]
pub struct InMemoryStore<S> {
    snapshots: VecDeque<Snapshot<S>>,
    mode: HistoryMode,
    live: bool,
}

impl<S> Default for InMemoryStore<S> {
    fn default() -> Self {
        Self {
            snapshots: VecDeque::new(),
            mode: HistoryMode::Preserve,
            live: false,
        }
    }
}

impl<S> InMemoryStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    fn into_snapshots(self) -> VecDeque<Snapshot<S>> {
        self.snapshots
    }
}

impl<S> SnapshotStore<S> for InMemoryStore<S> {
    fn create(&mut self, mode: HistoryMode) -> Result<(), KMeansError> {
        if self.live {
            return Err(KMeansError::Initialization(
                "snapshot store already backs a live run".to_string(),
            ));
        }
        self.snapshots.clear();
        self.mode = mode;
        self.live = true;
        Ok(())
    }

    fn append(&mut self, snapshot: Snapshot<S>) -> Result<(), KMeansError> {
        if !self.live {
            return Err(KMeansError::Initialization(
                "snapshot store has no live run".to_string(),
            ));
        }

        let expected = self.latest().map_or(0, |s| s.iteration + 1);
        if snapshot.iteration != expected {
            return Err(KMeansError::InvalidArgument(format!(
                "Snapshot for iteration {} appended, expected iteration {}",
                snapshot.iteration, expected
            )));
        }

        self.snapshots.push_back(snapshot);
        if self.mode == HistoryMode::Truncate {
            while self.snapshots.len() > 1 {
                self.snapshots.pop_front();
            }
        }
        Ok(())
    }

    fn get(&self, iteration: usize) -> Option<&Snapshot<S>> {
        let first = self.snapshots.front()?.iteration;
        let snapshot = self.snapshots.get(iteration.checked_sub(first)?)?;
        debug_assert_eq!(snapshot.iteration, iteration);
        Some(snapshot)
    }

    fn latest(&self) -> Option<&Snapshot<S>> {
        self.snapshots.back()
    }

    fn len(&self) -> usize {
        self.snapshots.len()
    }

    fn destroy(&mut self) {
        self.snapshots.clear();
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// Read-only snapshots left behind by a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunHistory<S> {
    snapshots: Vec<Snapshot<S>>,
    final_iteration: Option<usize>,
}

impl<S> RunHistory<S> {
    pub(crate) fn from_store(store: InMemoryStore<S>) -> Self {
        let snapshots: Vec<_> = store.into_snapshots().into();
        let final_iteration = snapshots.last().map(|s| s.iteration);
        Self {
            snapshots,
            final_iteration,
        }
    }

    /// Index of the last snapshot written by the run
    pub fn final_iteration(&self) -> Option<usize> {
        self.final_iteration
    }

    pub fn get(&self, iteration: usize) -> Option<&Snapshot<S>> {
        let first = self.snapshots.first()?.iteration;
        self.snapshots.get(iteration.checked_sub(first)?)
    }

    pub fn last(&self) -> Option<&Snapshot<S>> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot<S>> {
        self.snapshots.iter()
    }

    /// State of the last snapshot
    pub fn last_state(&self) -> Option<&S> {
        self.snapshots.last().map(|s| &s.state)
    }

    /// Consume the history and return the terminal state
    pub fn into_last_state(self) -> Option<S> {
        self.snapshots.into_iter().last().map(|s| s.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_store(mode: HistoryMode) -> InMemoryStore<u32> {
        let mut store = InMemoryStore::new();
        store.create(mode).unwrap();
        store
    }

    #[test]
    fn test_preserve_keeps_everything() {
        let mut store = live_store(HistoryMode::Preserve);
        for i in 0..4 {
            store
                .append(Snapshot {
                    iteration: i,
                    state: i as u32 * 10,
                })
                .unwrap();
            assert_eq!(store.len(), i + 1);
        }

        assert_eq!(store.get(2).unwrap().state, 20);
        assert_eq!(store.latest().unwrap().iteration, 3);
    }

    #[test]
    fn test_truncate_keeps_latest_only() {
        let mut store = live_store(HistoryMode::Truncate);
        for i in 0..4 {
            store
                .append(Snapshot {
                    iteration: i,
                    state: i as u32,
                })
                .unwrap();
            assert_eq!(store.len(), 1);
        }

        assert!(store.get(2).is_none());
        assert_eq!(store.get(3).unwrap().state, 3);
    }

    #[test]
    fn test_append_rejects_gaps_and_duplicates() {
        let mut store = live_store(HistoryMode::Preserve);
        store
            .append(Snapshot {
                iteration: 0,
                state: 0,
            })
            .unwrap();

        assert!(store
            .append(Snapshot {
                iteration: 0,
                state: 1
            })
            .is_err());
        assert!(store
            .append(Snapshot {
                iteration: 2,
                state: 1
            })
            .is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_twice_fails() {
        let mut store = live_store(HistoryMode::Preserve);
        let result = store.create(HistoryMode::Preserve);
        assert!(matches!(result, Err(KMeansError::Initialization(_))));

        store.destroy();
        assert!(!store.is_live());
        assert!(store.create(HistoryMode::Truncate).is_ok());
    }

    #[test]
    fn test_append_without_run_fails() {
        let mut store: InMemoryStore<u32> = InMemoryStore::new();
        let result = store.append(Snapshot {
            iteration: 0,
            state: 0,
        });
        assert!(matches!(result, Err(KMeansError::Initialization(_))));
    }

    #[test]
    fn test_run_history_reads_are_stable() {
        let mut store = live_store(HistoryMode::Preserve);
        for i in 0..3 {
            store
                .append(Snapshot {
                    iteration: i,
                    state: i as u32,
                })
                .unwrap();
        }

        let history = RunHistory::from_store(store);
        assert_eq!(history.final_iteration(), Some(2));
        assert_eq!(history.get(2), history.get(2));
        assert_eq!(history.iter().count(), 3);
        assert_eq!(history.into_last_state(), Some(2));
    }
}
