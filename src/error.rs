use thiserror::Error;

/// Error types for the iterkmeans library
#[derive(Error, Debug)]
pub enum KMeansError {
    /// The number of clusters k is invalid (must be > 0)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// Not enough data points for the requested number of clusters
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Model has not been fitted yet
    #[error("Model has not been fitted. Call fit() or one of the seeding methods first.")]
    NotFitted,

    /// Dimension mismatch between data and model
    #[error("Dimension mismatch: {0}")]
    InvalidDimensions(String),

    /// An argument other than k is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The snapshot store for a run could not be created
    #[error("Failed to initialize iteration state: {0}")]
    Initialization(String),

    /// Computing the state of an iteration failed; nothing was written for it
    #[error("State computation failed at iteration {iteration}: {source}")]
    StateComputation {
        iteration: usize,
        #[source]
        source: Box<KMeansError>,
    },

    /// A probability or ratio over the point source was requested with no points
    #[error("Point source is empty")]
    EmptyDataset,

    /// A reduction primitive received no elements
    #[error("Cannot aggregate an empty group: {0}")]
    EmptyGroup(String),

    /// Random seeding gave up after the configured number of sampling rounds
    #[error("Random seeding still missing {missing} centroids after {rounds} rounds")]
    SeedingExhausted { rounds: usize, missing: usize },
}
