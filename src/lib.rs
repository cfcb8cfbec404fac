//! # iterkmeans-rs
//!
//! Iteration-controlled k-means clustering over ndarray.
//!
//! ## Features
//!
//! - **Iteration controller**: every algorithm is a loop of `advance` steps
//!   over an append-only (or truncating) snapshot store, guarded by
//!   three-valued conditions where "unknown" never continues a loop
//! - **Three drivers**: random seeding, k-means++ seeding and Lloyd's
//!   refinement with reseeding when a centroid loses all its points
//! - **Parallel reductions**: per-block scans with rayon, merged in block
//!   order so results do not depend on scheduling
//! - **Optional BLAS acceleration**: Enable `accelerate` (macOS) or `openblas` features for faster matrix operations
//!
//! ## Example
//!
//! ```rust
//! use iterkmeans_rs::{KMeans, KMeansConfig};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! let data = Array2::random((1000, 32), Uniform::new(-1.0f32, 1.0));
//!
//! let mut kmeans = KMeans::new(10);
//! kmeans.fit(&data.view()).unwrap();
//!
//! let labels = kmeans.predict(&data.view()).unwrap();
//! assert_eq!(labels.len(), 1000);
//! ```
//!
//! ## Driving a run directly
//!
//! ```rust
//! use iterkmeans_rs::{
//!     lloyd_refine, IterationController, KMeansArgs, KMeansState, NdarrayOracle, RunConfig,
//! };
//! use ndarray::array;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let data = array![[0.0f32, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
//! let args = KMeansArgs::new(2)
//!     .with_initial_centroids(array![[0.0f32, 0.0], [10.0, 0.0]])
//!     .with_min_frac_reassigned(0.0);
//! let config = RunConfig::default();
//! let oracle = NdarrayOracle::new(&config);
//! let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
//!
//! let (last, history) = IterationController::<KMeansState>::run(
//!     &args,
//!     &data,
//!     &oracle,
//!     &config,
//!     |ctl| lloyd_refine(ctl, &mut rng),
//! )
//! .unwrap();
//!
//! let state = &history.get(last).unwrap().state;
//! assert_eq!(state.centroids, array![[0.0f32, 0.5], [10.0, 0.5]]);
//! ```
//!
//! ## BLAS Acceleration
//!
//! ```toml
//! # macOS (uses Apple Accelerate)
//! iterkmeans-rs = { version = "0.1", features = ["accelerate"] }
//!
//! # Linux/Windows (requires OpenBLAS installed)
//! iterkmeans-rs = { version = "0.1", features = ["openblas"] }
//! ```

// Link BLAS libraries when features are enabled
#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "openblas")]
extern crate openblas_src;

mod config;
mod controller;
mod distance;
mod error;
mod kmeans;
mod lloyd;
mod oracle;
mod seeding;
mod silhouette;
mod source;
mod store;
pub mod tristate;

pub use config::{KMeansArgs, KMeansConfig, ReductionStrategy, RunConfig, Seeding};
pub use controller::{Bindings, IterationController};
pub use distance::{nearest_centroid, predict_labels, DistanceMetric};
pub use error::KMeansError;
pub use kmeans::{KMeans, KMeansResult};
pub use lloyd::{lloyd_refine, run_lloyd, KMeansState};
pub use oracle::{
    AggregationOracle, Assignment, ClosestCentroid, ClusterPartial, NdarrayOracle, WeightFn,
};
pub use seeding::{
    kmeanspp_seeding, oversampling_probability, random_seeding, run_kmeanspp_seeding,
    run_random_seeding, SeedingState,
};
pub use silhouette::simple_silhouette;
pub use source::PointSource;
pub use store::{HistoryMode, InMemoryStore, RunHistory, Snapshot, SnapshotStore};
