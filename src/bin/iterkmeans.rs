//! Cluster the points of a .npy file and write the centroids to another.
//!
//! Usage: `iterkmeans <input.npy> <output.npy> <k> <seed> <max_iters> <min_frac_reassigned> [random|plusplus]`
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use iterkmeans_rs::{simple_silhouette, KMeans, KMeansConfig, Seeding};
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_seeding(arg: Option<&str>) -> Result<Seeding, String> {
    match arg {
        None | Some("plusplus") => Ok(Seeding::PlusPlus),
        Some("random") => Ok(Seeding::Random),
        Some(other) => Err(format!(
            "Unknown seeding '{}', expected 'random' or 'plusplus'",
            other
        )),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 7 && args.len() != 8 {
        eprintln!(
            "Usage: {} <input.npy> <output.npy> <k> <seed> <max_iters> <min_frac_reassigned> [random|plusplus]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];
    let k: usize = args[3].parse()?;
    let seed: u64 = args[4].parse()?;
    let max_iters: usize = args[5].parse()?;
    let min_frac_reassigned: f64 = args[6].parse()?;
    let seeding = parse_seeding(args.get(7).map(String::as_str))?;

    let reader = BufReader::new(File::open(input_path)?);
    let data: Array2<f32> = Array2::read_npy(reader)?;

    info!(
        n_samples = data.nrows(),
        n_features = data.ncols(),
        path = %input_path,
        "loaded points"
    );

    let config = KMeansConfig::new(k)
        .with_seed(seed)
        .with_max_iters(max_iters)
        .with_min_frac_reassigned(min_frac_reassigned)
        .with_seeding(seeding);
    let distance = config.distance;

    let mut kmeans = KMeans::with_config(config);
    let result = kmeans.fit(&data.view())?;

    let silhouette = simple_silhouette(&data, &result.centroids.view(), distance)?;
    info!(
        iterations = result.num_iterations,
        objective_fn = result.objective_fn,
        frac_reassigned = result.frac_reassigned,
        silhouette,
        "clustering finished"
    );

    let writer = BufWriter::new(File::create(output_path)?);
    result.centroids.write_npy(writer)?;

    info!(shape = ?result.centroids.shape(), path = %output_path, "saved centroids");

    Ok(())
}
