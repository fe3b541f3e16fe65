//! wlop CLI - point-cloud consolidation command-line tool.
//!
//! Usage: wlop <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `wlop --help` for available commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use wlop::algo::consolidate::{
    consolidate_with_progress, FrameSource, Mode, RunParameters, DEFAULT_EDGE_SIGMA,
};
use wlop::algo::normals::{estimate_normals, orient_outward, smooth_normals};
use wlop::algo::{Executor, Progress};
use wlop::cloud::sample::{farthest_point_sample, random_subsample, stride_subsample};
use wlop::cloud::{mean_nearest_neighbor_distance, suggested_radius, Normalization, PointCloud};
use wlop::io;
use wlop::nalgebra::Point3;

#[derive(Parser)]
#[command(name = "wlop")]
#[command(author, version, about = "Point cloud consolidation CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display point cloud information
    Info {
        /// Input point cloud file
        input: PathBuf,
    },

    /// Subsample a point cloud
    Sample {
        /// Input point cloud file
        input: PathBuf,

        /// Output point cloud file
        output: PathBuf,

        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Consolidate a point cloud
    Consolidate {
        /// Input (reference) point cloud file
        input: PathBuf,

        /// Output point cloud file
        output: PathBuf,

        /// Use this file as the initial sample instead of subsampling the input
        #[arg(long)]
        seed_file: Option<PathBuf>,

        #[command(flatten)]
        seed: SeedArgs,

        /// JSON file with run parameters (flags below override it)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Neighborhood radius in input units (default: from config, else
        /// estimated from the input)
        #[arg(short, long)]
        radius: Option<f64>,

        /// Repulsion weight (mu)
        #[arg(short = 'm', long)]
        repulsion: Option<f64>,

        /// Number of iterations
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Disable density correction
        #[arg(long)]
        no_density: bool,

        /// Use edge-aware consolidation
        #[arg(short, long)]
        anisotropic: bool,

        /// Re-estimate local frames every N iterations (anisotropic only)
        #[arg(long)]
        frame_interval: Option<usize>,

        /// Edge suppression width (anisotropic only)
        #[arg(long)]
        edge_sigma: Option<f64>,

        /// Estimate local frames from the input instead of the working set
        #[arg(long)]
        reference_frames: bool,

        /// Stop once the largest displacement falls below this value (input units)
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum fraction of points allowed to fault in one iteration
        #[arg(long)]
        max_fault_ratio: Option<f64>,

        /// Scale the input into the unit box before consolidating; radius and
        /// threshold are rescaled with it
        #[arg(long)]
        normalize: bool,

        /// Estimate normals for the result from this many neighbors
        #[arg(long)]
        normals: Option<usize>,

        /// Write run statistics as JSON to this file
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Estimate normals
    Normals {
        /// Input point cloud file
        input: PathBuf,

        /// Output point cloud file
        output: PathBuf,

        /// Number of neighbors per estimate
        #[arg(short, long, default_value = "12")]
        k: usize,

        /// Bilateral smoothing passes applied to the estimate
        #[arg(long, default_value = "0")]
        smooth: usize,

        /// Smoothing radius (default: estimated from the input)
        #[arg(long)]
        smooth_radius: Option<f64>,

        /// Normal-difference width of the smoothing filter
        #[arg(long, default_value = "0.5")]
        sigma: f64,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Args)]
struct SeedArgs {
    /// Number of points to keep
    #[arg(short = 'n', long, conflicts_with = "ratio")]
    count: Option<usize>,

    /// Fraction of points to keep (0.0 to 1.0)
    #[arg(long, default_value = "0.1")]
    ratio: f64,

    /// Sampling method
    #[arg(long, value_enum, default_value = "random")]
    method: SampleMethod,

    /// Random seed
    #[arg(long, default_value = "0")]
    rng_seed: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SampleMethod {
    /// Uniform random subset
    Random,
    /// Every n-th point
    Stride,
    /// Farthest-point sampling (evenly spread, slow on large inputs)
    Farthest,
}

impl SeedArgs {
    fn select(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let count = self
            .count
            .unwrap_or_else(|| (points.len() as f64 * self.ratio.clamp(0.0, 1.0)).round() as usize)
            .max(1);
        match self.method {
            SampleMethod::Random => random_subsample(points, count, self.rng_seed),
            SampleMethod::Stride => stride_subsample(points, count),
            SampleMethod::Farthest => farthest_point_sample(points, count),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Info { input } => cmd_info(&input)?,

        Commands::Sample { input, output, seed } => cmd_sample(&input, &output, &seed)?,

        Commands::Consolidate {
            input,
            output,
            seed_file,
            seed,
            config,
            radius,
            repulsion,
            iterations,
            no_density,
            anisotropic,
            frame_interval,
            edge_sigma,
            reference_frames,
            threshold,
            max_fault_ratio,
            normalize,
            normals,
            stats,
            sequential,
        } => {
            let mut params = match &config {
                Some(path) => RunParameters::from_json(&std::fs::read_to_string(path)?)?,
                None => RunParameters::default(),
            };
            if let Some(r) = repulsion {
                params.repulsion = r;
            }
            if let Some(n) = iterations {
                params.iterations = n;
            }
            if no_density {
                params.density_correction = false;
            }
            if anisotropic || frame_interval.is_some() || edge_sigma.is_some() || reference_frames {
                let (mut interval, mut sigma, mut source) = match params.mode {
                    Mode::Anisotropic {
                        frame_interval,
                        edge_sigma,
                        frame_source,
                    } => (frame_interval, edge_sigma, frame_source),
                    Mode::Isotropic => (None, DEFAULT_EDGE_SIGMA, FrameSource::default()),
                };
                interval = frame_interval.or(interval);
                sigma = edge_sigma.unwrap_or(sigma);
                if reference_frames {
                    source = FrameSource::Reference;
                }
                params.mode = Mode::Anisotropic {
                    frame_interval: interval,
                    edge_sigma: sigma,
                    frame_source: source,
                };
            }
            if let Some(t) = threshold {
                params.convergence_threshold = Some(t);
            }
            if let Some(r) = max_fault_ratio {
                params.max_fault_ratio = r;
            }
            if sequential {
                params.parallel = false;
            }

            let job = ConsolidateJob {
                seed_file,
                seed,
                radius,
                radius_from_config: config.is_some(),
                normalize,
                normals,
                stats,
            };
            cmd_consolidate(&input, &output, params, &job)?;
        }

        Commands::Normals {
            input,
            output,
            k,
            smooth,
            smooth_radius,
            sigma,
            sequential,
        } => {
            let smoothing = NormalSmoothing {
                iterations: smooth,
                radius: smooth_radius,
                sigma,
            };
            cmd_normals(&input, &output, k, &smoothing, sequential)?
        }
    }

    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Monotonic: only redraw when the bar advances.
        let previous = max_percent.fetch_max(percent, Ordering::Relaxed);
        if percent <= previous && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        eprint!(
            "\r[{}{}] {:3}% {}",
            "=".repeat(filled),
            " ".repeat(bar_width - filled),
            percent,
            message
        );
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let cloud = io::load(input)?;

    println!("File: {}", input.display());
    println!("Points: {}", cloud.len());
    println!("Normals: {}", if cloud.has_normals() { "yes" } else { "no" });

    if let Some(bbox) = cloud.bounding_box() {
        let (min, max) = (bbox.min, bbox.max);
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let dims = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z);
    }
    if let Some(c) = cloud.centroid() {
        println!("Centroid: ({:.3}, {:.3}, {:.3})", c.x, c.y, c.z);
    }

    println!("Suggested radius: {:.6}", suggested_radius(&cloud.positions));
    println!(
        "Mean spacing: {:.6}",
        mean_nearest_neighbor_distance(&cloud.positions, Executor::Parallel)
    );

    Ok(())
}

fn cmd_sample(input: &Path, output: &Path, seed: &SeedArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cloud = io::load(input)?;
    println!("Loaded: {} points", cloud.len());

    let picked = seed.select(&cloud.positions);
    println!("Sampled: {} points", picked.len());

    io::save(&PointCloud::new(picked), output)?;
    println!("Saved: {}", output.display());
    Ok(())
}

struct ConsolidateJob {
    seed_file: Option<PathBuf>,
    seed: SeedArgs,
    radius: Option<f64>,
    radius_from_config: bool,
    normalize: bool,
    normals: Option<usize>,
    stats: Option<PathBuf>,
}

fn cmd_consolidate(
    input: &Path,
    output: &Path,
    mut params: RunParameters,
    job: &ConsolidateJob,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reference = io::load(input)?;
    println!("Loaded: {} points", reference.len());

    let mapping = if job.normalize {
        reference.normalize()
    } else {
        Normalization::identity()
    };

    let seed = match &job.seed_file {
        Some(path) => {
            let seed = io::load(path)?;
            seed.positions.iter().map(|p| mapping.apply(p)).collect()
        }
        None => job.seed.select(&reference.positions),
    };

    // Lengths given on the command line or in the config are in input units.
    if let Some(r) = job.radius {
        params.radius = r;
    }
    params = params.scaled(mapping.scale);
    if job.radius.is_none() && !job.radius_from_config {
        params.radius = suggested_radius(&reference.positions);
    }

    let mode = if params.parallel { "parallel" } else { "sequential" };
    println!(
        "Consolidating {} points (radius={:.6}, mu={}, {} iterations, {}{})...",
        seed.len(),
        params.radius,
        params.repulsion,
        params.iterations,
        if params.mode.is_anisotropic() { "anisotropic, " } else { "" },
        mode
    );
    info!(params = %params.to_json()?, "run parameters");

    let progress = create_progress();
    let start = Instant::now();
    let result = consolidate_with_progress(&reference.positions, &seed, &params, &progress)?;
    let elapsed = start.elapsed();

    let stats = &result.stats;
    println!(
        "Result: {} iterations, {} frozen, {} faults, max displacement {:.3e}{}",
        stats.iterations,
        stats.frozen_count,
        stats.fault_count,
        stats.max_displacement,
        if stats.converged { " (converged)" } else { "" }
    );
    if let Some(path) = &job.stats {
        std::fs::write(path, serde_json::to_string_pretty(stats)?)?;
    }

    let executor = Executor::from_parallel(params.parallel);
    let cloud = match job.normals {
        Some(k) => {
            let mut normals = estimate_normals(&result.points, k, executor);
            orient_outward(&result.points, &mut normals);
            PointCloud::with_normals(restore(&mapping, &result.points), normals)
        }
        None => PointCloud::new(restore(&mapping, &result.points)),
    };

    io::save(&cloud, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}

fn restore(mapping: &Normalization, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
    points.iter().map(|p| mapping.invert(p)).collect()
}

struct NormalSmoothing {
    iterations: usize,
    radius: Option<f64>,
    sigma: f64,
}

fn cmd_normals(
    input: &Path,
    output: &Path,
    k: usize,
    smoothing: &NormalSmoothing,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cloud = io::load(input)?;
    println!("Loaded: {} points", cloud.len());

    let mode = if sequential { "sequential" } else { "parallel" };
    println!("Estimating normals (k={}, {})...", k, mode);

    let start = Instant::now();
    let executor = Executor::from_parallel(!sequential);
    let mut normals = estimate_normals(&cloud.positions, k, executor);
    if smoothing.iterations > 0 {
        let radius = smoothing
            .radius
            .unwrap_or_else(|| suggested_radius(&cloud.positions));
        println!(
            "Smoothing normals ({} passes, radius={:.6}, sigma={})...",
            smoothing.iterations, radius, smoothing.sigma
        );
        normals = smooth_normals(
            &cloud.positions,
            &normals,
            radius,
            smoothing.sigma,
            smoothing.iterations,
            executor,
        )?;
    }
    orient_outward(&cloud.positions, &mut normals);
    let elapsed = start.elapsed();

    io::save(&PointCloud::with_normals(cloud.positions, normals), output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}
