//! Run command - consume every packet of the dataset, heaviest batches first.
//!
//! Top-level batches are taken from the dataset's load-ordered queue and
//! processed on a rayon pool, one batch per task. Within a batch, leaves are
//! consumed in routing order:
//!
//! 1. start processing, then precaching (input, and ground truth with
//!    `--ground-truth`)
//! 2. read every packet, optionally interleaved with random reads
//! 3. compute a foreground mask and push it as the packet's result
//! 4. stop processing, which stops precaching and fires the final count
//!
//! Ctrl+C stops reading early; every leaf is still stopped so the final
//! counts can be reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use batchcache::batch::BatchNode;
use batchcache::config::{format_size, parse_size};
use batchcache::dataset::DatasetKind;
use batchcache::packet::{FrameGeometry, Packet};
use batchcache::prefetch::{PrefetchConfig, PrefetchStatsSnapshot};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

use super::common::{format_duration, CommandContext};
use crate::error::CliError;

/// Arguments for the run command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Number of batches processed in parallel (default: one per core)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Prefetch budget per cache, e.g. 64MB (overrides precache.buffer_size)
    #[arg(long)]
    pub buffer_size: Option<String>,

    /// Also precache and read ground-truth packets
    #[arg(long)]
    pub ground_truth: bool,

    /// Probability of an extra random read before each sequential read
    #[arg(long, value_name = "P")]
    pub random_access: Option<f64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Settings shared by every batch task.
struct RunOptions<'a> {
    prefetch: PrefetchConfig,
    random_access: f64,
    interrupted: &'a AtomicBool,
    progress: &'a ProgressBar,
}

/// Summary of one top-level batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub name: String,
    pub path: String,
    pub packets: usize,
    pub processed: usize,
    pub expected_load: f64,
    pub process_time_secs: f64,
    pub cache_hit_rate: f64,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dataset: String,
    pub kind: DatasetKind,
    pub packets: usize,
    pub processed: usize,
    pub expected_load: f64,
    pub wall_time_secs: f64,
    pub process_time_secs: f64,
    pub buffer_budget_bytes: usize,
    pub ground_truth: bool,
    pub interrupted: bool,
    pub batches: Vec<BatchReport>,
    pub cache: PrefetchStatsSnapshot,
}

fn resolve_prefetch(ctx: &CommandContext, args: &RunArgs) -> Result<PrefetchConfig, CliError> {
    let mut prefetch = ctx.config.prefetch_config();
    if let Some(size) = &args.buffer_size {
        prefetch = prefetch.with_buffer_budget(parse_size(size)?);
    }
    if args.ground_truth {
        prefetch = prefetch.with_ground_truth(true);
    }
    Ok(prefetch)
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar} {pos}/{len} ({per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Run the run command.
pub fn run(ctx: &CommandContext, args: RunArgs) -> Result<(), CliError> {
    let prefetch = resolve_prefetch(ctx, &args)?;
    let random_access = args.random_access.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&random_access) {
        return Err(CliError::Config(format!(
            "--random-access must be between 0 and 1, got {}",
            random_access
        )));
    }

    let dataset = ctx.dataset()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after the current packets...");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .thread_name(|i| format!("batch-{}", i))
        .build()
        .map_err(|e| CliError::Config(format!("Failed to build thread pool: {}", e)))?;

    info!(
        dataset = %dataset.info().name,
        packets = dataset.total_packet_count(),
        threads = pool.current_num_threads(),
        budget = %format_size(prefetch.buffer_budget_bytes),
        ground_truth = prefetch.ground_truth,
        "Starting run"
    );

    let progress = progress_bar(dataset.total_packet_count() as u64);
    let options = RunOptions {
        prefetch: prefetch.clone(),
        random_access,
        interrupted: &interrupted,
        progress: &progress,
    };

    let order: Vec<Arc<BatchNode>> = dataset.sorted_batches().collect();
    let started = Instant::now();
    let outcomes: Vec<Result<(), CliError>> = pool.install(|| {
        order
            .par_iter()
            .map(|batch| process_batch(batch, &options))
            .collect()
    });
    let wall_time = started.elapsed();
    progress.finish_and_clear();

    let mut first_error = None;
    for (batch, outcome) in order.iter().zip(outcomes) {
        if let Err(e) = outcome {
            error!(batch = %batch.name(), error = %e, "Batch failed");
            first_error.get_or_insert(e);
        }
    }

    let processed = dataset.final_processed_count()?;
    let was_interrupted = interrupted.load(Ordering::SeqCst);
    let report = RunReport {
        dataset: dataset.info().name.clone(),
        kind: dataset.info().kind,
        packets: dataset.total_packet_count(),
        processed,
        expected_load: dataset.expected_load(),
        wall_time_secs: wall_time.as_secs_f64(),
        process_time_secs: dataset.process_time().as_secs_f64(),
        buffer_budget_bytes: prefetch.buffer_budget_bytes,
        ground_truth: prefetch.ground_truth,
        interrupted: was_interrupted,
        batches: order.iter().map(|b| batch_report(b)).collect(),
        cache: dataset.cache_stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if was_interrupted {
        return Err(CliError::Interrupted);
    }
    Ok(())
}

fn process_batch(batch: &BatchNode, options: &RunOptions<'_>) -> Result<(), CliError> {
    let mut result = Ok(());
    for leaf in batch.leaves() {
        let outcome = leaf.start_processing().map_err(CliError::from).and_then(|()| {
            if result.is_ok() {
                consume_leaf(leaf, options)
            } else {
                Ok(())
            }
        });
        // Always stop, so the final count is available even after a failure.
        let stopped = leaf.stop_processing().map(|_| ()).map_err(CliError::from);
        if result.is_ok() {
            result = outcome.and(stopped);
        }
    }
    result
}

fn consume_leaf(leaf: &BatchNode, options: &RunOptions<'_>) -> Result<(), CliError> {
    let count = leaf.total_packet_count();
    leaf.start_precaching(
        options.prefetch.ground_truth,
        options.prefetch.buffer_budget_bytes,
    )?;

    let gt_count = leaf
        .as_leaf()
        .map_or(0, |l| l.ground_truth_cache().source().packet_count());
    let mut rng = rand::rng();
    for index in 0..count {
        if options.interrupted.load(Ordering::Relaxed) {
            warn!(batch = %leaf.name(), index, "Interrupted");
            break;
        }
        if options.random_access > 0.0 && rng.random_bool(options.random_access) {
            leaf.input_packet(rng.random_range(0..count))?;
        }
        let frame = leaf.input_packet(index)?;
        if options.prefetch.ground_truth && index < gt_count {
            leaf.ground_truth_packet(index)?;
        }
        leaf.push_result(index, &foreground_mask(&frame))?;
        options.progress.inc(1);
    }
    Ok(())
}

/// Binary mask of pixels brighter than mid-gray.
pub fn foreground_mask(frame: &Packet) -> Packet {
    let data = frame.data();
    let geometry = frame
        .geometry()
        .unwrap_or_else(|| FrameGeometry::new(data.len() as u32, 1, 1));
    let channels = usize::from(geometry.channels.max(1));
    let color = channels.min(3);
    let mask: Vec<u8> = data
        .chunks_exact(channels)
        .map(|pixel| {
            let sum: usize = pixel[..color].iter().map(|&v| usize::from(v)).sum();
            if sum / color > 127 {
                255
            } else {
                0
            }
        })
        .collect();
    Packet::with_geometry(mask, FrameGeometry::new(geometry.width, geometry.height, 1))
}

fn batch_report(batch: &BatchNode) -> BatchReport {
    BatchReport {
        name: batch.name().to_string(),
        path: batch.relative_path().display().to_string(),
        packets: batch.total_packet_count(),
        processed: batch.current_processed_count(),
        expected_load: batch.expected_load(),
        process_time_secs: batch.process_time().as_secs_f64(),
        cache_hit_rate: batch.cache_stats().hit_rate(),
    }
}

fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Processed {}/{} packets of {} in {}\n",
        report.processed,
        report.packets,
        report.dataset,
        format_duration(std::time::Duration::from_secs_f64(report.wall_time_secs))
    ));
    out.push_str(&format!(
        "Budget {} per cache, ground truth {}\n\n",
        format_size(report.buffer_budget_bytes),
        if report.ground_truth { "on" } else { "off" }
    ));
    out.push_str(&format!(
        "  {:<24} {:>8} {:>10} {:>8} {:>10} {:>8}\n",
        "Batch", "Packets", "Processed", "Load", "Time", "Hits"
    ));
    for batch in &report.batches {
        out.push_str(&format!(
            "  {:<24} {:>8} {:>10} {:>8.0} {:>10} {:>7.1}%\n",
            batch.path,
            batch.packets,
            batch.processed,
            batch.expected_load,
            format_duration(std::time::Duration::from_secs_f64(batch.process_time_secs)),
            batch.cache_hit_rate * 100.0
        ));
    }
    let cache = &report.cache;
    out.push_str(&format!(
        "\nCache: {} reads, {:.1}% hits ({} window, {} repeat, {} direct), {} discarded, {} skipped\n",
        cache.reads(),
        cache.hit_rate() * 100.0,
        cache.window_hits,
        cache.repeat_hits,
        cache.direct_fetches,
        cache.discarded,
        cache.skipped
    ));
    if report.interrupted {
        out.push_str("Run was interrupted before all packets were processed.\n");
    }
    out
}
