//! Dataset metadata and the root of the batch tree.
//!
//! [`DatasetInfo`] describes where a dataset lives and how its batches are
//! treated (skipped, grayscale, scaled). [`Dataset`] pairs that metadata
//! with the root group of the tree built from it and exposes dataset-wide
//! totals and scheduling.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::batch::{BatchError, BatchMeta, BatchNode, BatchOrder, BatchQueue, Route};
use crate::prefetch::{PrefetchConfig, PrefetchStatsSnapshot};

/// Kind of dataset, which decides what a packet and a result mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[default]
    VideoSegmentation,
    VideoRegistration,
    ImageSegmentation,
    ImageEdgeDetection,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::VideoSegmentation => "video_segmentation",
            DatasetKind::VideoRegistration => "video_registration",
            DatasetKind::ImageSegmentation => "image_segmentation",
            DatasetKind::ImageEdgeDetection => "image_edge_detection",
        }
    }

    /// Whether packets are frames of a sequence rather than independent images.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            DatasetKind::VideoSegmentation | DatasetKind::VideoRegistration
        )
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unrecognized dataset kind name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown dataset kind '{0}'")]
pub struct UnknownDatasetKind(pub String);

impl FromStr for DatasetKind {
    type Err = UnknownDatasetKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "video_segmentation" | "videosegm" => Ok(DatasetKind::VideoSegmentation),
            "video_registration" | "videoregistr" => Ok(DatasetKind::VideoRegistration),
            "image_segmentation" | "imagesegm" => Ok(DatasetKind::ImageSegmentation),
            "image_edge_detection" | "imageedgdet" => Ok(DatasetKind::ImageEdgeDetection),
            _ => Err(UnknownDatasetKind(s.to_string())),
        }
    }
}

/// Static description of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub kind: DatasetKind,
    /// Directory holding the batches.
    pub root: PathBuf,
    /// Directory results are written under.
    pub results_root: PathBuf,
    pub results_prefix: String,
    pub results_suffix: String,
    /// Batches whose name contains one of these tokens are left out.
    pub skip_tokens: Vec<String>,
    /// Batches whose name contains one of these tokens are grayscale.
    pub grayscale_tokens: Vec<String>,
    /// Added to a packet index when naming its result.
    pub output_index_offset: usize,
    /// Packets are resized by this factor when loaded.
    pub scale_factor: f64,
    pub save_results: bool,
    /// Color packets are padded to four channels.
    pub four_byte_aligned: bool,
}

impl Default for DatasetInfo {
    fn default() -> Self {
        Self {
            name: "dataset".to_string(),
            kind: DatasetKind::default(),
            root: PathBuf::from("."),
            results_root: PathBuf::from("results"),
            results_prefix: "bin".to_string(),
            results_suffix: ".png".to_string(),
            skip_tokens: Vec::new(),
            grayscale_tokens: Vec::new(),
            output_index_offset: 0,
            scale_factor: 1.0,
            save_results: false,
            four_byte_aligned: false,
        }
    }
}

impl DatasetInfo {
    pub fn new(name: impl Into<String>, kind: DatasetKind, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_skip_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_grayscale_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grayscale_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scale_factor(mut self, factor: f64) -> Self {
        self.scale_factor = factor;
        self
    }

    /// Whether a batch called `name` should be left out.
    pub fn is_skipped(&self, name: &str) -> bool {
        contains_token(name, &self.skip_tokens)
    }

    /// Whether a batch called `name` holds single-channel packets.
    pub fn is_grayscale(&self, name: &str) -> bool {
        contains_token(name, &self.grayscale_tokens)
    }

    /// File name of the result for packet `index`, e.g. `bin000012.png`.
    pub fn result_file_name(&self, index: usize) -> String {
        format!(
            "{}{:06}{}",
            self.results_prefix,
            index + self.output_index_offset,
            self.results_suffix
        )
    }

    /// Result directory of the batch at `relative_path`.
    pub fn results_dir(&self, relative_path: &std::path::Path) -> PathBuf {
        self.results_root.join(relative_path)
    }
}

fn contains_token(name: &str, tokens: &[String]) -> bool {
    tokens
        .iter()
        .any(|token| !token.is_empty() && name.contains(token.as_str()))
}

/// A dataset: its metadata plus the root group of its batch tree.
#[derive(Debug)]
pub struct Dataset {
    info: Arc<DatasetInfo>,
    root: Arc<BatchNode>,
}

impl Dataset {
    /// Build the dataset root over top-level `batches`.
    pub fn new(info: DatasetInfo, batches: Vec<Arc<BatchNode>>) -> Self {
        let meta = BatchMeta::new(info.name.clone(), info.kind).with_relative_path("");
        let root = BatchNode::group(meta, batches);
        info!(
            dataset = %info.name,
            kind = %info.kind,
            batches = root.children().len(),
            packets = root.total_packet_count(),
            "Dataset ready"
        );
        Self {
            info: Arc::new(info),
            root,
        }
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn root(&self) -> &Arc<BatchNode> {
        &self.root
    }

    /// Top-level batches in name order.
    pub fn batches(&self) -> &[Arc<BatchNode>] {
        self.root.children()
    }

    /// Top-level batches as a queue that pops the heaviest first.
    pub fn sorted_batches(&self) -> BatchQueue {
        BatchQueue::from_batches(BatchOrder::Load, self.batches().iter().cloned())
    }

    pub fn total_packet_count(&self) -> usize {
        self.root.total_packet_count()
    }

    pub fn expected_load(&self) -> f64 {
        self.root.expected_load()
    }

    pub fn current_processed_count(&self) -> usize {
        self.root.current_processed_count()
    }

    /// Blocks until every leaf has stopped processing.
    pub fn final_processed_count(&self) -> Result<usize, BatchError> {
        self.root.final_processed_count()
    }

    pub fn process_time(&self) -> Duration {
        self.root.process_time()
    }

    pub fn resolve(&self, index: usize) -> Result<Route<'_>, BatchError> {
        self.root.resolve(index)
    }

    /// Start precaching every leaf with the settings in `config`.
    pub fn start_precaching(&self, config: &PrefetchConfig) -> Result<(), BatchError> {
        self.root
            .start_precaching(config.ground_truth, config.buffer_budget_bytes)
    }

    pub fn stop_precaching(&self) {
        self.root.stop_precaching();
    }

    pub fn cache_stats(&self) -> PrefetchStatsSnapshot {
        self.root.cache_stats()
    }
}
