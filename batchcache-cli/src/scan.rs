//! Turn a dataset directory into a batch tree.
//!
//! Layout rules, applied recursively below the dataset root:
//!
//! ```text
//! root/
//!   baseline/            directory of directories  -> group
//!     highway/           has input/ (+ groundtruth/) -> leaf
//!       input/in000001.jpg
//!       groundtruth/gt000001.png
//!     office/            holds images directly      -> leaf
//!       000001.png
//! ```
//!
//! Top-level leaves are wrapped in a bare group of the same name so every
//! entry directly under the root is a group. Directories whose relative path
//! contains a skip token are ignored, as are directories with no images.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchcache::batch::{BatchMeta, BatchNode, LeafSpec, ResultSink};
use batchcache::dataset::DatasetInfo;
use batchcache::packet::OUT_OF_SCOPE_VALUE;
use batchcache::source::{ConstantSource, PacketSource};
use tracing::{debug, info, warn};

use crate::error::CliError;
use crate::image_source::{list_images, scaled_size, ImageSource, PixelLayout, PngSink};

/// Subdirectory holding input frames.
pub const INPUT_DIR: &str = "input";

/// Subdirectory holding ground-truth frames.
pub const GROUND_TRUTH_DIR: &str = "groundtruth";

fn scan_error(path: &Path, reason: impl ToString) -> CliError {
    CliError::Scan {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| scan_error(dir, e))? {
        let path = entry.map_err(|e| scan_error(dir, e))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn relative_name(info: &DatasetInfo, path: &Path) -> String {
    path.strip_prefix(&info.root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Build the top-level batches of the dataset at `info.root`.
pub fn scan_dataset(info: &DatasetInfo) -> Result<Vec<Arc<BatchNode>>, CliError> {
    if !info.root.is_dir() {
        return Err(scan_error(&info.root, "not a directory"));
    }
    let mut batches = Vec::new();
    for dir in subdirectories(&info.root)? {
        if let Some(node) = scan_dir(info, &dir)? {
            if node.is_group() {
                batches.push(node);
            } else {
                batches.push(BatchNode::bare_group(node));
            }
        }
    }
    info!(
        root = %info.root.display(),
        batches = batches.len(),
        "Dataset scanned"
    );
    Ok(batches)
}

/// Node for `dir`, or `None` if it is skipped or holds no images.
fn scan_dir(info: &DatasetInfo, dir: &Path) -> Result<Option<Arc<BatchNode>>, CliError> {
    let relative = relative_name(info, dir);
    if info.is_skipped(&relative) {
        debug!(batch = %relative, "Skipping batch");
        return Ok(None);
    }

    let input_dir = dir.join(INPUT_DIR);
    let (inputs, gt_dir) = if input_dir.is_dir() {
        let images = list_images(&input_dir).map_err(|e| scan_error(&input_dir, e))?;
        (images, Some(dir.join(GROUND_TRUTH_DIR)))
    } else {
        (list_images(dir).map_err(|e| scan_error(dir, e))?, None)
    };

    if !inputs.is_empty() {
        return build_leaf(info, dir, &relative, inputs, gt_dir).map(Some);
    }

    let mut children = Vec::new();
    for child in subdirectories(dir)? {
        if let Some(node) = scan_dir(info, &child)? {
            children.push(node);
        }
    }
    if children.is_empty() {
        warn!(batch = %relative, "No images found, ignoring directory");
        return Ok(None);
    }
    let meta = BatchMeta::new(dir_name(dir), info.kind)
        .with_relative_path(&relative)
        .with_grayscale(info.is_grayscale(&relative));
    Ok(Some(BatchNode::group(meta, children)))
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_leaf(
    info: &DatasetInfo,
    dir: &Path,
    relative: &str,
    inputs: Vec<PathBuf>,
    gt_dir: Option<PathBuf>,
) -> Result<Arc<BatchNode>, CliError> {
    let grayscale = info.is_grayscale(relative);
    let (width, height) = scaled_size(&inputs[0], info.scale_factor)
        .map_err(|e| scan_error(&inputs[0], e))?;
    let count = inputs.len();
    let input = ImageSource::new(
        inputs,
        width,
        height,
        PixelLayout::select(grayscale, info.four_byte_aligned),
    );

    let gt_images = match &gt_dir {
        Some(gt) if gt.is_dir() => list_images(gt).map_err(|e| scan_error(gt, e))?,
        _ => Vec::new(),
    };
    let ground_truth: Arc<dyn PacketSource> = if gt_images.is_empty() {
        Arc::new(ConstantSource::filled(count, width, height, OUT_OF_SCOPE_VALUE))
    } else {
        if gt_images.len() != count {
            warn!(
                batch = %relative,
                inputs = count,
                ground_truth = gt_images.len(),
                "Ground-truth count differs from input count"
            );
        }
        Arc::new(ImageSource::new(gt_images, width, height, PixelLayout::Gray))
    };

    let mut spec = LeafSpec::new(Arc::new(input), ground_truth);
    if info.save_results {
        let naming = info.clone();
        let sink: Arc<dyn ResultSink> = Arc::new(PngSink::new(
            info.results_dir(Path::new(relative)),
            move |index| naming.result_file_name(index),
        ));
        spec = spec.with_sink(sink);
    }

    debug!(batch = %relative, packets = count, grayscale, "Leaf batch found");
    let meta = BatchMeta::new(dir_name(dir), info.kind)
        .with_relative_path(relative)
        .with_grayscale(grayscale);
    Ok(BatchNode::leaf(meta, spec))
}
