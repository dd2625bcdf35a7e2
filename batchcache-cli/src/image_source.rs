//! Image-backed packet sources and result sinks.
//!
//! Each packet is one image file decoded with the `image` crate, converted
//! to the batch's channel layout and resized (nearest neighbour) to a
//! common frame size: the first frame's size times the scale factor.

use std::fs;
use std::path::{Path, PathBuf};

use batchcache::batch::{ResultSink, SinkError};
use batchcache::packet::{FrameGeometry, Packet};
use batchcache::source::{FetchError, PacketSource};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType};
use tracing::{debug, trace};

/// File extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "ppm", "pgm"];

/// Channel layout packets are converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray,
    Rgb,
    /// RGB padded to four bytes per pixel.
    Rgba,
}

impl PixelLayout {
    pub fn channels(&self) -> u8 {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }

    /// Layout for a batch with the given flags.
    pub fn select(grayscale: bool, four_byte_aligned: bool) -> Self {
        if grayscale {
            PixelLayout::Gray
        } else if four_byte_aligned {
            PixelLayout::Rgba
        } else {
            PixelLayout::Rgb
        }
    }
}

/// Whether `path` has an image extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Frame size after scaling the first image of a sequence.
pub fn scaled_size(first: &Path, scale: f64) -> image::ImageResult<(u32, u32)> {
    let (width, height) = image::image_dimensions(first)?;
    let scale_dim = |d: u32| ((d as f64 * scale).round() as u32).max(1);
    Ok((scale_dim(width), scale_dim(height)))
}

/// One image file per packet.
#[derive(Debug)]
pub struct ImageSource {
    paths: Vec<PathBuf>,
    geometry: FrameGeometry,
    layout: PixelLayout,
}

impl ImageSource {
    /// Images in `paths`, converted to `layout` and resized to `width`×`height`.
    pub fn new(paths: Vec<PathBuf>, width: u32, height: u32, layout: PixelLayout) -> Self {
        let geometry = FrameGeometry::new(width, height, layout.channels());
        debug!(
            images = paths.len(),
            width,
            height,
            channels = layout.channels(),
            "Image source ready"
        );
        Self {
            paths,
            geometry,
            layout,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn convert(&self, image: DynamicImage) -> Vec<u8> {
        let FrameGeometry { width, height, .. } = self.geometry;
        let image = if image.width() != width || image.height() != height {
            image.resize_exact(width, height, FilterType::Nearest)
        } else {
            image
        };
        match self.layout {
            PixelLayout::Gray => image.to_luma8().into_raw(),
            PixelLayout::Rgb => image.to_rgb8().into_raw(),
            PixelLayout::Rgba => image.to_rgba8().into_raw(),
        }
    }
}

impl PacketSource for ImageSource {
    fn packet_count(&self) -> usize {
        self.paths.len()
    }

    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError> {
        let path = self.paths.get(index).ok_or(FetchError::OutOfRange {
            index,
            count: self.paths.len(),
        })?;
        trace!(index, path = %path.display(), "Decoding image");
        let image = image::open(path).map_err(|e| FetchError::Io {
            index,
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Packet::with_geometry(self.convert(image), self.geometry))
    }
}

/// Writes each result as a PNG into one directory.
pub struct PngSink {
    dir: PathBuf,
    name_for: Box<dyn Fn(usize) -> String + Send + Sync>,
}

impl PngSink {
    /// Write into `dir`, naming each file with `name_for(index)`.
    pub fn new(dir: PathBuf, name_for: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        Self {
            dir,
            name_for: Box::new(name_for),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for PngSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PngSink").field("dir", &self.dir).finish()
    }
}

impl ResultSink for PngSink {
    fn push_result(&self, batch: &str, index: usize, result: &Packet) -> Result<(), SinkError> {
        let geometry = result
            .geometry()
            .ok_or_else(|| SinkError(format!("result {} of '{}' has no geometry", index, batch)))?;
        let color = match geometry.channels {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            4 => ExtendedColorType::Rgba8,
            n => return Err(SinkError(format!("cannot save {}-channel result", n))),
        };
        fs::create_dir_all(&self.dir).map_err(|e| SinkError(e.to_string()))?;
        let path = self.dir.join((self.name_for)(index));
        image::save_buffer(
            &path,
            result.data(),
            geometry.width,
            geometry.height,
            color,
        )
        .map_err(|e| SinkError(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_rgb(path: &Path, width: u32, height: u32, value: u8) {
        RgbImage::from_pixel(width, height, Rgb([value, value / 2, 255 - value]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_list_images_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write_rgb(&dir.path().join("in000002.png"), 4, 4, 1);
        write_rgb(&dir.path().join("in000001.png"), 4, 4, 1);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["in000001.png", "in000002.png"]);
    }

    #[test]
    fn test_decode_and_resize() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        write_rgb(&first, 8, 6, 100);
        write_rgb(&second, 16, 12, 40);

        let (width, height) = scaled_size(&first, 0.5).unwrap();
        assert_eq!((width, height), (4, 3));

        let source = ImageSource::new(vec![first, second], width, height, PixelLayout::Rgb);
        let packet = source.fetch_packet(1).unwrap();
        assert_eq!(packet.byte_len(), 4 * 3 * 3);
        assert_eq!(&packet.data()[..3], &[40, 20, 215]);
        assert!(source.fetch_packet(2).is_err());
    }

    #[test]
    fn test_layouts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_rgb(&path, 2, 2, 10);

        let gray = ImageSource::new(vec![path.clone()], 2, 2, PixelLayout::Gray);
        assert_eq!(gray.fetch_packet(0).unwrap().byte_len(), 4);
        let rgba = ImageSource::new(vec![path], 2, 2, PixelLayout::Rgba);
        let packet = rgba.fetch_packet(0).unwrap();
        assert_eq!(packet.byte_len(), 16);
        assert_eq!(packet.data()[3], 255);
        assert_eq!(PixelLayout::select(false, true), PixelLayout::Rgba);
        assert_eq!(PixelLayout::select(true, true), PixelLayout::Gray);
    }

    #[test]
    fn test_unreadable_image_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not a png").unwrap();

        let source = ImageSource::new(vec![path], 2, 2, PixelLayout::Gray);
        assert!(matches!(
            source.fetch_packet(0),
            Err(FetchError::Io { index: 0, .. })
        ));
    }

    #[test]
    fn test_png_sink_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let sink = PngSink::new(dir.path().join("out"), |i| format!("bin{:06}.png", i));
        let mask = Packet::with_geometry(vec![0u8, 255, 255, 0], FrameGeometry::new(2, 2, 1));

        sink.push_result("highway", 7, &mask).unwrap();
        let saved = image::open(sink.dir().join("bin000007.png")).unwrap().to_luma8();
        assert_eq!(saved, GrayImage::from_raw(2, 2, vec![0, 255, 255, 0]).unwrap());
        assert_eq!(*saved.get_pixel(1, 0), Luma([255]));

        assert!(sink.push_result("highway", 8, &Packet::new(vec![1u8])).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn test_scaled_size_never_zero(
                width in 1u32..64,
                height in 1u32..64,
                scale in 0.01f64..4.0,
            ) {
                let dir = TempDir::new().unwrap();
                let path = dir.path().join("frame.png");
                write_rgb(&path, width, height, 7);

                let (w, h) = scaled_size(&path, scale).unwrap();
                prop_assert!(w >= 1 && h >= 1);
                prop_assert_eq!(w, ((width as f64 * scale).round() as u32).max(1));
                prop_assert_eq!(h, ((height as f64 * scale).round() as u32).max(1));

                let source = ImageSource::new(vec![path], w, h, PixelLayout::Rgb);
                let packet = source.fetch_packet(0).unwrap();
                prop_assert_eq!(packet.byte_len(), (w * h * 3) as usize);
            }

            #[test]
            fn test_layout_selection(grayscale: bool, aligned: bool) {
                let layout = PixelLayout::select(grayscale, aligned);
                let expected = match (grayscale, aligned) {
                    (true, _) => 1,
                    (false, true) => 4,
                    (false, false) => 3,
                };
                prop_assert_eq!(layout.channels(), expected);
            }
        }
    }
}
