//! Loading anomaly score maps and ground-truth masks from image files.
//!
//! Both are read as single-channel images and normalized to `[0, 1]`. The
//! returned tensors are `[1, 1, height, width]` so they can be concatenated
//! along the batch dimension.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use thiserror::Error;

use crate::components::FOREGROUND_THRESHOLD;

/// File extensions accepted for score maps and masks.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{path}': {source}")]
    ImageLoadError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported image extension for '{path}' (supported: {supported})")]
    UnsupportedExtension { path: String, supported: String },
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Whether `path` has one of [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}

/// Loads a grayscale image as a `[1, 1, height, width]` tensor in `[0, 1]`.
pub fn load_score_map<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> ImageResult<Tensor<B, 4>> {
    let path = path.as_ref();
    if !is_supported_image(path) {
        return Err(ImageError::UnsupportedExtension {
            path: path.display().to_string(),
            supported: SUPPORTED_EXTENSIONS.join(", "),
        });
    }

    let img = image::open(path).map_err(|source| ImageError::ImageLoadError {
        path: path.display().to_string(),
        source,
    })?;

    let luma = img.into_luma16();
    let (width, height) = luma.dimensions();
    let values: Vec<f32> = luma
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / f32::from(u16::MAX))
        .collect();

    let data = TensorData::new(values, [1, 1, height as usize, width as usize]);
    Ok(Tensor::from_data(data, device))
}

/// Loads a ground-truth mask and binarizes it to `{0, 1}`.
pub fn load_mask<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> ImageResult<Tensor<B, 4>> {
    let gray = load_score_map::<B, _>(path, device)?;
    Ok(gray.greater_elem(FOREGROUND_THRESHOLD).float())
}

/// All-background mask for samples without annotated anomalies.
pub fn empty_mask<B: Backend>(height: usize, width: usize, device: &B::Device) -> Tensor<B, 4> {
    Tensor::zeros([1, 1, height, width], device)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use image::{GrayImage, Luma};
    use rstest::*;

    use super::*;

    type TestBackend = NdArray;

    fn write_gray(dir: &Path, name: &str, pixels: &[u8], width: u32) -> PathBuf {
        let height = pixels.len() as u32 / width;
        let img = GrayImage::from_fn(width, height, |x, y| {
            Luma([pixels[(y * width + x) as usize]])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[rstest]
    #[case("map.png", true)]
    #[case("map.PNG", true)]
    #[case("map.tiff", true)]
    #[case("map.npy", false)]
    #[case("map", false)]
    fn supported_extensions(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_supported_image(Path::new(name)), expected);
    }

    #[test]
    fn score_map_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray(dir.path(), "scores.png", &[0, 51, 255, 102, 204, 0], 3);
        let device = Default::default();

        let map = load_score_map::<TestBackend, _>(&path, &device).unwrap();

        assert_eq!(map.dims(), [1, 1, 2, 3]);
        let values = map.into_data().to_vec::<f32>().unwrap();
        let expected = [0.0, 0.2, 1.0, 0.4, 0.8, 0.0];
        for (actual, expected) in values.iter().zip(expected) {
            assert_relative_eq!(*actual, expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn mask_is_binarized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray(dir.path(), "mask.png", &[0, 100, 200, 255], 2);
        let device = Default::default();

        let mask = load_mask::<TestBackend, _>(&path, &device).unwrap();

        let values = mask.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn missing_file_reports_path() {
        let device = Default::default();
        let err = load_score_map::<TestBackend, _>("does/not/exist.png", &device).unwrap_err();

        assert!(err.to_string().contains("does/not/exist.png"));
    }
}
