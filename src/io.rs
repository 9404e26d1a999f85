//! PNG input/output for heightmaps and region-label masks.

use std::path::Path;

use image::{ColorType, DynamicImage, ImageBuffer, Luma};

use crate::amplify::LabelMap;
use crate::dictionary::AmplifyError;
use crate::matrix::DenseMatrix;

/// Read a grayscale heightmap PNG into a matrix.
pub fn read_heightmap(path: &Path) -> Result<DenseMatrix, AmplifyError> {
    let img = image::open(path)?;
    Ok(image_to_matrix(&img))
}

/// Read a region-label PNG; each 8-bit sample is a dictionary label.
pub fn read_labels(path: &Path) -> Result<LabelMap, AmplifyError> {
    let img = image::open(path)?;
    Ok(image_to_labels(&img))
}

/// Convert a grayscale image to a matrix, raw sample / 255. Samples keep
/// their stored width, so 8-bit inputs land in `[0, 1]` and 16-bit inputs
/// in `[0, 257]`.
pub fn image_to_matrix(img: &DynamicImage) -> DenseMatrix {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let wide = matches!(
        img.color(),
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16
    );
    let data = if wide {
        img.to_luma16()
            .pixels()
            .map(|pixel| pixel.0[0] as f32 / 255.0)
            .collect()
    } else {
        img.to_luma8()
            .pixels()
            .map(|pixel| pixel.0[0] as f32 / 255.0)
            .collect()
    };
    DenseMatrix::from_vec(height, width, data)
}

/// Convert a label image to its raw 8-bit samples.
pub fn image_to_labels(img: &DynamicImage) -> LabelMap {
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();
    LabelMap::from_vec(height as usize, width as usize, gray.into_raw())
}

/// Write a canvas as 16-bit grayscale PNG: crop `margin` cells per side,
/// then linearly rescale `[min, max]` to `[0, 65535]`.
pub fn write_heightmap(
    canvas: &DenseMatrix,
    path: &Path,
    columns: usize,
    rows: usize,
    margin: usize,
    min: f32,
    max: f32,
) -> Result<(), AmplifyError> {
    let scale = 65535.0 / (max - min);
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(columns as u32, rows as u32, |x, y| {
        let value = canvas.get(y as usize + margin, x as usize + margin);
        // Truncating cast, not rounding.
        let scaled = ((value - min) * scale).clamp(0.0, 65535.0);
        Luma([scaled as u16])
    });
    img.save(path)?;
    Ok(())
}

/// Box-filter downscale by an integer factor, averaging each
/// `factor x factor` block.
pub fn downscale(image: &DenseMatrix, factor: usize) -> DenseMatrix {
    let scaled_rows = image.rows() / factor;
    let scaled_columns = image.columns() / factor;
    let area = (factor * factor) as f32;
    let mut output = DenseMatrix::new(scaled_rows, scaled_columns);
    for row in 0..scaled_rows {
        for column in 0..scaled_columns {
            let mut sum = 0.0f32;
            for r in row * factor..(row + 1) * factor {
                for c in column * factor..(column + 1) * factor {
                    sum += image.get(r, c);
                }
            }
            output.set(row, column, sum / area);
        }
    }
    output
}
