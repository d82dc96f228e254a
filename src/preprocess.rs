use image::{GenericImageView, GrayImage, Luma, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use thiserror::Error;

/// Side length of the square grid the classifier was trained on.
pub const INPUT_SIZE: u32 = 128;

pub const ACCEPTED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

// Rec.601 luma weights in 14-bit fixed point, summing to 1 << 14.
const LUMA_SHIFT: u32 = 14;
const LUMA_WEIGHTS: [u32; 3] = [4899, 9617, 1868];

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error(
        "File type not supported ({0}). Must be one of: {allowed}",
        allowed = ACCEPTED_CONTENT_TYPES.join(", ")
    )]
    UnsupportedContentType(String),
    #[error("Invalid image file. Could not decode the image: {0}")]
    Decode(String),
}

pub struct PreparedImage {
    /// NHWC batch of one: `[1, INPUT_SIZE, INPUT_SIZE, 1]`, values in `[0, 1]`.
    pub tensor: Array4<f32>,
    pub width: u32,
    pub height: u32,
}

pub fn check_content_type(content_type: Option<&str>) -> Result<(), PreprocessError> {
    let declared = content_type.unwrap_or_default();
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else if declared.is_empty() {
        Err(PreprocessError::UnsupportedContentType("none".to_string()))
    } else {
        Err(PreprocessError::UnsupportedContentType(declared.to_string()))
    }
}

pub fn empty_input() -> Array4<f32> {
    Array4::zeros((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 1))
}

/// Decodes, converts to Rec.601 luma, samples the `INPUT_SIZE` square grid
/// with half-pixel bilinear interpolation and scales pixels to `[0, 1]`.
pub fn prepare_image(image_data: &[u8]) -> Result<PreparedImage, PreprocessError> {
    let image_reader = image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let (width, height) = original_img.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::Decode("image has no pixels".to_string()));
    }
    let gray = luma(&original_img.to_rgb8());
    drop(original_img);

    let columns = taps(width, INPUT_SIZE);
    let rows = taps(height, INPUT_SIZE);

    let mut tensor = empty_input();
    for (y, row) in rows.iter().enumerate() {
        for (x, column) in columns.iter().enumerate() {
            let sample = |sy: u32, sx: u32| gray.get_pixel(sx, sy).0[0] as f32;
            let top = column.blend(sample(row.lo, column.lo), sample(row.lo, column.hi));
            let bottom = column.blend(sample(row.hi, column.lo), sample(row.hi, column.hi));
            let value = row.blend(top, bottom).round().clamp(0., 255.);
            tensor[[0, y, x, 0]] = value / 255.;
        }
    }

    Ok(PreparedImage {
        tensor,
        width,
        height,
    })
}

fn luma(rgb: &RgbImage) -> GrayImage {
    let round = 1 << (LUMA_SHIFT - 1);
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let weighted: u32 = rgb
            .get_pixel(x, y)
            .0
            .iter()
            .zip(LUMA_WEIGHTS)
            .map(|(channel, weight)| *channel as u32 * weight)
            .sum();
        Luma([((weighted + round) >> LUMA_SHIFT) as u8])
    })
}

/// Two source indices along one axis and the weight of the second.
struct Tap {
    lo: u32,
    hi: u32,
    weight: f32,
}

impl Tap {
    fn blend(&self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.weight
    }
}

/// Pixel centres map as `src = (dst + 0.5) * scale - 0.5`, clamped to the
/// source edge. No antialiasing on downscale.
fn taps(src_len: u32, dst_len: u32) -> Vec<Tap> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len.saturating_sub(1);

    (0..dst_len)
        .map(|d| {
            let position = (d as f64 + 0.5) * scale - 0.5;
            let floor = position.floor();
            let (lo, weight) = if floor < 0. {
                (0, 0.)
            } else if floor as u32 >= last {
                (last, 0.)
            } else {
                (floor as u32, (position - floor) as f32)
            };
            Tap {
                lo,
                hi: (lo + 1).min(last),
                weight,
            }
        })
        .collect()
}
