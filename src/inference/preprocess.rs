//! Image to input tensor conversion.

use crate::config::TensorLayout;
use image::DynamicImage;
use image::imageops::FilterType;

/// Resize to `width x height`, scale to `[0, 1]` and lay out as a flat
/// batch-of-one tensor buffer.
pub fn image_to_tensor(
    image: &DynamicImage,
    width: u32,
    height: u32,
    layout: TensorLayout,
) -> Vec<f32> {
    let rgb = image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();
    let plane = (width * height) as usize;
    let mut data = vec![0.0_f32; plane * 3];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for (c, value) in pixel.0.iter().enumerate() {
            let index = match layout {
                TensorLayout::Nchw => c * plane + offset,
                TensorLayout::Nhwc => offset * 3 + c,
            };
            data[index] = f32::from(*value) / 255.0;
        }
    }

    data
}

/// Tensor shape for the configured layout.
pub const fn input_shape(width: u32, height: u32, layout: TensorLayout) -> [usize; 4] {
    match layout {
        TensorLayout::Nchw => [1, 3, height as usize, width as usize],
        TensorLayout::Nhwc => [1, height as usize, width as usize, 3],
    }
}

/// Input size and layout a model actually takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGeometry {
    /// Input width in pixels.
    pub width: u32,
    /// Input height in pixels.
    pub height: u32,
    /// Tensor layout.
    pub layout: TensorLayout,
}

/// Reconcile the dimensions a model declares for its image input with the
/// configured geometry.
///
/// Concrete dimensions win over the configuration; dynamic ones (`-1` or `0`)
/// keep the configured value. The layout follows whichever axis has 3
/// channels, falling back to the configured layout when that is ambiguous.
pub fn resolve_input_geometry(
    dims: &[i64],
    configured: InputGeometry,
) -> std::result::Result<InputGeometry, String> {
    let [_, d1, d2, d3] = *dims else {
        return Err(format!("expected a 4-D image input, model declares {dims:?}"));
    };

    let layout = match (d1 == 3, d3 == 3) {
        (true, false) => TensorLayout::Nchw,
        (false, true) => TensorLayout::Nhwc,
        (true, true) => configured.layout,
        (false, false) if d1 > 0 && d3 > 0 => {
            return Err(format!("model input {dims:?} has no 3-channel axis"));
        }
        (false, false) => configured.layout,
    };

    let (h, w) = match layout {
        TensorLayout::Nchw => (d2, d3),
        TensorLayout::Nhwc => (d1, d2),
    };
    let pick = |dim: i64, fallback: u32| -> std::result::Result<u32, String> {
        if dim <= 0 {
            return Ok(fallback);
        }
        u32::try_from(dim).map_err(|_| format!("model input dimension {dim} is too large"))
    };

    Ok(InputGeometry {
        width: pick(w, configured.width)?,
        height: pick(h, configured.height)?,
        layout,
    })
}
