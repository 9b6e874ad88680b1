//! Fog raster <-> transferable PNG data URL.

use base64::Engine as _;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use tabletop_shared::EncodedMask;
use tabletop_shared::mapset::MapDimensions;

use super::raster::FogRaster;
use crate::error::{EngineError, Result};

/// Raw 8-bit grayscale PNG bytes of the raster.
pub fn to_png(raster: &FogRaster) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png)
        .write_image(
            raster.alpha(),
            raster.width(),
            raster.height(),
            ExtendedColorType::L8,
        )
        .map_err(|e| EngineError::MaskEncode(e.to_string()))?;
    Ok(png)
}

/// Encode as an 8-bit grayscale PNG data URL. Lossless.
pub fn encode(raster: &FogRaster) -> Result<EncodedMask> {
    let b64 = base64::engine::general_purpose::STANDARD.encode(to_png(raster)?);
    Ok(EncodedMask(format!("{}{b64}", EncodedMask::DATA_URL_PREFIX)))
}

/// Decode a mask for a map of size `expected`.
///
/// Grayscale images carry the fog alpha as their value. Images with an alpha
/// channel (a browser canvas export) use that channel instead.
pub fn decode(mask: &EncodedMask, expected: MapDimensions) -> Result<FogRaster> {
    let png = base64::engine::general_purpose::STANDARD
        .decode(mask.payload().trim())
        .map_err(|e| EngineError::MaskDecode(format!("base64: {e}")))?;
    let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .map_err(|e| EngineError::MaskDecode(e.to_string()))?;

    if image.width() != expected.width || image.height() != expected.height {
        return Err(EngineError::MaskDimensions {
            width: expected.width,
            height: expected.height,
            actual_width: image.width(),
            actual_height: image.height(),
        });
    }

    let alpha = if image.color().has_alpha() {
        image.to_rgba8().pixels().map(|px| px.0[3]).collect()
    } else {
        image.to_luma8().into_raw()
    };
    FogRaster::from_alpha(expected, alpha)
}
