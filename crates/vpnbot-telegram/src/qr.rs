//! QR code rendering for key files and subscription links.

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

use vpnbot_core::{errors::Error, Result};

const MIN_SIDE_PX: u32 = 256;

/// Encode `content` as a PNG QR image (high error correction, at least
/// 256x256).
pub fn render_png(content: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::H)
        .map_err(|e| Error::External(format!("qr encode failed: {e}")))?;

    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_SIDE_PX, MIN_SIDE_PX)
        .build();

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Error::External(format!("qr png encode failed: {e}")))?;
    Ok(out.into_inner())
}
