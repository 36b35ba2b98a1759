use base64::{engine::general_purpose, Engine as _};
use color_eyre::{eyre::eyre, Result};
use std::path::Path;

/// Largest timesheet image accepted for upload.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Image MIME type inferred from the file extension.
pub fn mime_type(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  match ext.as_str() {
    "png" => Some("image/png"),
    "jpg" | "jpeg" => Some("image/jpeg"),
    "gif" => Some("image/gif"),
    "webp" => Some("image/webp"),
    "bmp" => Some("image/bmp"),
    "tif" | "tiff" => Some("image/tiff"),
    _ => None,
  }
}

/// Read an image and encode it as a `data:` URL for the OCR endpoint.
pub fn encode_data_url(path: &Path) -> Result<String> {
  let mime = mime_type(path)
    .ok_or_else(|| eyre!("Please select an image file: {}", path.display()))?;

  let size = std::fs::metadata(path)
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?
    .len();
  if size > MAX_IMAGE_BYTES {
    return Err(eyre!("Image size must be less than 10MB ({} bytes)", size));
  }

  let bytes =
    std::fs::read(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;

  Ok(format!(
    "data:{};base64,{}",
    mime,
    general_purpose::STANDARD.encode(bytes)
  ))
}
