use base64::{engine::general_purpose::STANDARD, Engine};
use mime::Mime;
use thiserror::Error;

/// Bytes encoded per progress step. A multiple of 3 so chunk encodings concatenate without padding.
const CHUNK_BYTES: usize = 3 * 16 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("no file was selected")]
    Empty,
    #[error("`{0}` is not an image")]
    NotAnImage(String),
    #[error("image is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Turns an image file into an embeddable `data:` URL.
///
/// `on_progress` receives percentages in increasing order and always ends with 100.
pub fn encode_data_url(
    content_type: &str,
    bytes: &[u8],
    max_bytes: usize,
    mut on_progress: impl FnMut(u8),
) -> Result<String, UploadError> {
    let mime: Mime = content_type
        .parse()
        .map_err(|_| UploadError::NotAnImage(content_type.to_string()))?;
    if mime.type_() != mime::IMAGE {
        return Err(UploadError::NotAnImage(mime.essence_str().to_string()));
    }
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let prefix = format!("data:{};base64,", mime.essence_str());
    let mut url = String::with_capacity(prefix.len() + bytes.len().div_ceil(3) * 4);
    url.push_str(&prefix);

    let total = bytes.len();
    let mut done = 0;
    for chunk in bytes.chunks(CHUNK_BYTES) {
        STANDARD.encode_string(chunk, &mut url);
        done += chunk.len();
        on_progress(((done * 100) / total) as u8);
    }

    Ok(url)
}
