//! Input resolution: read a photo from a local path or an HTTP(S) URL.
//!
//! Whatever the source, the bytes are sniffed before being returned so a
//! mistyped path or an HTML error page fails here with a clear message
//! instead of later inside the uploader.

use crate::error::ColoringError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A photo read into memory, with the name it should be shown under.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read the input into memory, downloading it if it is a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, ColoringError> {
    let loaded = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    if image::guess_format(&loaded.bytes).is_err() {
        return Err(ColoringError::DecodeFailure {
            name: loaded.name,
            detail: "not a recognised image format".to_string(),
        });
    }
    Ok(loaded)
}

async fn read_local(path_str: &str) -> Result<LoadedInput, ColoringError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ColoringError::InvalidInput {
            input: path_str.to_string(),
        })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(LoadedInput {
        name: file_name(&path),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, ColoringError> {
    info!("Downloading photo from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ColoringError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| ColoringError::DownloadFailed {
        url: url.to_string(),
        reason: if e.is_timeout() {
            format!("timed out after {timeout_secs}s")
        } else {
            e.to_string()
        },
    })?;

    if !response.status().is_success() {
        return Err(ColoringError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ColoringError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(LoadedInput {
        name: extract_filename(url),
        bytes: bytes.to_vec(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-photo".to_string()
}
