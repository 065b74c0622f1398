//! Media resolution: remote URLs, embedded base64, and local paths all
//! become validated local [`Asset`]s with a content fingerprint.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vcomp_models::{Asset, MediaKind, SourceSpec};

use crate::error::{MediaError, MediaResult};

/// Resolves declared media sources into local assets.
///
/// Remote transfers are streamed with the running byte count checked
/// against the configured ceiling, so a source with a falsified or absent
/// size header is still stopped mid-transfer.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    client: reqwest::Client,
    media_dir: PathBuf,
    max_file_size: u64,
}

impl MediaResolver {
    pub fn new(media_dir: impl AsRef<Path>, max_file_size: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            media_dir: media_dir.as_ref().to_path_buf(),
            max_file_size,
        }
    }

    /// Resolve a source into a local asset of the expected kind.
    pub async fn resolve(&self, spec: &SourceSpec, kind: MediaKind) -> MediaResult<Asset> {
        let path = match spec {
            SourceSpec::RemoteUrl(url) => self.fetch_remote(url, kind).await?,
            SourceSpec::EmbeddedBase64(data) => self.decode_embedded(data, kind).await?,
            SourceSpec::LocalPath(path) => self.validate_local(path, kind).await?,
        };

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        if size_bytes == 0 {
            return Err(MediaError::unsupported(format!(
                "media file is empty: {}",
                path.display()
            )));
        }

        let fingerprint = fingerprint_file(&path).await?;
        debug!(
            path = %path.display(),
            fingerprint = %fingerprint,
            size_bytes,
            "Resolved media asset"
        );

        Ok(Asset::new(path, fingerprint, kind, size_bytes))
    }

    /// Download a remote file, enforcing the size ceiling during transfer.
    async fn fetch_remote(&self, url: &str, kind: MediaKind) -> MediaResult<PathBuf> {
        let parsed = url::Url::parse(url)
            .map_err(|e| MediaError::download_failed(format!("invalid URL {url}: {e}")))?;

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| MediaError::download_failed(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| MediaError::download_failed(format!("{url} returned error: {e}")))?;

        // Size probe: a declared length over the ceiling is rejected before
        // any bytes are transferred.
        if let Some(declared) = response.content_length() {
            if declared > self.max_file_size {
                return Err(MediaError::too_large(format!(
                    "remote file declares {declared} bytes, limit is {}",
                    self.max_file_size
                )));
            }
        }

        let extension = remote_extension(&parsed, &response, kind);
        let path = self.allocate_path(&extension);
        tokio::fs::create_dir_all(&self.media_dir).await?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut downloaded: u64 = 0;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    remove_partial(&path).await;
                    return Err(MediaError::download_failed(format!(
                        "transfer from {url} interrupted: {e}"
                    )));
                }
            };

            downloaded += chunk.len() as u64;
            if downloaded > self.max_file_size {
                drop(file);
                remove_partial(&path).await;
                return Err(MediaError::too_large(format!(
                    "remote file exceeded {} bytes mid-transfer",
                    self.max_file_size
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        // A completed transfer can still be rejected; never leave the file
        // behind in the media directory when it is.
        if downloaded == 0 {
            remove_partial(&path).await;
            return Err(MediaError::unsupported(format!(
                "remote file is empty: {url}"
            )));
        }
        if let Err(e) = self.check_extension(&path, kind) {
            remove_partial(&path).await;
            return Err(e);
        }

        info!(url = %url, path = %path.display(), size_bytes = downloaded, "Downloaded remote media");
        Ok(path)
    }

    /// Decode embedded base64 data, stripping any `data:` metadata prefix.
    async fn decode_embedded(&self, data: &str, kind: MediaKind) -> MediaResult<PathBuf> {
        let encoded = if data.starts_with("data:") {
            data.split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| {
                    MediaError::invalid_encoding("data URI is missing its payload separator")
                })?
        } else {
            data
        };

        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| MediaError::invalid_encoding(format!("base64 decode failed: {e}")))?;

        if bytes.is_empty() {
            return Err(MediaError::invalid_encoding("embedded payload is empty"));
        }
        if bytes.len() as u64 > self.max_file_size {
            return Err(MediaError::too_large(format!(
                "embedded payload is {} bytes, limit is {}",
                bytes.len(),
                self.max_file_size
            )));
        }

        let path = self.allocate_path(kind.default_extension());
        tokio::fs::create_dir_all(&self.media_dir).await?;
        tokio::fs::write(&path, &bytes).await?;

        debug!(path = %path.display(), size_bytes = bytes.len(), "Decoded embedded media");
        Ok(path)
    }

    /// Validate a local path without copying it.
    async fn validate_local(&self, path: &Path, kind: MediaKind) -> MediaResult<PathBuf> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        self.check_extension(path, kind)?;
        Ok(path.to_path_buf())
    }

    fn check_extension(&self, path: &Path, kind: MediaKind) -> MediaResult<()> {
        if kind.allows_path(path) {
            Ok(())
        } else {
            Err(MediaError::unsupported(format!(
                "{} is not an allowed {} file (allowed: {})",
                path.display(),
                kind.as_str(),
                kind.allowed_extensions().join(", ")
            )))
        }
    }

    fn allocate_path(&self, extension: &str) -> PathBuf {
        self.media_dir
            .join(format!("{}{}", Uuid::new_v4(), extension))
    }
}

/// Best-effort removal of a partially transferred file.
async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), "Failed to remove partial download: {}", e);
    }
}

/// Pick an extension for a remote file: URL path first, then Content-Type,
/// then the kind's default.
fn remote_extension(url: &url::Url, response: &reqwest::Response, kind: MediaKind) -> String {
    let url_path = Path::new(url.path());
    if kind.allows_path(url_path) {
        if let Some(ext) = url_path.extension().and_then(|e| e.to_str()) {
            return format!(".{}", ext.to_ascii_lowercase());
        }
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ext) = extension_for_content_type(content_type) {
            return ext.to_string();
        }
    }

    kind.default_extension().to_string()
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or(content_type).trim();
    match essence {
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/bmp" => Some(".bmp"),
        "audio/mpeg" => Some(".mp3"),
        "audio/wav" | "audio/x-wav" => Some(".wav"),
        "audio/aac" => Some(".aac"),
        "audio/flac" => Some(".flac"),
        "audio/mp4" => Some(".m4a"),
        "video/mp4" => Some(".mp4"),
        "video/quicktime" => Some(".mov"),
        "video/x-matroska" => Some(".mkv"),
        "video/x-msvideo" => Some(".avi"),
        _ => None,
    }
}

/// SHA-256 fingerprint of a file at rest, streamed in chunks.
pub async fn fingerprint_file(path: &Path) -> MediaResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
