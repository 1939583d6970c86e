use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

const DOWNLOAD_LOG_STEP: u64 = 10 * 1024 * 1024;

/// Resolves a source origin to a readable local file, downloading HTTP
/// sources into a cache directory.
pub struct SourceFetcher {
    client: Client,
    cache_dir: PathBuf,
    cache_ttl: Duration,
}

impl SourceFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, cache_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) epg-loader/1.0")
            .build()?;

        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            cache_ttl,
        })
    }

    /// Local path for `origin`. Paths are returned as-is; URLs are served
    /// from a fresh cache entry, downloaded, or served from a stale cache
    /// entry when the download fails.
    pub async fn acquire(&self, origin: &str) -> Result<PathBuf> {
        if !origin.starts_with("http") {
            return Ok(PathBuf::from(origin));
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let local_path = self.cache_dir.join(cache_file_name(origin));

        if let Some(age) = file_age(&local_path).await {
            if age < self.cache_ttl {
                tracing::info!("Using cached file for {}", origin);
                return Ok(local_path);
            }
        }

        match self.download(origin, &local_path).await {
            Ok(()) => Ok(local_path),
            Err(e) => {
                tracing::error!("Error downloading {}: {}", origin, e);
                if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
                    tracing::warn!("Using older cached version of {}", origin);
                    Ok(local_path)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn download(&self, origin: &str, local_path: &Path) -> Result<()> {
        let url = url::Url::parse(origin)
            .map_err(|e| AppError::Source(format!("Invalid source URL {}: {}", origin, e)))?;

        tracing::info!("Downloading {} to {}", origin, local_path.display());
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch source: HTTP {}", response.status()).into());
        }

        let total_size = response.content_length();
        // Write beside the cache entry so a failed download never replaces it.
        let partial_path = local_path.with_extension("part");
        let mut file = tokio::fs::File::create(&partial_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut next_log = DOWNLOAD_LOG_STEP;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    tokio::fs::remove_file(&partial_path).await.ok();
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if downloaded >= next_log {
                next_log += DOWNLOAD_LOG_STEP;
                match total_size {
                    Some(total) if total > 0 => tracing::info!(
                        "Downloaded {:.1}MB of {:.1}MB ({}%)",
                        megabytes(downloaded),
                        megabytes(total),
                        downloaded * 100 / total
                    ),
                    _ => tracing::info!("Downloaded {:.1}MB", megabytes(downloaded)),
                }
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial_path, local_path).await?;

        tracing::info!("Download complete: {}", local_path.display());
        Ok(())
    }
}

/// Cache file name for a source URL: separators flattened to `_`, or the MD5
/// hex when that would exceed 100 characters, with an `.xml` or `.xml.gz`
/// suffix.
pub fn cache_file_name(url: &str) -> String {
    let mut stem = url.replace(['/', ':', '.'], "_");
    if stem.len() > 100 {
        stem = format!("{:x}", md5::compute(url.as_bytes()));
    }

    let mut file_name = format!("{}.xml", stem);
    if url.to_lowercase().ends_with(".gz") {
        file_name.push_str(".gz");
    }
    file_name
}

async fn file_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
