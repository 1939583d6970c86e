use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const DEFAULT_SOURCES: &[&str] = &[
    "https://strongepg.ip-ddns.com/epg/w-8k-epg.xml.gz",
    "https://epgshare01.online/epgshare01/epg_ripper_ALL_SOURCES1.xml.gz",
    "https://epg.pw/xmltv/epg_US.xml",
    "https://www.open-epg.com/files/unitedstates1.xml.gz",
    "https://open-epg.com/files/sports1.xml",
    "https://epg.starlite.best/utc.xml.gz",
    "https://raw.githubusercontent.com/acidjesuz/epgtalk/master/guide.xml",
    "https://i.mjh.nz/PlutoTV/us.xml.gz",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn app_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("epg-loader");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    app_data_dir().join("epg.db").to_string_lossy().to_string()
}

fn default_cache_dir() -> String {
    app_data_dir().join("cache").to_string_lossy().to_string()
}

fn default_sources() -> Vec<String> {
    DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_batch_size() -> usize {
    1000
}

fn default_progress_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            sources: default_sources(),
            cache_ttl_hours: default_cache_ttl_hours(),
            batch_size: default_batch_size(),
            progress_interval_secs: default_progress_interval(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("epg-loader")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 60 * 60)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

/// Sources file layout: a JSON list, a JSON object carrying `EXTERNAL_EPG_URLS`,
/// or plain text with one source per line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourcesDocument {
    List(Vec<String>),
    Keyed {
        #[serde(rename = "EXTERNAL_EPG_URLS")]
        external_epg_urls: Vec<String>,
    },
}

pub fn read_sources_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let document: SourcesDocument = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("Invalid source file format in {}: {}", path.display(), e))
        })?;
        let sources = match document {
            SourcesDocument::List(sources) => sources,
            SourcesDocument::Keyed { external_epg_urls } => external_epg_urls,
        };
        Ok(sources)
    } else {
        Ok(parse_sources_text(&content))
    }
}

fn parse_sources_text(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
