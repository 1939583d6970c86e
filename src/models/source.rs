use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub channel_count: i64,
    pub program_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-source line of the store-wide statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDetail {
    pub name: String,
    pub url: Option<String>,
    pub channel_count: i64,
    pub program_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl SourceDetail {
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_updated
            .map(|updated| (now - updated).num_seconds() as f64 / 3600.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbStatistics {
    pub sources: i64,
    pub channels: i64,
    pub programs: i64,
    pub source_details: Vec<SourceDetail>,
}

/// Stable source identity: MD5 hex digest of the origin string.
pub fn source_id_for(origin: &str) -> String {
    format!("{:x}", md5::compute(origin.as_bytes()))
}

/// Display name of a source: last `/`-separated segment of its origin.
pub fn source_name_for(origin: &str) -> String {
    origin.rsplit('/').next().unwrap_or(origin).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn source_id_is_stable_md5_hex() {
        let id = source_id_for("https://example.com/guide.xml.gz");
        assert_eq!(id.len(), 32);
        assert_eq!(id, source_id_for("https://example.com/guide.xml.gz"));
        assert_ne!(id, source_id_for("https://example.com/guide.xml"));
        assert_eq!(source_id_for(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn source_name_is_last_segment() {
        assert_eq!(source_name_for("https://i.mjh.nz/PlutoTV/us.xml.gz"), "us.xml.gz");
        assert_eq!(source_name_for("guide.xml"), "guide.xml");
        assert_eq!(source_name_for("https://example.com/"), "");
    }

    #[test]
    fn age_is_measured_in_hours() {
        let now = Utc::now();
        let detail = SourceDetail {
            name: "a".to_string(),
            url: None,
            channel_count: 0,
            program_count: 0,
            last_updated: Some(now - Duration::minutes(90)),
        };
        let age = detail.age_hours(now).unwrap();
        assert!((age - 1.5).abs() < 0.01);
    }
}
