use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub icon: Option<String>,
}

/// Channel row produced by the channel pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub stop: String,
    pub category: Option<String>,
}

/// Program row produced by the program pass. `start` and `stop` are the raw
/// provider strings; they are never parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgram {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: String,
    pub stop: String,
    pub category: Option<String>,
}

impl NewProgram {
    pub fn new(channel_id: &str, start: &str, stop: &str) -> Self {
        Self {
            id: Self::identity(channel_id, start, stop),
            channel_id: channel_id.to_string(),
            title: String::new(),
            description: None,
            start: start.to_string(),
            stop: stop.to_string(),
            category: None,
        }
    }

    /// `{channel_id}_{start}_{stop}` over the raw attribute text.
    pub fn identity(channel_id: &str, start: &str, stop: &str) -> String {
        format!("{}_{}_{}", channel_id, start, stop)
    }
}

/// Channel search hit with its source name and program count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMatch {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub source_name: String,
    pub program_count: i64,
}
