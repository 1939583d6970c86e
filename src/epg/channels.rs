use std::collections::HashSet;
use std::io::BufRead;

use rusqlite::Connection;

use crate::db::BatchLoader;
use crate::error::Result;
use crate::models::NewChannel;

use super::parser::ParseOptions;
use super::progress::{ProgressReporter, ProgressThrottle};
use super::reader::{stream_elements, Element, ElementHandler};

/// Result of the channel pass over one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPassResult {
    pub channel_count: usize,
    /// Every channel id accepted by the pass; gates the program pass.
    pub channel_ids: HashSet<String>,
}

struct ChannelHandler<'a> {
    conn: &'a mut Connection,
    source_id: &'a str,
    source_name: &'a str,
    reporter: &'a dyn ProgressReporter,
    throttle: ProgressThrottle,
    loader: BatchLoader<NewChannel>,
    current: Option<NewChannel>,
    icon_src: Option<String>,
    channel_count: usize,
    discarded_count: usize,
    channel_ids: HashSet<String>,
}

impl ElementHandler for ChannelHandler<'_> {
    fn open(&mut self, element: &Element<'_, '_>) -> Result<()> {
        match element.name() {
            b"channel" => {
                self.current = Some(NewChannel {
                    id: element.attribute("id")?,
                    source_id: self.source_id.to_string(),
                    name: String::new(),
                    icon: None,
                });
            }
            b"icon" if self.current.is_some() => {
                self.icon_src = Some(element.attribute("src")?);
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8], text: &str) -> Result<()> {
        let Some(channel) = self.current.as_mut() else {
            return Ok(());
        };

        match name {
            b"display-name" => channel.name = text.trim().to_string(),
            b"icon" => {
                let src = self.icon_src.take().unwrap_or_default();
                let reference = if src.trim().is_empty() { text.trim() } else { src.trim() };
                if channel.icon.is_none() && !reference.is_empty() {
                    channel.icon = Some(reference.to_string());
                }
            }
            b"channel" => {
                if let Some(channel) = self.current.take() {
                    self.accept(channel);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl ChannelHandler<'_> {
    fn accept(&mut self, channel: NewChannel) {
        if channel.id.is_empty() {
            return;
        }

        self.channel_ids.insert(channel.id.clone());
        self.channel_count += 1;

        let Some(flushed) = self.loader.push(self.conn, channel) else {
            return;
        };
        self.discarded_count += flushed.discarded;
        if self.throttle.ready() {
            self.reporter
                .channels_processed(self.source_name, self.channel_count);
        }
    }

    fn finish(mut self) -> ChannelPassResult {
        self.discarded_count += self.loader.flush(self.conn).discarded;
        if self.discarded_count > 0 {
            tracing::warn!(
                "{} channels from source {} were lost to failed batches",
                self.discarded_count,
                self.source_name
            );
        }
        tracing::info!(
            "Processed {} channels from source {}",
            self.channel_count,
            self.source_name
        );
        ChannelPassResult {
            channel_count: self.channel_count,
            channel_ids: self.channel_ids,
        }
    }
}

/// Streams `input` once, storing every `<channel>` with a non-empty id.
pub fn extract_channels<R: BufRead>(
    conn: &mut Connection,
    input: R,
    source_id: &str,
    source_name: &str,
    options: &ParseOptions,
    reporter: &dyn ProgressReporter,
) -> Result<ChannelPassResult> {
    let mut handler = ChannelHandler {
        conn,
        source_id,
        source_name,
        reporter,
        throttle: ProgressThrottle::new(options.progress_interval),
        loader: BatchLoader::new("channel", options.batch_size),
        current: None,
        icon_src: None,
        channel_count: 0,
        discarded_count: 0,
        channel_ids: HashSet::new(),
    };

    stream_elements(input, &mut handler)?;
    Ok(handler.finish())
}
