use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;

use super::channels::extract_channels;
use super::programs::extract_programs;
use super::progress::{ProgressReporter, TracingReporter};
use super::reader::FeedInput;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Records written per transaction.
    pub batch_size: usize,
    /// Minimum wall-clock time between progress reports.
    pub progress_interval: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// Aggregate counts for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub channel_count: usize,
    pub program_count: usize,
    pub skipped_count: usize,
}

/// Runs the channel pass and then the program pass over the same input.
#[derive(Clone)]
pub struct EpgParser {
    options: ParseOptions,
    reporter: Arc<dyn ProgressReporter>,
}

impl EpgParser {
    pub fn new(options: ParseOptions, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { options, reporter }
    }

    /// Parses `input` into the store and records the counts on the source
    /// row, stamped with `updated_at`. The source row must already exist.
    pub fn parse(
        &self,
        conn: &mut Connection,
        input: &FeedInput,
        source_id: &str,
        source_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<ParseOutcome> {
        tracing::info!(
            "Starting first pass for {}: extracting channels",
            input.path().display()
        );
        let channels = extract_channels(
            conn,
            input.open()?,
            source_id,
            source_name,
            &self.options,
            self.reporter.as_ref(),
        )?;
        tracing::info!(
            "First pass complete: {} channels extracted",
            channels.channel_count
        );

        tracing::info!(
            "Starting second pass for {}: processing programs",
            input.path().display()
        );
        let programs = extract_programs(
            conn,
            input.open()?,
            &channels.channel_ids,
            source_name,
            &self.options,
            self.reporter.as_ref(),
        )?;
        tracing::info!(
            "Second pass complete: {} programs extracted, {} skipped",
            programs.program_count,
            programs.skipped_count
        );

        let outcome = ParseOutcome {
            channel_count: channels.channel_count,
            program_count: programs.program_count,
            skipped_count: programs.skipped_count,
        };

        conn.execute(
            "UPDATE sources SET channel_count = ?1, program_count = ?2, file_path = ?3, last_updated = ?4 WHERE id = ?5",
            params![
                outcome.channel_count as i64,
                outcome.program_count as i64,
                input.path().to_string_lossy(),
                updated_at.to_rfc3339(),
                source_id,
            ],
        )?;
        tracing::info!(
            "Updated source statistics: {} channels, {} programs",
            outcome.channel_count,
            outcome.program_count
        );

        Ok(outcome)
    }
}

impl Default for EpgParser {
    fn default() -> Self {
        Self::new(ParseOptions::default(), Arc::new(TracingReporter))
    }
}
