use std::collections::HashSet;
use std::io::BufRead;

use rusqlite::Connection;

use crate::db::BatchLoader;
use crate::error::Result;
use crate::models::NewProgram;

use super::parser::ParseOptions;
use super::progress::{ProgressReporter, ProgressThrottle};
use super::reader::{stream_elements, Element, ElementHandler};

/// Result of the program pass over one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramPassResult {
    pub program_count: usize,
    /// Programmes whose channel was not accepted by the channel pass.
    pub skipped_count: usize,
}

struct ProgramHandler<'a> {
    conn: &'a mut Connection,
    channel_ids: &'a HashSet<String>,
    source_name: &'a str,
    reporter: &'a dyn ProgressReporter,
    throttle: ProgressThrottle,
    loader: BatchLoader<NewProgram>,
    // None outside a programme and for the span of a rejected one.
    current: Option<NewProgram>,
    program_count: usize,
    discarded_count: usize,
    skipped_count: usize,
}

impl ElementHandler for ProgramHandler<'_> {
    fn open(&mut self, element: &Element<'_, '_>) -> Result<()> {
        if element.name() != b"programme" {
            return Ok(());
        }

        let channel_id = element.attribute("channel")?;
        if !self.channel_ids.contains(&channel_id) {
            self.current = None;
            self.skipped_count += 1;
            return Ok(());
        }

        let start = element.attribute("start")?;
        let stop = element.attribute("stop")?;
        self.current = Some(NewProgram::new(&channel_id, &start, &stop));
        Ok(())
    }

    fn close(&mut self, name: &[u8], text: &str) -> Result<()> {
        let Some(program) = self.current.as_mut() else {
            return Ok(());
        };

        match name {
            b"title" => program.title = text.trim().to_string(),
            b"desc" => program.description = Some(text.trim().to_string()),
            b"category" => program.category = Some(text.trim().to_string()),
            b"programme" => {
                if let Some(program) = self.current.take() {
                    self.accept(program);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl ProgramHandler<'_> {
    fn accept(&mut self, program: NewProgram) {
        // Title-less programmes are dropped without counting as skipped.
        if program.title.is_empty() {
            return;
        }

        self.program_count += 1;

        let Some(flushed) = self.loader.push(self.conn, program) else {
            return;
        };
        self.discarded_count += flushed.discarded;
        if self.throttle.ready() {
            self.reporter
                .programs_processed(self.source_name, self.program_count, self.skipped_count);
        }
    }

    fn finish(mut self) -> ProgramPassResult {
        self.discarded_count += self.loader.flush(self.conn).discarded;
        if self.discarded_count > 0 {
            tracing::warn!(
                "{} programs from source {} were lost to failed batches",
                self.discarded_count,
                self.source_name
            );
        }
        tracing::info!(
            "Processed {} programs from source {}",
            self.program_count,
            self.source_name
        );
        if self.skipped_count > 0 {
            tracing::warn!(
                "Skipped {} programs with unknown channels from source {}",
                self.skipped_count,
                self.source_name
            );
        }
        ProgramPassResult {
            program_count: self.program_count,
            skipped_count: self.skipped_count,
        }
    }
}

/// Streams `input` once, storing every titled `<programme>` whose channel is
/// in `channel_ids`.
pub fn extract_programs<R: BufRead>(
    conn: &mut Connection,
    input: R,
    channel_ids: &HashSet<String>,
    source_name: &str,
    options: &ParseOptions,
    reporter: &dyn ProgressReporter,
) -> Result<ProgramPassResult> {
    let mut handler = ProgramHandler {
        conn,
        channel_ids,
        source_name,
        reporter,
        throttle: ProgressThrottle::new(options.progress_interval),
        loader: BatchLoader::new("program", options.batch_size),
        current: None,
        program_count: 0,
        discarded_count: 0,
        skipped_count: 0,
    };

    stream_elements(input, &mut handler)?;
    Ok(handler.finish())
}
