use rusqlite::{params, Connection, ErrorCode, Transaction};

use crate::models::{NewChannel, NewProgram};

/// A record that knows how to write itself inside a batch transaction.
pub trait BatchRecord {
    /// A constraint violation on one record skips only that record instead of
    /// rolling back the batch.
    const SKIP_CONFLICTS: bool = false;

    fn write(&self, tx: &Transaction<'_>) -> rusqlite::Result<()>;

    /// Short description used when a record is skipped.
    fn label(&self) -> String;
}

/// What happened to the records buffered for one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub written: usize,
    pub skipped: usize,
    pub discarded: usize,
}

/// Buffers records and writes them `batch_size` at a time, each batch in one
/// transaction.
pub struct BatchLoader<T: BatchRecord> {
    buffer: Vec<T>,
    batch_size: usize,
    kind: &'static str,
}

impl<T: BatchRecord> BatchLoader<T> {
    pub fn new(kind: &'static str, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            kind,
        }
    }

    /// Buffers a record, flushing when the batch is full.
    pub fn push(&mut self, conn: &mut Connection, record: T) -> Option<FlushOutcome> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            Some(self.flush(conn))
        } else {
            None
        }
    }

    /// Writes everything buffered. A failed batch is rolled back and dropped.
    pub fn flush(&mut self, conn: &mut Connection) -> FlushOutcome {
        let records = std::mem::take(&mut self.buffer);
        if records.is_empty() {
            return FlushOutcome::default();
        }

        match write_batch(conn, &records) {
            Ok(outcome) => {
                tracing::debug!(
                    "Committed {} batch: {} written, {} skipped",
                    self.kind,
                    outcome.written,
                    outcome.skipped
                );
                outcome
            }
            Err(e) => {
                tracing::error!("Error processing {} batch: {}", self.kind, e);
                FlushOutcome {
                    discarded: records.len(),
                    ..FlushOutcome::default()
                }
            }
        }
    }
}

fn write_batch<T: BatchRecord>(
    conn: &mut Connection,
    records: &[T],
) -> rusqlite::Result<FlushOutcome> {
    let tx = conn.transaction()?;
    let mut outcome = FlushOutcome::default();

    for record in records {
        match record.write(&tx) {
            Ok(()) => outcome.written += 1,
            Err(e) if T::SKIP_CONFLICTS && is_constraint_violation(&e) => {
                tracing::error!("Integrity error for {}: {}", record.label(), e);
                outcome.skipped += 1;
            }
            // Dropping the transaction rolls the batch back.
            Err(e) => return Err(e),
        }
    }

    tx.commit()?;
    Ok(outcome)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl BatchRecord for NewChannel {
    fn write(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        let inserted = tx.execute(
            "INSERT INTO channels (id, source_id, name, icon) VALUES (?1, ?2, ?3, ?4)",
            params![self.id, self.source_id, self.name, self.icon],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                // Later name wins. The first icon stays within a source; a
                // source taking over the id brings its own icon.
                let updated = tx.execute(
                    r#"UPDATE channels
                       SET source_id = ?2,
                           name = ?3,
                           icon = CASE WHEN source_id = ?2 THEN COALESCE(icon, ?4) ELSE ?4 END
                       WHERE id = ?1"#,
                    params![self.id, self.source_id, self.name, self.icon],
                )?;
                if updated == 0 {
                    return Err(e);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn label(&self) -> String {
        format!("channel {}", self.id)
    }
}

impl BatchRecord for NewProgram {
    const SKIP_CONFLICTS: bool = true;

    fn write(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute(
            r#"INSERT OR REPLACE INTO programs (id, channel_id, title, description, start, stop, category)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                self.id,
                self.channel_id,
                self.title,
                self.description,
                self.start,
                self.stop,
                self.category,
            ],
        )?;
        Ok(())
    }

    fn label(&self) -> String {
        format!("program: {}, channel: {}", self.id, self.channel_id)
    }
}
