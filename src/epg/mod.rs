//! Two-pass XMLTV extraction.
//!
//! The channel pass walks the whole document first and yields the set of
//! channel ids it stored; the program pass walks the document again and only
//! admits programmes whose `channel` attribute is in that set.

mod channels;
mod parser;
mod programs;
mod progress;
pub(crate) mod reader;

pub use parser::{EpgParser, ParseOptions, ParseOutcome};
pub use progress::{ProgressReporter, TracingReporter};
pub use reader::FeedInput;
