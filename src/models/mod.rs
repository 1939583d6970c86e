mod guide;
mod source;

pub use guide::{Channel, ChannelMatch, NewChannel, NewProgram, Program};
pub use source::{source_id_for, source_name_for, DbStatistics, Source, SourceDetail};
