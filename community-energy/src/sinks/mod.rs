pub mod questdb_ilp;

pub use questdb_ilp::{write_ilp_line, write_stream, IlpWriter, QuestDbIlpSink};
