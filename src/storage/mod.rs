pub mod checkpoint;
pub mod records;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, RunProgress, CHECKPOINT_FORMAT_VERSION};
pub use records::{EvaluationRecord, MemoryRecorder, NullRecorder, RecordLog, RunRecorder};
