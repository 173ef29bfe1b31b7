use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a processing checkpoint. A checkpoint written mid-replay is
/// `Pending` until a full pass completes, at which point it becomes
/// `Confirmed`. A `Pending` checkpoint found at startup means the previous
/// run died mid-replay and recovery must resume the replay rather than
/// trust the checkpoint's buffer state at face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingCheckpoint {
    pub symbol: String,
    pub timeframe: String,
    /// Timestamp (ms) of the last 1-minute candle processed as of this checkpoint.
    pub checkpoint_time: i64,
    pub status: CheckpointStatus,
    /// Wall-clock time the owning process started, preserved across
    /// replay so a chain of recoveries keeps one stable value.
    pub system_start_time: DateTime<Utc>,
}

impl ProcessingCheckpoint {
    pub fn new(symbol: String, timeframe: String, checkpoint_time: i64) -> Self {
        Self {
            symbol,
            timeframe,
            checkpoint_time,
            status: CheckpointStatus::Pending,
            system_start_time: Utc::now(),
        }
    }
}
