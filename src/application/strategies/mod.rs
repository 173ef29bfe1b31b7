pub mod atr_tracker;
pub mod msr_retest;

pub use atr_tracker::AtrPercentileTracker;
pub use msr_retest::{MsrStrategy, ProcessResult};
