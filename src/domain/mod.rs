// Market data domain: candles, timeframes, bounded buffers
pub mod market;

// Signal domain: hot/cold signal models, streaks, converters
pub mod signal;

// Replay checkpoint state
pub mod checkpoint;

// Exact-decimal indicator math
pub mod indicators;

// Callback ports
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
