pub mod market_data;
pub mod position_tracker;
pub mod replay;
pub mod strategies;

pub use position_tracker::PositionTracker;
pub use replay::ReplayService;
pub use strategies::MsrStrategy;
