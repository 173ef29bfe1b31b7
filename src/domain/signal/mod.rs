pub mod converters;
pub mod fast;
pub mod signal;
