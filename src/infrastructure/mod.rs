//! Concrete adapters for the ports defined in `domain::repositories` and
//! `domain::ports`. The only implementation shipped is in-memory; a real
//! database/cache pairing can implement the same traits without the
//! application layer changing.

pub mod repositories;

pub use repositories::in_memory;
