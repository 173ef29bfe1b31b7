pub mod in_memory;

pub use in_memory::{
    InMemoryCandleStore, InMemoryCheckpointStore, InMemorySignalCache, InMemorySignalStore,
    InMemoryStreakStore,
};
