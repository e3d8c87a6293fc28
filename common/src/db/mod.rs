// Database layer module

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use pool::DbPool;
pub use store::BroadcastStore;
