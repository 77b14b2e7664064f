//! Cache backends: Dragonfly for shared deployments, moka for a single process

mod codec;
pub mod dragonfly_cache;
pub mod memory_cache;
pub mod service;

pub use dragonfly_cache::DragonflyCache;
pub use memory_cache::MemoryCache;
pub use service::CacheServiceImpl;
