pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod key;
pub mod mapper;
pub mod planner;

pub use cache::{CacheEntry, CacheMode, CacheStats, InsertPolicy};
pub use compiler::CompiledRoutine;
pub use config::MapperConfig;
pub use error::MapError;
pub use key::TypePairKey;
pub use mapper::Mapper;
