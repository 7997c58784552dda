// Named resource cache with background loading

pub mod cli;
pub mod config;
pub mod io;
pub mod logging;
pub mod resource;
pub mod threading;

pub use cli::Cli;
pub use config::{CacheConfig, Options};
pub use logging::LogLevel;
pub use resource::{ResourceCache, ResourceHandle, ResourcePool, ResourceState};
