//! Stream providers for the resource cache
//!
//! Each provider turns resource names into byte streams from one kind of
//! source. Register them with `ResourceCache::register_provider`.

pub mod archive;
pub mod directory;
pub mod memory;

pub use archive::ArchiveProvider;
pub use directory::DirectoryProvider;
pub use memory::MemoryProvider;
