//! Path handling shared by every other component: the cache key codec and
//! the source-root sandbox.

pub mod codec;
pub mod root;

pub use codec::{CACHE_ENTRY_EXTENSION, CacheKey};
pub use root::SourceRoot;
