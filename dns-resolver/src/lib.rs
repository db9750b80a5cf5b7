pub mod cache;
pub mod error;
pub mod nameserver;
pub mod recursive;

pub use cache::SharedCache;
pub use error::ResolveError;
pub use recursive::{resolve, Answer, ResolverConfig};
