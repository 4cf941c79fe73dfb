pub mod provider;
pub mod token_cache;

pub use provider::{AuthProvider, AuthToken, StaticTokenProvider};
pub use token_cache::{CachedToken, CachingAuthProvider};
