pub mod identity_cache;
pub mod session_cache;

pub use identity_cache::IdentityCache;
pub use session_cache::SessionListCache;
