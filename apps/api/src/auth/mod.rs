// Identity, sessions and request-scoped access control.
// Handlers never read the session store directly: they take a `SessionContext`
// (or `AdminContext`) extractor, which reloads the account on every request.

pub mod context;
pub mod handlers;
pub mod identity;
pub mod passwords;
pub mod sessions;

pub use identity::{ensure_bootstrap_admin, IdentityStore, PgIdentityStore};
pub use sessions::{RedisSessionStore, SessionStore};
