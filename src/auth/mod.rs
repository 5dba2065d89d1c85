//! Authentication: session cookies, password hashing, the session and
//! identity collaborators, and the admission gate built on them.

pub mod cookie;
pub mod extractor;
pub mod gate;
pub mod identity;
pub mod password;
pub mod session_store;

pub use cookie::CookiePolicy;
pub use extractor::CurrentUser;
pub use gate::{AdmittedConnection, AuthGate};
pub use identity::IdentityVerifier;
pub use session_store::SessionStore;
