//! Service layer: account and session orchestration.
//!
//! [`AuthService`] implements register/login/logout/account deletion on top
//! of the persistence layer and the session store.

pub mod auth_service;

pub use auth_service::AuthService;
