//! Guest check-in service: onboarding wizard, guest directory and visit
//! ledger access, profile images.

pub mod access;
pub mod config;
pub mod envelope;
pub mod error;
pub mod guests;
pub mod images;
pub mod onboarding;
pub mod server;
pub mod store;
