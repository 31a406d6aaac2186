//! Onboarding Portal: verified profile submission for new employees.

pub mod config;
pub mod error;
pub mod notify;
pub mod onboarding;
pub mod storage;
pub mod store;
