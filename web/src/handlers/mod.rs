//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod books;
pub mod borrowings;
pub mod health;
pub mod payments;
pub mod users;

pub use health::{health_check, readiness};
