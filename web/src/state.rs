//! Application state for Axum handlers.

use lending_core::store::LendingStore;
use lending_runtime::LendingService;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Commands go through the [`LendingService`]; read-only views query its
/// store directly.
#[derive(Clone)]
pub struct AppState {
    /// Borrowing and payment workflows
    pub service: LendingService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: LendingService) -> Self {
        Self { service }
    }

    /// Store used by the read-only views
    #[must_use]
    pub fn store(&self) -> &dyn LendingStore {
        self.service.store().as_ref()
    }
}
