//! # Lending Core
//!
//! Domain types and business logic for the library lending service.
//!
//! The crate is the functional core of the service. It performs no I/O: the
//! reducers validate requests against loaded state and describe what should
//! happen as [`effect::Effect`] values that the runtime executes.
//!
//! ## Core Concepts
//!
//! - **State**: [`types::LoanState`], the rows a single request works on
//! - **Action**: [`types::LoanAction`], requests and gateway feedback
//! - **Reducer**: `(State, Action, Environment) -> Effects`
//! - **Effect**: a unit of work to persist, a notification, or a gateway call
//! - **Environment**: injected clock, checkout gateway and callback settings
//!
//! ## Example
//!
//! ```ignore
//! use lending_core::borrowing::LoanReducer;
//! use lending_core::reducer::Reducer;
//!
//! let mut state = LoanState::for_borrow(user, book);
//! let effects = LoanReducer::new().reduce(&mut state, action, &env);
//! ```

pub mod borrowing;
pub mod checkout;
pub mod error;
pub mod notification;
pub mod payment;
pub mod pricing;
pub mod store;
pub mod types;
pub mod views;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use error::LendingError;
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) -> (State, Effects)`.
/// They contain all business rules and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values, not execution.
pub mod effect {
    use crate::notification::Notification;
    use crate::store::Change;
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should
    /// happen, returned from reducers and executed by the lending service.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Apply a unit of work atomically
        ///
        /// Either every change is applied or none is.
        Persist(Vec<Change>),

        /// Hand a message to the notification dispatcher
        ///
        /// Delivery is fire-and-forget and never fails the request.
        Notify(Notification),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Persist(changes) => {
                    f.debug_tuple("Effect::Persist").field(changes).finish()
                },
                Effect::Notify(notification) => f
                    .debug_tuple("Effect::Notify")
                    .field(notification)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Returns the unit of work if this is a `Persist` effect
        #[must_use]
        pub fn as_persist(&self) -> Option<&[Change]> {
            match self {
                Effect::Persist(changes) => Some(changes),
                _ => None,
            }
        }

        /// Returns the notification if this is a `Notify` effect
        #[must_use]
        pub const fn as_notification(&self) -> Option<&Notification> {
            match self {
                Effect::Notify(notification) => Some(notification),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar day (UTC)
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn test_system_clock_today_matches_now() {
        let clock = SystemClock;
        let now = clock.now();
        let today = clock.today();
        assert!(today >= now.date_naive());
    }
}
