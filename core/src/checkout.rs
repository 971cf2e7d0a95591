//! Checkout provider abstraction.
//!
//! A checkout session is a hosted payment page at the provider. The service
//! opens one per payment and is redirected back to the success or cancel URL
//! once the customer is done.

use crate::types::{Money, PaymentId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Checkout gateway result
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Boxed future returned by [`CheckoutGateway::open_session`].
pub type CheckoutFuture = Pin<Box<dyn Future<Output = CheckoutResult<CheckoutSession>> + Send>>;

/// Placeholder the provider substitutes with the real session id in the success URL.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Checkout gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Provider answered with an error status
    #[error("Checkout rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider error message
        message: String,
    },

    /// No answer within the configured timeout
    #[error("Checkout request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("Checkout transport error: {0}")]
    Transport(String),

    /// Provider answered with a body we could not use
    #[error("Invalid checkout response: {0}")]
    InvalidResponse(String),
}

impl CheckoutError {
    /// Whether another attempt may succeed: timeouts, transport errors and 5xx.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// A single-line checkout request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Payment this session collects; doubles as the idempotency key
    pub payment_id: PaymentId,
    /// Line-item name shown on the checkout page
    pub line_item: String,
    /// Line-item description
    pub description: String,
    /// Price of one unit
    pub unit_amount: Money,
    /// Number of units
    pub quantity: u32,
    /// Redirect after a successful payment
    pub success_url: String,
    /// Redirect when the customer abandons the page
    pub cancel_url: String,
}

/// A checkout session opened at the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider session id
    pub session_id: String,
    /// Hosted checkout page
    pub url: String,
    /// Total the provider will charge, in cents
    pub amount_total: Money,
}

/// Checkout provider trait
///
/// Abstraction over hosted checkout services such as Stripe Checkout.
pub trait CheckoutGateway: Send + Sync {
    /// Open a checkout session for `request`
    ///
    /// Implementations must be idempotent per `request.payment_id`.
    fn open_session(&self, request: CheckoutRequest) -> CheckoutFuture;
}

/// Builds provider redirect URLs from the public base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutLinks {
    base_url: String,
}

impl CheckoutLinks {
    /// Creates links rooted at `base_url` (trailing slashes are ignored)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Success redirect for `payment_id`, carrying the session id placeholder
    #[must_use]
    pub fn success_url(&self, payment_id: PaymentId) -> String {
        format!(
            "{}/api/payments/{payment_id}/success?session_id={SESSION_ID_PLACEHOLDER}",
            self.base_url
        )
    }

    /// Cancel redirect for `payment_id`
    #[must_use]
    pub fn cancel_url(&self, payment_id: PaymentId) -> String {
        format!("{}/api/payments/{payment_id}/cancel", self.base_url)
    }
}
