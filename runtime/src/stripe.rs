//! Stripe Checkout client.
//!
//! Opens hosted checkout sessions with `POST /v1/checkout/sessions`. Every
//! attempt sends the payment id as `Idempotency-Key`, so a retried request
//! returns the session created by the first one instead of opening another.

use crate::retry::{retry_with_predicate, RetryPolicy};
use lending_core::checkout::{
    CheckoutError, CheckoutFuture, CheckoutGateway, CheckoutRequest, CheckoutResult,
    CheckoutSession,
};
use lending_core::types::Money;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Public Stripe API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.stripe.com";

/// Connection settings for [`StripeCheckoutGateway`].
#[derive(Clone, Debug)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// API base URL, without the `/v1` suffix
    pub api_url: String,
    /// ISO currency code, lowercase
    pub currency: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Retries for transient failures
    pub retry: RetryPolicy,
}

impl StripeConfig {
    /// Settings for the public API with a 10s timeout and the default retry policy
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            currency: "usd".to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    amount_total: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`CheckoutGateway`] backed by the Stripe API.
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeCheckoutGateway {
    /// Create a client from `config`
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transport` if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn create_session(&self, request: &CheckoutRequest) -> CheckoutResult<CheckoutSession> {
        let form = self.form(request);
        let response = self
            .client
            .post(format!(
                "{}/v1/checkout/sessions",
                self.config.api_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", request.payment_id.to_string())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckoutError::Timeout
                } else {
                    CheckoutError::Transport(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::OK => {
                let session = response
                    .json::<SessionResponse>()
                    .await
                    .map_err(|e| CheckoutError::InvalidResponse(e.to_string()))?;
                let url = session.url.ok_or_else(|| {
                    CheckoutError::InvalidResponse("session has no url".to_string())
                })?;
                let amount_total = session.amount_total.ok_or_else(|| {
                    CheckoutError::InvalidResponse("session has no amount_total".to_string())
                })?;

                tracing::debug!(
                    payment_id = %request.payment_id,
                    session_id = %session.id,
                    "Checkout session opened"
                );
                Ok(CheckoutSession {
                    session_id: session.id,
                    url,
                    amount_total: Money::from_cents(amount_total),
                })
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                Err(CheckoutError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            },
        }
    }

    fn form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.payment_id.to_string()),
            ("metadata[payment_id]", request.payment_id.to_string()),
            (
                "line_items[0][price_data][currency]",
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.unit_amount.cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.line_item.clone(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                request.description.clone(),
            ),
            ("line_items[0][quantity]", request.quantity.to_string()),
        ]
    }
}

impl CheckoutGateway for StripeCheckoutGateway {
    fn open_session(&self, request: CheckoutRequest) -> CheckoutFuture {
        let gateway = self.clone();
        Box::pin(async move {
            retry_with_predicate(
                &gateway.config.retry,
                || gateway.create_session(&request),
                CheckoutError::is_transient,
            )
            .await
        })
    }
}
