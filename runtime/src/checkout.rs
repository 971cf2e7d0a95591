//! Development checkout gateway.

use lending_core::checkout::{
    CheckoutFuture, CheckoutGateway, CheckoutRequest, CheckoutSession, SESSION_ID_PLACEHOLDER,
};
use lending_core::types::Money;

/// Gateway that opens sessions locally without a provider.
///
/// The session URL is the success callback itself, so following it settles
/// the payment. Session ids derive from the payment id, so opening a session
/// twice for one payment yields the same session. Used when no provider key
/// is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevCheckoutGateway;

impl CheckoutGateway for DevCheckoutGateway {
    fn open_session(&self, request: CheckoutRequest) -> CheckoutFuture {
        let session_id = format!("cs_dev_{}", request.payment_id.as_uuid().simple());
        let url = request
            .success_url
            .replace(SESSION_ID_PLACEHOLDER, &session_id);
        let amount_total = Money::from_cents(
            request
                .unit_amount
                .cents()
                .saturating_mul(u64::from(request.quantity)),
        );

        tracing::warn!(
            payment_id = %request.payment_id,
            session_id = %session_id,
            "Development checkout session opened; no money is collected"
        );

        Box::pin(async move {
            Ok(CheckoutSession {
                session_id,
                url,
                amount_total,
            })
        })
    }
}
