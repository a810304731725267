//! Cash on delivery: no hosted page, no callbacks, no refunds through a provider.

use async_trait::async_trait;

use super::{PaymentGateway, PaymentUrlRequest, RefundCommand, RefundOutcome};
use crate::error::AppError;
use crate::models::payment::{Gateway, WebhookNotification};

pub struct CodGateway;

#[async_trait]
impl PaymentGateway for CodGateway {
    fn kind(&self) -> Gateway {
        Gateway::Cod
    }

    async fn create_payment_url(&self, _request: &PaymentUrlRequest<'_>) -> Result<String, AppError> {
        Err(AppError::InvalidGateway(
            "cash on delivery has no payment page".into(),
        ))
    }

    fn verify_signature(&self, _body: &[u8]) -> bool {
        false
    }

    fn decode_webhook(&self, _body: &[u8]) -> Result<WebhookNotification, AppError> {
        Err(AppError::InvalidGateway("cash on delivery sends no callbacks".into()))
    }

    async fn initiate_refund(&self, _command: &RefundCommand<'_>) -> Result<RefundOutcome, AppError> {
        Err(AppError::CodNoRefund)
    }

    fn map_error_code(&self, _code: &str) -> &'static str {
        "UNKNOWN_ERROR"
    }
}
