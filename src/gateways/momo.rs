//! Momo adapter (API v2, `captureWallet`).
//!
//! Requests and IPN callbacks are JSON. Each carries an HMAC-SHA256 over a
//! fixed `key=value&...` string whose field list depends on the message type.
//! Amounts are whole dong.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::signing::{hmac_sha256_hex, verify_sha256_hex};
use super::{PaymentGateway, PaymentUrlRequest, RefundCommand, RefundOutcome, post_json, to_minor_units};
use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::payment::{Gateway, WebhookEvent, WebhookNotification};

/// Refund order ids are our `RF...` references.
const REFUND_PREFIX: &str = "RF";

pub struct MomoGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

/// IPN body as Momo sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoIpn {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub order_info: String,
    pub order_type: String,
    pub trans_id: i64,
    pub result_code: i64,
    pub message: String,
    pub pay_type: String,
    pub response_time: i64,
    pub extra_data: String,
    pub signature: String,
}

impl MomoGateway {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn lang(&self) -> &str {
        self.config.locale.as_deref().unwrap_or("vi")
    }

    /// Raw string Momo signs for an IPN callback.
    pub fn ipn_signature_data(&self, ipn: &MomoIpn) -> String {
        format!(
            "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}&orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}&resultCode={}&transId={}",
            self.config.access_key,
            ipn.amount,
            ipn.extra_data,
            ipn.message,
            ipn.order_id,
            ipn.order_info,
            ipn.order_type,
            ipn.partner_code,
            ipn.pay_type,
            ipn.request_id,
            ipn.response_time,
            ipn.result_code,
            ipn.trans_id,
        )
    }

    pub fn sign(&self, data: &str) -> Result<String, AppError> {
        hmac_sha256_hex(&self.config.secret_key, data)
    }
}

fn parse_ipn(body: &[u8]) -> Result<MomoIpn, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed Momo callback: {e}")))
}

#[async_trait]
impl PaymentGateway for MomoGateway {
    fn kind(&self) -> Gateway {
        Gateway::Momo
    }

    async fn create_payment_url(&self, request: &PaymentUrlRequest<'_>) -> Result<String, AppError> {
        let amount = to_minor_units(request.amount, 1)?;
        let redirect_url = request.return_url.unwrap_or(&self.config.return_url);
        let request_type = self
            .config
            .command
            .as_deref()
            .unwrap_or("captureWallet");
        let order_id = request.transaction_ref;
        let request_id = request.transaction_ref;

        let data = format!(
            "accessKey={}&amount={}&extraData=&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
            self.config.access_key,
            amount,
            self.config.ipn_url,
            order_id,
            request.order_info,
            self.config.partner_code,
            redirect_url,
            request_id,
            request_type,
        );

        let body = serde_json::json!({
            "partnerCode": self.config.partner_code,
            "requestId": request_id,
            "amount": amount,
            "orderId": order_id,
            "orderInfo": request.order_info,
            "redirectUrl": redirect_url,
            "ipnUrl": self.config.ipn_url,
            "requestType": request_type,
            "extraData": "",
            "lang": self.lang(),
            "signature": self.sign(&data)?,
        });

        let response = post_json(&self.client, Gateway::Momo, &self.config.api_url, &body).await?;

        match (response["resultCode"].as_i64(), response["payUrl"].as_str()) {
            (Some(0), Some(url)) => Ok(url.to_string()),
            (code, _) => {
                let message = response["message"].as_str().unwrap_or("no payment URL");
                tracing::warn!(?code, message, "Momo refused payment request");
                Err(AppError::GatewayUnavailable(format!("momo: {message}")))
            }
        }
    }

    fn verify_signature(&self, body: &[u8]) -> bool {
        match parse_ipn(body) {
            Ok(ipn) => verify_sha256_hex(
                &self.config.secret_key,
                &self.ipn_signature_data(&ipn),
                &ipn.signature,
            ),
            Err(_) => false,
        }
    }

    fn decode_webhook(&self, body: &[u8]) -> Result<WebhookNotification, AppError> {
        let ipn = parse_ipn(body)?;
        let raw = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidRequest(format!("Malformed Momo callback: {e}")))?;

        let event = if ipn.order_id.starts_with(REFUND_PREFIX) {
            WebhookEvent::Refund
        } else {
            WebhookEvent::Payment
        };

        Ok(WebhookNotification {
            gateway: Gateway::Momo,
            event,
            transaction_ref: ipn.order_id,
            gateway_transaction_id: ipn.trans_id.to_string(),
            result_code: ipn.result_code.to_string(),
            success: ipn.result_code == 0,
            message: Some(ipn.message),
            amount: Some(Decimal::from(ipn.amount)),
            signature: Some(ipn.signature),
            raw,
        })
    }

    async fn initiate_refund(&self, command: &RefundCommand<'_>) -> Result<RefundOutcome, AppError> {
        let url = self
            .config
            .refund_url
            .as_deref()
            .ok_or_else(|| AppError::GatewayUnavailable("momo refunds are not configured".into()))?;
        let amount = to_minor_units(command.refund_amount, 1)?;

        let data = format!(
            "accessKey={}&amount={}&description={}&orderId={}&partnerCode={}&requestId={}&transId={}",
            self.config.access_key,
            amount,
            command.reason,
            command.refund_ref,
            self.config.partner_code,
            command.refund_ref,
            command.original_txn_id,
        );

        let body = serde_json::json!({
            "partnerCode": self.config.partner_code,
            "orderId": command.refund_ref,
            "requestId": command.refund_ref,
            "amount": amount,
            "transId": command.original_txn_id.parse::<i64>().unwrap_or_default(),
            "lang": self.lang(),
            "description": command.reason,
            "signature": self.sign(&data)?,
        });

        let raw = post_json(&self.client, Gateway::Momo, url, &body).await?;
        let code = raw["resultCode"].as_i64().unwrap_or(-1);
        let refund_id = raw["transId"]
            .as_i64()
            .map(|id| id.to_string())
            .unwrap_or_else(|| command.refund_ref.to_string());

        Ok(RefundOutcome {
            refund_id,
            code: code.to_string(),
            message: raw["message"].as_str().unwrap_or_default().to_string(),
            success: code == 0,
            raw,
        })
    }

    fn map_error_code(&self, code: &str) -> &'static str {
        match code {
            "1001" => "INSUFFICIENT_FUNDS",
            "1002" => "ISSUER_DECLINED",
            "1003" => "PAYMENT_CANCELLED",
            "1004" => "LIMIT_EXCEEDED",
            "1005" => "PAYMENT_TIMEOUT",
            "1006" => "USER_CANCELLED",
            "1007" => "ACCOUNT_INACTIVE",
            "1026" => "PAYMENT_RESTRICTED",
            "1080" | "1081" => "REFUND_REJECTED",
            _ => "UNKNOWN_ERROR",
        }
    }

    fn acknowledgement(&self) -> serde_json::Value {
        serde_json::json!({ "resultCode": 0, "message": "Success" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> MomoGateway {
        let config = GatewayConfig {
            partner_code: "MOMOTEST".into(),
            access_key: "F8BBA842ECF85".into(),
            secret_key: "K951B6PE1waDMi640xX08PD3vg6EkVlz".into(),
            api_url: "https://test-payment.momo.vn/v2/gateway/api/create".into(),
            refund_url: None,
            return_url: "https://shop.test/payments/return".into(),
            ipn_url: "https://shop.test/webhooks/momo".into(),
            version: None,
            command: None,
            currency: None,
            locale: None,
        };
        MomoGateway::new(config, reqwest::Client::new())
    }

    fn signed_ipn(gw: &MomoGateway, order_id: &str, result_code: i64) -> Vec<u8> {
        signed_ipn_with_trans_id(gw, order_id, result_code, 4088878653)
    }

    fn signed_ipn_with_trans_id(
        gw: &MomoGateway,
        order_id: &str,
        result_code: i64,
        trans_id: i64,
    ) -> Vec<u8> {
        let mut ipn = MomoIpn {
            partner_code: "MOMOTEST".into(),
            order_id: order_id.into(),
            request_id: order_id.into(),
            amount: 230,
            order_info: "Payment for ORD-20250101-001".into(),
            order_type: "momo_wallet".into(),
            trans_id,
            result_code,
            message: "Successful.".into(),
            pay_type: "qr".into(),
            response_time: 1_735_689_600_000,
            extra_data: String::new(),
            signature: String::new(),
        };
        ipn.signature = gw.sign(&gw.ipn_signature_data(&ipn)).unwrap();
        serde_json::to_vec(&serde_json::json!({
            "partnerCode": ipn.partner_code,
            "orderId": ipn.order_id,
            "requestId": ipn.request_id,
            "amount": ipn.amount,
            "orderInfo": ipn.order_info,
            "orderType": ipn.order_type,
            "transId": ipn.trans_id,
            "resultCode": ipn.result_code,
            "message": ipn.message,
            "payType": ipn.pay_type,
            "responseTime": ipn.response_time,
            "extraData": ipn.extra_data,
            "signature": ipn.signature,
        }))
        .unwrap()
    }

    #[test]
    fn verifies_and_decodes_ipn() {
        let gw = gateway();
        let body = signed_ipn(&gw, "0f8fad5bd9cb469fa16570867728950e", 0);
        assert!(gw.verify_signature(&body));

        let n = gw.decode_webhook(&body).unwrap();
        assert!(n.success);
        assert_eq!(n.event, WebhookEvent::Payment);
        assert_eq!(n.gateway_transaction_id, "4088878653");
        assert_eq!(n.amount, Some(Decimal::from(230)));
    }

    #[test]
    fn refund_ipn_is_recognised_by_reference() {
        let gw = gateway();
        let body = signed_ipn(&gw, "RF20250101120000", 1006);
        let n = gw.decode_webhook(&body).unwrap();
        assert_eq!(n.event, WebhookEvent::Refund);
        assert!(!n.success);
        assert_eq!(gw.map_error_code(&n.result_code), "USER_CANCELLED");
    }

    #[test]
    fn declined_ipns_without_trans_id_are_keyed_by_order_id() {
        let gw = gateway();
        let first = signed_ipn_with_trans_id(&gw, "0f8fad5bd9cb469fa16570867728950e", 1006, 0);
        let second = signed_ipn_with_trans_id(&gw, "7c9e6679742540de944be07fc1f90ae7", 1006, 0);

        let first = gw.decode_webhook(&first).unwrap().idempotency_key();
        let second = gw.decode_webhook(&second).unwrap().idempotency_key();
        assert_eq!(first, "0f8fad5bd9cb469fa16570867728950e:1006");
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_modified_or_malformed_ipn() {
        let gw = gateway();
        let body = signed_ipn(&gw, "0f8fad5bd9cb469fa16570867728950e", 0);
        let tampered = String::from_utf8(body).unwrap().replace("\"amount\":230", "\"amount\":1");
        assert!(!gw.verify_signature(tampered.as_bytes()));
        assert!(!gw.verify_signature(b"not json"));
    }
}
