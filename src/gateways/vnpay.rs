//! VNPay adapter.
//!
//! Parameters are sorted by name, form-encoded, and signed with HMAC-SHA512
//! (`vnp_SecureHash`). Amounts travel as integers in hundredths of a dong and
//! timestamps as `YYYYMMDDHHMMSS` in Vietnam time (UTC+7).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::signing::{hmac_sha512_hex, verify_sha512_hex};
use super::{PaymentGateway, PaymentUrlRequest, RefundCommand, RefundOutcome, post_json, to_minor_units};
use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::payment::{Gateway, WebhookEvent, WebhookNotification};

const SUCCESS_CODE: &str = "00";
const HASH_FIELD: &str = "vnp_SecureHash";
const HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

pub struct VnpayGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl VnpayGateway {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn version(&self) -> &str {
        self.config.version.as_deref().unwrap_or("2.1.0")
    }

    /// Form-encoded `params` with `vnp_SecureHash` appended.
    pub fn signed_query(&self, params: &BTreeMap<String, String>) -> Result<String, AppError> {
        let data = encode(params);
        let hash = hmac_sha512_hex(&self.config.secret_key, &data)?;
        Ok(format!("{data}&{HASH_FIELD}={hash}"))
    }
}

/// VNPay timestamps are wall-clock time in UTC+7.
fn vn_timestamp(at: DateTime<Utc>) -> String {
    (at + Duration::hours(7)).format("%Y%m%d%H%M%S").to_string()
}

fn encode(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

fn parse(body: &[u8]) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[async_trait]
impl PaymentGateway for VnpayGateway {
    fn kind(&self) -> Gateway {
        Gateway::Vnpay
    }

    async fn create_payment_url(&self, request: &PaymentUrlRequest<'_>) -> Result<String, AppError> {
        let now = Utc::now();
        let amount = to_minor_units(request.amount, 100)?;

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), self.version().to_string());
        params.insert(
            "vnp_Command".to_string(),
            self.config.command.clone().unwrap_or_else(|| "pay".into()),
        );
        params.insert("vnp_TmnCode".to_string(), self.config.partner_code.clone());
        params.insert("vnp_Amount".to_string(), amount.to_string());
        params.insert(
            "vnp_CurrCode".to_string(),
            self.config.currency.clone().unwrap_or_else(|| "VND".into()),
        );
        params.insert("vnp_TxnRef".to_string(), request.transaction_ref.to_string());
        params.insert("vnp_OrderInfo".to_string(), request.order_info.to_string());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert(
            "vnp_Locale".to_string(),
            self.config.locale.clone().unwrap_or_else(|| "vn".into()),
        );
        params.insert(
            "vnp_ReturnUrl".to_string(),
            request.return_url.unwrap_or(&self.config.return_url).to_string(),
        );
        params.insert("vnp_IpAddr".to_string(), request.client_ip.to_string());
        params.insert("vnp_CreateDate".to_string(), vn_timestamp(now));
        params.insert(
            "vnp_ExpireDate".to_string(),
            vn_timestamp(now + Duration::minutes(15)),
        );

        Ok(format!("{}?{}", self.config.api_url, self.signed_query(&params)?))
    }

    fn verify_signature(&self, body: &[u8]) -> bool {
        let mut params = parse(body);
        let Some(signature) = params.remove(HASH_FIELD) else {
            return false;
        };
        params.remove(HASH_TYPE_FIELD);

        verify_sha512_hex(&self.config.secret_key, &encode(&params), &signature)
    }

    fn decode_webhook(&self, body: &[u8]) -> Result<WebhookNotification, AppError> {
        let params = parse(body);
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();

        let transaction_ref = field("vnp_TxnRef");
        if transaction_ref.is_empty() {
            return Err(AppError::InvalidRequest("vnp_TxnRef is missing".into()));
        }

        let response_code = field("vnp_ResponseCode");
        let transaction_status = params.get("vnp_TransactionStatus");
        let success = response_code == SUCCESS_CODE
            && transaction_status.is_none_or(|status| status == SUCCESS_CODE);

        let event = match params.get("vnp_TransactionType").map(String::as_str) {
            Some("02") | Some("03") => WebhookEvent::Refund,
            _ => WebhookEvent::Payment,
        };

        let amount = params
            .get("vnp_Amount")
            .and_then(|a| a.parse::<i64>().ok())
            .map(|minor| Decimal::new(minor, 2));

        let raw = serde_json::Value::Object(
            params
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        );

        Ok(WebhookNotification {
            gateway: Gateway::Vnpay,
            event,
            transaction_ref,
            gateway_transaction_id: field("vnp_TransactionNo"),
            result_code: response_code,
            success,
            message: params.get("vnp_OrderInfo").cloned(),
            amount,
            signature: params.get(HASH_FIELD).cloned(),
            raw,
        })
    }

    async fn initiate_refund(&self, command: &RefundCommand<'_>) -> Result<RefundOutcome, AppError> {
        let url = self
            .config
            .refund_url
            .as_deref()
            .unwrap_or(&self.config.api_url);
        let now = Utc::now();
        let transaction_type = if command.refund_amount < command.original_amount {
            "03"
        } else {
            "02"
        };
        let amount = to_minor_units(command.refund_amount, 100)?.to_string();
        let create_date = vn_timestamp(now);
        let transaction_date = vn_timestamp(command.original_date);
        let ip = "127.0.0.1";

        let data = [
            command.refund_ref,
            self.version(),
            "refund",
            self.config.partner_code.as_str(),
            transaction_type,
            command.transaction_ref,
            amount.as_str(),
            command.original_txn_id,
            transaction_date.as_str(),
            command.requested_by,
            create_date.as_str(),
            ip,
            command.reason,
        ]
        .join("|");
        let secure_hash = hmac_sha512_hex(&self.config.secret_key, &data)?;

        let body = serde_json::json!({
            "vnp_RequestId": command.refund_ref,
            "vnp_Version": self.version(),
            "vnp_Command": "refund",
            "vnp_TmnCode": self.config.partner_code,
            "vnp_TransactionType": transaction_type,
            "vnp_TxnRef": command.transaction_ref,
            "vnp_Amount": amount,
            "vnp_OrderInfo": command.reason,
            "vnp_TransactionNo": command.original_txn_id,
            "vnp_TransactionDate": transaction_date,
            "vnp_CreateBy": command.requested_by,
            "vnp_CreateDate": create_date,
            "vnp_IpAddr": ip,
            "vnp_SecureHash": secure_hash,
        });

        let raw = post_json(&self.client, Gateway::Vnpay, url, &body).await?;
        let code = raw["vnp_ResponseCode"].as_str().unwrap_or_default().to_string();
        let refund_id = raw["vnp_TransactionNo"]
            .as_str()
            .filter(|id| !id.is_empty())
            .unwrap_or(command.refund_ref)
            .to_string();

        Ok(RefundOutcome {
            refund_id,
            success: code == SUCCESS_CODE,
            message: raw["vnp_Message"].as_str().unwrap_or_default().to_string(),
            code,
            raw,
        })
    }

    fn map_error_code(&self, code: &str) -> &'static str {
        match code {
            "07" => "PAYMENT_SUSPICIOUS",
            "09" => "CARD_NOT_REGISTERED",
            "10" => "AUTH_FAILED",
            "11" => "PAYMENT_TIMEOUT",
            "12" => "CARD_LOCKED",
            "13" => "INVALID_OTP",
            "24" => "USER_CANCELLED",
            "51" => "INSUFFICIENT_FUNDS",
            "65" => "LIMIT_EXCEEDED",
            "75" => "BANK_MAINTENANCE",
            _ => "UNKNOWN_ERROR",
        }
    }

    fn acknowledgement(&self) -> serde_json::Value {
        serde_json::json!({ "RspCode": "00", "Message": "Confirm Success" })
    }
}
