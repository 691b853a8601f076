//! Payment processor client and inbound event decoding.

use std::collections::BTreeMap;

use anyhow::{Context as _, anyhow};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::domain::repository::PaymentProcessor;
use crate::domain::types::{
    AccountSnapshot, CheckoutCompletion, CheckoutSessionRequest, ProcessorEvent,
    ProcessorSession, RefundNotice,
};
use crate::error::TicketingError;

#[derive(Clone)]
pub struct HttpPaymentProcessor {
    pub http: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Serialize)]
struct SessionForm<'a> {
    mode: &'static str,
    customer_email: &'a str,
    expires_at: i64,
    success_url: &'a str,
    cancel_url: &'a str,
    line_items: Vec<LineItem<'a>>,
    payment_intent_data: PaymentIntentData<'a>,
    metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct LineItem<'a> {
    quantity: u32,
    price_data: PriceData<'a>,
}

#[derive(Serialize)]
struct PriceData<'a> {
    currency: &'a str,
    unit_amount: i64,
    product_data: ProductData<'a>,
}

#[derive(Serialize)]
struct ProductData<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct PaymentIntentData<'a> {
    application_fee_amount: i64,
    transfer_data: TransferData<'a>,
    metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct TransferData<'a> {
    destination: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

fn session_form(request: &CheckoutSessionRequest) -> SessionForm<'_> {
    let metadata = request.metadata.to_map();
    SessionForm {
        mode: "payment",
        customer_email: &request.customer_email,
        expires_at: request.expires_at.timestamp(),
        success_url: &request.success_url,
        cancel_url: &request.cancel_url,
        line_items: vec![LineItem {
            quantity: request.quantity,
            price_data: PriceData {
                currency: &request.currency,
                unit_amount: request.unit_amount_minor,
                product_data: ProductData {
                    name: &request.line_item_name,
                },
            },
        }],
        payment_intent_data: PaymentIntentData {
            application_fee_amount: request.application_fee_minor,
            transfer_data: TransferData {
                destination: &request.destination_account,
            },
            metadata: metadata.clone(),
        },
        metadata,
    }
}

impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProcessorSession, TicketingError> {
        let body = serde_qs::to_string(&session_form(request)).context("encode session form")?;
        let url = format!(
            "{}/v1/checkout/sessions",
            self.base_url.trim_end_matches('/')
        );
        let response: SessionResponse = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .context("create checkout session")?
            .error_for_status()
            .context("processor rejected checkout session")?
            .json()
            .await
            .context("decode checkout session")?;
        let url = response
            .url
            .ok_or_else(|| anyhow!("checkout session {} has no url", response.id))?;
        Ok(ProcessorSession {
            id: response.id,
            url,
        })
    }
}

// ── Inbound events ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawSession {
    id: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawCharge {
    id: String,
    payment_intent: Option<String>,
    amount_refunded: i64,
    refunds: Option<RawList<RawRefund>>,
}

#[derive(Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawRefund {
    id: String,
}

#[derive(Deserialize)]
struct RawAccount {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
}

impl ProcessorEvent {
    /// Decode a raw webhook body. Unknown event types decode to `Unhandled`.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_slice(body)?;
        let object = raw.data.object;
        Ok(match raw.kind.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let session: RawSession = serde_json::from_value(object)?;
                Self::CheckoutCompleted(CheckoutCompletion {
                    session_id: session.id,
                    payment_reference: session.payment_intent,
                    amount_total: session.amount_total,
                    paid: session.payment_status.as_deref() == Some("paid"),
                    metadata: session.metadata,
                })
            }
            "checkout.session.expired" => {
                let session: RawSession = serde_json::from_value(object)?;
                Self::CheckoutExpired {
                    session_id: session.id,
                }
            }
            "charge.refunded" => {
                let charge: RawCharge = serde_json::from_value(object)?;
                let refund_reference = charge
                    .refunds
                    .and_then(|list| list.data.into_iter().next())
                    .map(|r| r.id)
                    .unwrap_or_else(|| charge.id.clone());
                Self::ChargeRefunded(RefundNotice {
                    payment_reference: charge.payment_intent.unwrap_or(charge.id),
                    amount_refunded: charge.amount_refunded,
                    refund_reference,
                })
            }
            "account.updated" => {
                let account: RawAccount = serde_json::from_value(object)?;
                Self::AccountUpdated(AccountSnapshot {
                    account_id: account.id,
                    charges_enabled: account.charges_enabled,
                    payouts_enabled: account.payouts_enabled,
                    details_submitted: account.details_submitted,
                })
            }
            _ => Self::Unhandled(raw.kind),
        })
    }
}
