use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{balance_callback_url, DisbursementRequest, GatewayAck, GatewayError, RemittanceRequest};
use crate::config::MpesaConfig;
use crate::ports::PaymentGateway;
use crate::source::token::{AccessToken, TokenCache};

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    access_token: String,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<i64>,
}

/// Synchronous acknowledgement shared by the B2C, B2B and balance APIs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestAck {
    #[serde(rename = "ConversationID")]
    conversation_id: Option<String>,
    response_code: Option<String>,
    response_description: Option<String>,
}

impl RequestAck {
    fn into_ack(self) -> GatewayAck {
        let description = self.response_description.unwrap_or_default();
        match (self.response_code.as_deref(), self.conversation_id) {
            (Some("0"), Some(reference)) => GatewayAck::accepted(reference, description),
            (code, _) => {
                warn!(response_code = ?code, description = %description, "gateway rejected request");
                GatewayAck::rejected(description)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct B2cBody<'a> {
    initiator_name: &'a str,
    security_credential: &'a str,
    #[serde(rename = "CommandID")]
    command_id: &'a str,
    amount: String,
    party_a: &'a str,
    party_b: &'a str,
    remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    result_url: &'a str,
    occasion: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BalanceBody<'a> {
    initiator: &'a str,
    security_credential: &'a str,
    #[serde(rename = "CommandID")]
    command_id: &'a str,
    party_a: &'a str,
    identifier_type: &'a str,
    remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    result_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct B2bBody<'a> {
    initiator: &'a str,
    security_credential: &'a str,
    #[serde(rename = "CommandID")]
    command_id: &'a str,
    sender_identifier_type: &'a str,
    reciever_identifier_type: &'a str,
    amount: String,
    party_a: &'a str,
    party_b: &'a str,
    account_reference: &'a str,
    remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    result_url: &'a str,
}

/// M-Pesa B2C/B2B adapter guarded by a circuit breaker.
#[derive(Clone)]
pub struct MpesaGateway {
    client: Client,
    config: MpesaConfig,
    tokens: Arc<TokenCache>,
    circuit_breaker: Breaker,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    pub fn with_circuit_breaker(config: MpesaConfig, failure_threshold: u32, reset_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        MpesaGateway {
            client,
            config,
            tokens: Arc::new(TokenCache::new(Duration::from_secs(60))),
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<AccessToken, GatewayError> {
        let response = self
            .client
            .get(&self.config.oauth_url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Auth(format!("oauth returned {}", response.status())));
        }
        let body = response
            .json::<OAuthResponse>()
            .await
            .map_err(|e| GatewayError::Auth(e.to_string()))?;

        let ttl = body.expires_in.unwrap_or(3599);
        Ok(AccessToken::new(body.access_token, Utc::now() + chrono::Duration::seconds(ttl)))
    }

    async fn submit<B: Serialize + Send + Sync>(&self, url: &str, body: &B) -> Result<GatewayAck, GatewayError> {
        let token = self.access_token().await?;
        let request = self.client.post(url).bearer_auth(token).json(body);

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status();
                if status.is_server_error() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(GatewayError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                if status == reqwest::StatusCode::UNAUTHORIZED {
                    return Err(GatewayError::Auth("access token rejected".to_string()));
                }
                // Client errors still carry a ResponseCode / errorMessage body.
                let raw = response.text().await?;
                parse_ack(&raw)
            })
            .await;

        match result {
            Ok(ack) => Ok(ack),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "M-Pesa circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(GatewayError::Auth(msg))) => {
                self.tokens.invalidate().await;
                Err(GatewayError::Auth(msg))
            }
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn parse_ack(raw: &str) -> Result<GatewayAck, GatewayError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    if value.get("ResponseCode").is_some() {
        let ack: RequestAck =
            serde_json::from_value(value).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        return Ok(ack.into_ack());
    }
    // Validation failures come back as {"requestId","errorCode","errorMessage"}.
    let message = value
        .get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or("request rejected by gateway");
    Ok(GatewayAck::rejected(message))
}

/// Whole-shilling amount the gateway accepts. Payout amounts are already
/// whole; a fractional charge is truncated so a remittance never moves more
/// than was collected.
fn whole_amount(amount: &BigDecimal) -> String {
    amount.with_scale(0).to_string()
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn disburse(&self, request: &DisbursementRequest) -> Result<GatewayAck, GatewayError> {
        let body = B2cBody {
            initiator_name: &self.config.initiator,
            security_credential: &self.config.security_credential,
            command_id: "BusinessPayment",
            amount: whole_amount(&request.amount),
            party_a: &self.config.short_code,
            party_b: &request.phone,
            remarks: "Request b2c payment",
            queue_timeout_url: &request.callback_url,
            result_url: &request.callback_url,
            occasion: &request.occasion,
        };
        let ack = self.submit(&self.config.b2c_url, &body).await?;
        info!(
            kind = %request.kind,
            accepted = ack.accepted,
            reference = ?ack.reference,
            "B2C disbursement submitted"
        );
        Ok(ack)
    }

    async fn query_balance(&self) -> Result<GatewayAck, GatewayError> {
        let result_url = balance_callback_url(&self.config.callback_base_url);
        let body = BalanceBody {
            initiator: &self.config.initiator,
            security_credential: &self.config.security_credential,
            command_id: "AccountBalance",
            party_a: &self.config.short_code,
            identifier_type: "4",
            remarks: "bal",
            queue_timeout_url: &result_url,
            result_url: &result_url,
        };
        self.submit(&self.config.balance_url, &body).await
    }

    async fn remit_charge(&self, request: &RemittanceRequest) -> Result<GatewayAck, GatewayError> {
        let body = B2bBody {
            initiator: &self.config.initiator,
            security_credential: &self.config.security_credential,
            command_id: "BusinessPayBill",
            sender_identifier_type: "4",
            reciever_identifier_type: "4",
            amount: whole_amount(&request.amount),
            party_a: &self.config.short_code,
            party_b: &self.config.b2b_short_code,
            account_reference: &request.account_reference,
            remarks: "Charge remittance",
            queue_timeout_url: &request.callback_url,
            result_url: &request.callback_url,
        };
        let ack = self.submit(&self.config.b2b_url, &body).await?;
        info!(accepted = ack.accepted, reference = ?ack.reference, "B2B charge remittance submitted");
        Ok(ack)
    }
}
