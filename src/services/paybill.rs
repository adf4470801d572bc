use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{PaybillBalance, TransactionStatus};
use crate::gateway::callback::parse_balance_result;
use crate::gateway::{GatewayAck, GatewayError};
use crate::ports::{PaybillRepository, PaymentGateway, RepositoryError};
use crate::services::settlement::CallbackOutcome;

/// Tracks the business account's available funds. The gateway answers balance
/// queries asynchronously, so `refresh` only starts one.
pub struct PaybillService {
    gateway: Arc<dyn PaymentGateway>,
    paybill: Arc<dyn PaybillRepository>,
}

impl PaybillService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, paybill: Arc<dyn PaybillRepository>) -> Self {
        Self { gateway, paybill }
    }

    pub async fn refresh(&self) -> Result<GatewayAck, GatewayError> {
        let ack = self.gateway.query_balance().await?;
        if ack.accepted {
            info!(reference = ?ack.reference, "balance query submitted");
        } else {
            warn!(reason = %ack.description, "balance query rejected");
        }
        Ok(ack)
    }

    pub async fn latest(&self) -> Result<Option<PaybillBalance>, RepositoryError> {
        self.paybill.latest().await
    }

    pub async fn handle_balance_callback(&self, payload: &Value) -> Result<CallbackOutcome, RepositoryError> {
        let result = match parse_balance_result(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, payload = %payload, "rejecting malformed balance callback");
                return Ok(CallbackOutcome::Invalid(e.to_string()));
            }
        };

        if !result.header.succeeded() {
            error!(
                reference = %result.header.reference,
                result_code = result.header.result_code,
                result_desc = %result.header.result_desc,
                "balance query failed at the gateway"
            );
            return Ok(CallbackOutcome::Applied(TransactionStatus::Failed));
        }

        let Some(amount) = result.utility_available else {
            warn!(reference = %result.header.reference, "balance result has no utility account segment");
            return Ok(CallbackOutcome::Invalid("missing utility account balance".into()));
        };

        let balance = self.paybill.record_balance(&amount).await?;
        info!(amount = %balance.amount, "paybill balance recorded");
        Ok(CallbackOutcome::Applied(TransactionStatus::Completed))
    }
}
