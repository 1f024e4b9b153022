//! Request and response types for the gateway and top-up endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /gateway/deduct`.
///
/// # JSON Example
///
/// ```json
/// {
///   "userId": "9c0383a1-0887-4c0f-98ca-cb71ffc4e76c",
///   "ref": "demo-ref",
///   "amount_credits": 5
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// Caller identity within the vendor's tenant
    #[serde(rename = "userId")]
    pub user_id: Uuid,

    /// Ledger-level idempotency handle for this charge, at least 6 characters
    #[serde(rename = "ref")]
    pub ledger_ref: String,

    /// Charge amount in credits, must be positive
    pub amount_credits: i64,

    /// Opaque metadata recorded on the journal entry
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl DeductRequest {
    /// Validate field constraints that the schema cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.amount_credits <= 0 {
            return Err("amount_credits must be a positive integer".to_string());
        }
        if self.ledger_ref.len() < 6 {
            return Err("ref must be at least 6 characters".to_string());
        }
        Ok(())
    }
}

/// Body of `POST /topup/mock`.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,

    /// Credit amount in credits, must be positive
    pub amount_credits: i64,
}

impl TopupRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.amount_credits <= 0 {
            return Err("amount_credits must be a positive integer".to_string());
        }
        Ok(())
    }
}

/// Body of `POST /topup/reset`.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// Success body of a deduct: `{ "ok": true, "new_balance": … }`.
#[derive(Debug, Serialize)]
pub struct DeductResponse {
    pub ok: bool,
    pub new_balance: i64,
}

/// Success body of a top-up: `{ "ok": true }`.
#[derive(Debug, Serialize)]
pub struct TopupResponse {
    pub ok: bool,
}

/// Success body of a reset.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub previous_balance_credits: i64,
    pub new_balance_credits: i64,
}

/// The 402 paywall envelope, advertising the price and where to top up.
///
/// Field order is the wire shape; replays must be byte-identical.
#[derive(Debug, Serialize)]
pub struct PaywallEnvelope {
    pub price_credits: i64,
    pub currency: &'static str,
    pub topup_url: String,
}

impl PaywallEnvelope {
    pub fn new(price_credits: i64, user_id: Uuid) -> Self {
        Self {
            price_credits,
            currency: "USDC",
            topup_url: format!("/topup?need={price_credits}&user={user_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduct_request_parses_wire_names() {
        let request: DeductRequest = serde_json::from_str(
            r#"{"amount_credits":5,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#,
        )
        .unwrap();

        assert_eq!(
            request.user_id,
            "9c0383a1-0887-4c0f-98ca-cb71ffc4e76c".parse::<Uuid>().unwrap()
        );
        assert_eq!(request.ledger_ref, "demo-ref");
        assert_eq!(request.amount_credits, 5);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn deduct_request_rejects_short_ref_and_bad_amounts() {
        let base = |amount: i64, ledger_ref: &str| DeductRequest {
            user_id: Uuid::new_v4(),
            ledger_ref: ledger_ref.to_string(),
            amount_credits: amount,
            metadata: None,
        };

        assert!(base(5, "demo-ref").validate().is_ok());
        assert!(base(5, "short").validate().is_err());
        assert!(base(0, "demo-ref").validate().is_err());
        assert!(base(-1, "demo-ref").validate().is_err());
    }

    #[test]
    fn deduct_request_rejects_non_uuid_user() {
        let result = serde_json::from_str::<DeductRequest>(
            r#"{"amount_credits":5,"ref":"demo-ref","userId":"not-a-uuid"}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn deduct_request_rejects_fractional_amount() {
        let result = serde_json::from_str::<DeductRequest>(
            r#"{"amount_credits":5.5,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn paywall_envelope_matches_wire_shape_exactly() {
        let user: Uuid = "9c0383a1-0887-4c0f-98ca-cb71ffc4e76c".parse().unwrap();
        let envelope = PaywallEnvelope::new(5, user);

        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"price_credits":5,"currency":"USDC","topup_url":"/topup?need=5&user=9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#
        );
    }
}
