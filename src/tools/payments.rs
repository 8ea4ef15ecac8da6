//! Fee and exchange-rate lookups against fixed tables.

use super::function::FunctionTool;
use serde::{Deserialize, Serialize};

const FEES: &[(&str, f64)] = &[
    ("platinum credit card", 0.02),
    ("gold debit card", 0.035),
    ("bank transfer", 0.01),
];

const RATES: &[(&str, &str, f64)] = &[
    ("usd", "eur", 0.93),
    ("usd", "jpy", 157.50),
    ("usd", "inr", 83.58),
];

/// Result of [`get_fee_for_payment_method`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FeeLookup {
    Success { fee_percentage: f64 },
    Error { error_message: String },
}

/// Result of [`get_exchange_rate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RateLookup {
    Success { rate: f64 },
    Error { error_message: String },
}

/// Transaction fee for a payment method. Matching ignores case.
pub fn get_fee_for_payment_method(method: &str) -> FeeLookup {
    let wanted = method.trim().to_lowercase();
    match FEES.iter().find(|(name, _)| *name == wanted) {
        Some((_, fee)) => FeeLookup::Success {
            fee_percentage: *fee,
        },
        None => FeeLookup::Error {
            error_message: format!("Payment method '{}' not found", method),
        },
    }
}

/// Conversion rate from `base_currency` to `target_currency`. Matching
/// ignores case.
pub fn get_exchange_rate(base_currency: &str, target_currency: &str) -> RateLookup {
    let base = base_currency.trim().to_lowercase();
    let target = target_currency.trim().to_lowercase();
    match RATES.iter().find(|(b, t, _)| *b == base && *t == target) {
        Some((_, _, rate)) => RateLookup::Success { rate: *rate },
        None => RateLookup::Error {
            error_message: format!(
                "Unsupported currency pair: {}/{}",
                base_currency, target_currency
            ),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct FeeArgs {
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct RateArgs {
    pub base_currency: String,
    pub target_currency: String,
}

pub type FeeTool = FunctionTool<FeeArgs, FeeLookup, fn(FeeArgs) -> FeeLookup>;
pub type RateTool = FunctionTool<RateArgs, RateLookup, fn(RateArgs) -> RateLookup>;

/// `get_fee_for_payment_method` as a tool.
pub fn fee_lookup_tool() -> FeeTool {
    FunctionTool::new(
        "get_fee_for_payment_method",
        "Looks up the transaction fee percentage for a given payment method. \
         Returns {\"status\": \"success\", \"fee_percentage\": value} or \
         {\"status\": \"error\", \"error_message\": ...}.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "description": "Payment method, e.g. 'Bank Transfer'"
                }
            },
            "required": ["method"]
        }),
        (|args: FeeArgs| get_fee_for_payment_method(&args.method)) as fn(FeeArgs) -> FeeLookup,
    )
}

/// `get_exchange_rate` as a tool.
pub fn exchange_rate_tool() -> RateTool {
    FunctionTool::new(
        "get_exchange_rate",
        "Looks up and returns the exchange rate between two currencies.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "base_currency": {
                    "type": "string",
                    "description": "ISO code of the currency converted from, e.g. 'USD'"
                },
                "target_currency": {
                    "type": "string",
                    "description": "ISO code of the currency converted to, e.g. 'INR'"
                }
            },
            "required": ["base_currency", "target_currency"]
        }),
        (|args: RateArgs| get_exchange_rate(&args.base_currency, &args.target_currency))
            as fn(RateArgs) -> RateLookup,
    )
}
