//! Wire documents of the routing service and their normalization
//!
//! Both dialects are parsed from a `serde_json::Value` so the received quote
//! document can be kept and echoed back at build time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::shared::config::RoutingFlavor;
use crate::shared::errors::{BuildError, QuoteFailure};
use crate::shared::types::{Quote, RouteLeg, UnsignedTransaction};
use crate::shared::utils::generate_id;

/// Amounts arrive as strings in practice; numbers are accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn as_u64(&self, field: &str) -> Result<u64, String> {
        match self {
            Numeric::Int(v) => Ok(*v),
            Numeric::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("{} {:?}: {}", field, s, e)),
            Numeric::Float(v) => Err(format!("{} must be an integer, got {}", field, v)),
        }
    }

    fn as_f64(&self, field: &str) -> Result<f64, String> {
        let value = match self {
            Numeric::Int(v) => *v as f64,
            Numeric::Float(v) => *v,
            Numeric::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("{} {:?}: {}", field, s, e))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("{} is not finite", field))
        }
    }
}

/// `{success, response, error}` wrapper of the enveloped dialect
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    response: Option<Value>,
    error: Option<String>,
}

fn open_envelope(body: Value) -> Result<Value, String> {
    let envelope: Envelope =
        serde_json::from_value(body).map_err(|e| format!("not a response envelope: {}", e))?;
    if !envelope.success {
        return Err(envelope
            .error
            .unwrap_or_else(|| "service reported failure without a message".to_string()));
    }
    envelope
        .response
        .ok_or_else(|| "envelope has success=true but no response".to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopedQuote {
    request_id: Option<String>,
    input_mint: String,
    output_mint: String,
    in_amount: Numeric,
    out_amount: Numeric,
    min_out_amount: Numeric,
    price_impact_pct: Option<Numeric>,
    #[serde(default)]
    route_plan: Vec<EnvelopedLeg>,
    context_slot: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopedLeg {
    venue: Option<String>,
    in_amount: Option<Numeric>,
    out_amount: Option<Numeric>,
    input_mint_decimals: Option<u8>,
    output_mint_decimals: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BareQuote {
    request_id: Option<String>,
    input_mint: String,
    output_mint: String,
    in_amount: Numeric,
    out_amount: Numeric,
    other_amount_threshold: Numeric,
    price_impact_pct: Option<Numeric>,
    #[serde(default)]
    route_plan: Vec<BareLeg>,
    context_slot: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BareLeg {
    swap_info: BareSwapInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BareSwapInfo {
    label: Option<String>,
    in_amount: Option<Numeric>,
    out_amount: Option<Numeric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapDocument {
    swap_transaction: String,
    compute_unit_limit: Option<u32>,
    last_valid_block_height: Option<u64>,
    prioritization_fee_lamports: Option<u64>,
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("{}: {}", what, e))
}

fn mint(field: &str, value: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(value).map_err(|e| format!("{} {:?}: {}", field, value, e))
}

fn optional_u64(value: &Option<Numeric>, field: &str) -> Result<u64, String> {
    value.as_ref().map_or(Ok(0), |v| v.as_u64(field))
}

/// A missing price impact is not zero: the quote cannot be judged without it.
fn price_impact(value: &Option<Numeric>) -> Result<f64, String> {
    value
        .as_ref()
        .ok_or_else(|| "priceImpactPct missing".to_string())?
        .as_f64("priceImpactPct")
}

/// Normalize a quote body. Service-level failures come back as `Service`,
/// shape problems as `Malformed`.
pub fn parse_quote(flavor: RoutingFlavor, body: Value) -> Result<Quote, QuoteFailure> {
    match flavor {
        RoutingFlavor::Enveloped => {
            let raw = open_envelope(body).map_err(QuoteFailure::Service)?;
            parse_enveloped_quote(raw).map_err(QuoteFailure::Malformed)
        }
        RoutingFlavor::Bare => {
            if let Some(message) = bare_error(&body) {
                return Err(QuoteFailure::Service(message));
            }
            parse_bare_quote(body).map_err(QuoteFailure::Malformed)
        }
    }
}

fn parse_enveloped_quote(raw: Value) -> Result<Quote, String> {
    let doc: EnvelopedQuote = decode(raw.clone(), "quote")?;
    let route = doc
        .route_plan
        .iter()
        .map(|leg| {
            Ok(RouteLeg {
                venue: leg.venue.clone().unwrap_or_else(|| "unknown".to_string()),
                in_amount: optional_u64(&leg.in_amount, "routePlan.inAmount")?,
                out_amount: optional_u64(&leg.out_amount, "routePlan.outAmount")?,
                input_decimals: leg.input_mint_decimals,
                output_decimals: leg.output_mint_decimals,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Quote {
        request_id: doc.request_id.unwrap_or_else(generate_id),
        input_mint: mint("inputMint", &doc.input_mint)?,
        output_mint: mint("outputMint", &doc.output_mint)?,
        in_amount: doc.in_amount.as_u64("inAmount")?,
        out_amount: doc.out_amount.as_u64("outAmount")?,
        min_out_amount: doc.min_out_amount.as_u64("minOutAmount")?,
        price_impact_pct: price_impact(&doc.price_impact_pct)?,
        route,
        expiry_hint: doc.context_slot,
        raw,
    })
}

fn parse_bare_quote(raw: Value) -> Result<Quote, String> {
    let doc: BareQuote = decode(raw.clone(), "quote")?;
    let route = doc
        .route_plan
        .iter()
        .map(|leg| {
            Ok(RouteLeg {
                venue: leg
                    .swap_info
                    .label
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                in_amount: optional_u64(&leg.swap_info.in_amount, "swapInfo.inAmount")?,
                out_amount: optional_u64(&leg.swap_info.out_amount, "swapInfo.outAmount")?,
                input_decimals: None,
                output_decimals: None,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Quote {
        request_id: doc.request_id.unwrap_or_else(generate_id),
        input_mint: mint("inputMint", &doc.input_mint)?,
        output_mint: mint("outputMint", &doc.output_mint)?,
        in_amount: doc.in_amount.as_u64("inAmount")?,
        out_amount: doc.out_amount.as_u64("outAmount")?,
        min_out_amount: doc.other_amount_threshold.as_u64("otherAmountThreshold")?,
        // fraction on the wire: 0.004 means 0.4%
        price_impact_pct: price_impact(&doc.price_impact_pct)? * 100.0,
        route,
        expiry_hint: doc.context_slot,
        raw,
    })
}

/// Bare error documents look like `{"error": "...", "errorCode": "..."}`.
fn bare_error(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let message = match error.as_str() {
        Some(s) => s.to_string(),
        None => error.to_string(),
    };
    match body.get("errorCode").and_then(Value::as_str) {
        Some(code) => Some(format!("{} ({})", message, code)),
        None => Some(message),
    }
}

/// Request body for the build call
pub fn swap_request(flavor: RoutingFlavor, quote: &Quote, signer: &Pubkey) -> Value {
    match flavor {
        RoutingFlavor::Enveloped => serde_json::json!({
            "quoteResponse": quote.raw,
            "userPublicKey": signer.to_string(),
        }),
        RoutingFlavor::Bare => serde_json::json!({
            "quoteResponse": quote.raw,
            "userPublicKey": signer.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": "auto",
        }),
    }
}

/// Normalize a build response into an unsigned transaction.
pub fn parse_swap(flavor: RoutingFlavor, body: Value) -> Result<UnsignedTransaction, BuildError> {
    let doc = match flavor {
        RoutingFlavor::Enveloped => open_envelope(body).map_err(BuildError::new)?,
        RoutingFlavor::Bare => {
            if let Some(message) = bare_error(&body) {
                return Err(BuildError::new(message));
            }
            body
        }
    };
    let doc: SwapDocument = decode(doc, "swap response").map_err(BuildError::new)?;

    let payload = match flavor {
        RoutingFlavor::Enveloped => bs58::decode(doc.swap_transaction.trim())
            .into_vec()
            .map_err(|e| BuildError::new(format!("swapTransaction is not base58: {}", e)))?,
        RoutingFlavor::Bare => BASE64
            .decode(doc.swap_transaction.trim())
            .map_err(|e| BuildError::new(format!("swapTransaction is not base64: {}", e)))?,
    };
    if payload.is_empty() {
        return Err(BuildError::new("swapTransaction is empty"));
    }

    Ok(UnsignedTransaction {
        payload,
        compute_unit_limit: doc.compute_unit_limit,
        last_valid_block_height: doc.last_valid_block_height,
        prioritization_fee_lamports: doc.prioritization_fee_lamports,
    })
}
