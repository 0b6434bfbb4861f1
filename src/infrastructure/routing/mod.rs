//! HTTP client for the routing service: quotes and swap transactions

pub mod wire;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::execution::{QuoteApiClient, SwapTransactionBuilder};
use crate::shared::config::{RoutingCfg, RoutingFlavor};
use crate::shared::errors::{AppError, BuildError, QuoteFailure};
use crate::shared::types::{Quote, SwapIntent, UnsignedTransaction};

/// Routing service client. One instance serves both quoting and building,
/// so a quote is always built by the service that issued it.
pub struct HttpRoutingClient {
    http_client: Client,
    base_url: String,
    flavor: RoutingFlavor,
    api_key: Option<String>,
    slippage_mode: Option<String>,
}

impl HttpRoutingClient {
    pub fn new(cfg: &RoutingCfg, api_key: Option<String>) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| AppError::RoutingError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            flavor: cfg.flavor,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            slippage_mode: cfg.slippage_mode.clone(),
        })
    }

    /// Reads the API key from the env var named in config, if any.
    pub fn from_config(cfg: &RoutingCfg) -> Result<Self, AppError> {
        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self::new(cfg, api_key)
    }

    pub fn flavor(&self) -> RoutingFlavor {
        self.flavor
    }

    fn quote_url(&self) -> String {
        match self.flavor {
            RoutingFlavor::Enveloped => format!("{}/trade/quote", self.base_url),
            RoutingFlavor::Bare => format!("{}/quote", self.base_url),
        }
    }

    fn swap_url(&self) -> String {
        match self.flavor {
            RoutingFlavor::Enveloped => format!("{}/trade/swap", self.base_url),
            RoutingFlavor::Bare => format!("{}/swap", self.base_url),
        }
    }

    fn quote_params(&self, intent: &SwapIntent) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("inputMint", intent.input_mint().to_string()),
            ("outputMint", intent.output_mint().to_string()),
            ("amount", intent.amount().to_string()),
            ("slippageBps", intent.max_slippage_bps().to_string()),
        ];
        if self.flavor == RoutingFlavor::Enveloped {
            if let Some(mode) = &self.slippage_mode {
                params.push(("slippageMode", mode.clone()));
            }
        }
        params
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

/// Error statuses still carry a JSON body worth reading for its message.
async fn read_body(response: Response) -> Result<Value, (bool, String)> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| (true, format!("failed to read body: {}", e)))?;
    if status.is_client_error() || status.is_server_error() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err((false, format!("HTTP {}: {}", status, detail)));
    }
    serde_json::from_str(&text).map_err(|e| (false, format!("body is not JSON: {}", e)))
}

#[async_trait]
impl QuoteApiClient for HttpRoutingClient {
    async fn get_quote(&self, intent: &SwapIntent) -> Result<Quote, QuoteFailure> {
        let url = self.quote_url();
        info!("🔍 Fetching quote from: {}", url);

        let response = self
            .with_key(self.http_client.get(&url).query(&self.quote_params(intent)))
            .send()
            .await
            .map_err(|e| QuoteFailure::Transport(e.to_string()))?;
        let body = read_body(response).await.map_err(|(transport, message)| {
            if transport {
                QuoteFailure::Transport(message)
            } else {
                QuoteFailure::Service(message)
            }
        })?;

        let quote = wire::parse_quote(self.flavor, body)?;
        debug!("Quote {} via {}", quote.request_id, quote.route_summary());
        Ok(quote)
    }
}

#[async_trait]
impl SwapTransactionBuilder for HttpRoutingClient {
    async fn build_transaction(
        &self,
        quote: &Quote,
        signer: &Pubkey,
    ) -> Result<UnsignedTransaction, BuildError> {
        let url = self.swap_url();
        info!("🔧 Requesting swap transaction for quote {}", quote.request_id);

        let response = self
            .with_key(
                self.http_client
                    .post(&url)
                    .json(&wire::swap_request(self.flavor, quote, signer)),
            )
            .send()
            .await
            .map_err(|e| BuildError::new(format!("transport error: {}", e)))?;
        let body = read_body(response)
            .await
            .map_err(|(_, message)| BuildError::new(message))?;

        let unsigned = wire::parse_swap(self.flavor, body)?;
        debug!(
            "Swap transaction: {} bytes, CU limit {:?}, priority fee {:?}",
            unsigned.payload.len(),
            unsigned.compute_unit_limit,
            unsigned.prioritization_fee_lamports
        );
        Ok(unsigned)
    }
}
