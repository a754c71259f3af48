//! Pluggable payment-provider interface and the HTTP implementation.
//!
//! Credentials are injected via `ProviderConfig` and never logged.

use anyhow::{anyhow, Context, Result};
use nx_config::ProviderConfig;
use nx_schemas::{ProviderInitRequest, ProviderResponse};

#[async_trait::async_trait]
pub trait ProviderApi: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Open a checkout session; on success the response carries the hosted
    /// payment page URL and a payment token.
    async fn init_payment(&self, req: &ProviderInitRequest) -> Result<ProviderResponse>;

    /// Authoritative status of a transaction, queried server-to-server.
    async fn check_payment(&self, transaction_id: &str) -> Result<ProviderResponse>;
}

#[derive(Clone)]
pub struct HttpProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ProviderApi for HttpProvider {
    fn source_name(&self) -> &'static str {
        "http"
    }

    async fn init_payment(&self, req: &ProviderInitRequest) -> Result<ProviderResponse> {
        let resp = self
            .http
            .post(self.endpoint("/v2/payment"))
            .json(req)
            .send()
            .await
            .context("provider init request failed")?;

        let status = resp.status();
        let body: ProviderResponse = resp
            .json()
            .await
            .context("provider init response decode failed")?;

        if !status.is_success() {
            return Err(anyhow!(
                "provider init http error status={} code={} message={}",
                status.as_u16(),
                body.code.as_deref().unwrap_or("-"),
                body.message.as_deref().unwrap_or("-"),
            ));
        }
        Ok(body)
    }

    async fn check_payment(&self, transaction_id: &str) -> Result<ProviderResponse> {
        let resp = self
            .http
            .post(self.endpoint("/v2/payment/check"))
            .json(&serde_json::json!({
                "apikey": self.config.api_key,
                "site_id": self.config.site_id,
                "transaction_id": transaction_id,
            }))
            .send()
            .await
            .context("provider check request failed")?;

        let status = resp.status();
        let body: ProviderResponse = resp
            .json()
            .await
            .context("provider check response decode failed")?;

        if !status.is_success() {
            return Err(anyhow!(
                "provider check http error status={} code={} message={}",
                status.as_u16(),
                body.code.as_deref().unwrap_or("-"),
                body.message.as_deref().unwrap_or("-"),
            ));
        }
        Ok(body)
    }
}
