use crate::error::Result;
use std::time::Duration;

/// Status and body of a device reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: String,
}

impl DeviceResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Idempotent GET/PUT access to a station's web service.
///
/// Implementations apply their own per-call timeout. A reply with any status
/// code is `Ok`; only failures to send or receive are errors.
#[async_trait::async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<DeviceResponse>;
    async fn put(&self, url: &str) -> Result<DeviceResponse>;
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chargegate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn read_response(resp: reqwest::Response) -> Result<DeviceResponse> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(DeviceResponse { status, body })
    }
}

#[async_trait::async_trait]
impl DeviceTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<DeviceResponse> {
        let resp = self.client.get(url).send().await?;
        Self::read_response(resp).await
    }

    async fn put(&self, url: &str) -> Result<DeviceResponse> {
        let resp = self.client.put(url).send().await?;
        Self::read_response(resp).await
    }
}
