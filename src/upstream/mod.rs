//! USGS 地震事件目录客户端

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::models::EventRequest;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("upstream timed out")]
    Timeout,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if let Some(status) = err.status() {
            UpstreamError::Status(status.as_u16())
        } else {
            UpstreamError::Request(err.to_string())
        }
    }
}

/// 将请求翻译为上游的查询参数
pub fn query_params(request: &EventRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![("format", "geojson".to_string())];
    match request {
        EventRequest::Search(filter) => params.extend(filter.upstream_params()),
        EventRequest::Event(id) => params.push(("eventid", id.clone())),
    }
    params
}

/// 只读事件目录
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn fetch(&self, request: &EventRequest) -> Result<Bytes, UpstreamError>;
}

pub struct UsgsClient {
    http: reqwest::Client,
    query_url: String,
}

impl UsgsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            http,
            query_url: format!("{}/query", base_url.trim_end_matches('/')),
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

#[async_trait]
impl EventCatalog for UsgsClient {
    async fn fetch(&self, request: &EventRequest) -> Result<Bytes, UpstreamError> {
        let response = self
            .http
            .get(&self.query_url)
            .query(&query_params(request))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?)
    }
}
