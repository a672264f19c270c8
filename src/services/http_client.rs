use crate::config::RetryConfig;
use crate::error::{BotError, BotResult};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, Proxy, Response};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 一次API请求的描述，重试时原样重放
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    pub label: String,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method,
            label: url.clone(),
            url,
            headers: HeaderMap::new(),
            body: None,
            proxy: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> BotResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_string);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// 带重试策略的HTTP客户端
///
/// 每个代理（以及直连）缓存一个 `reqwest::Client`。
pub struct RetryClient {
    policy: RetryConfig,
    clients: RwLock<HashMap<Option<String>, Client>>,
}

impl RetryClient {
    pub fn new(policy: RetryConfig) -> Self {
        Self {
            policy,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    /// 发送请求并解析JSON，失败时按策略重试
    pub async fn send(&self, request: &ApiRequest) -> BotResult<Value> {
        self.with_retries(&request.label, self.policy.max_attempts, move |_| async move {
            let response = self.open(request).await?;
            Ok::<_, BotError>(response.json::<Value>().await?)
        })
        .await
    }

    /// 预热等待后执行 `op`，失败则退避重试，直到成功或次数耗尽
    pub async fn with_retries<T, F, Fut>(&self, label: &str, max_attempts: u32, mut op: F) -> BotResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = BotResult<T>>,
    {
        let max_attempts = max_attempts.max(1);
        tokio::time::sleep(self.policy.warmup()).await;

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        debug!("{} attempt {}/{} failed: {}", label, attempt, max_attempts, e);
                        tokio::time::sleep(self.policy.backoff()).await;
                    }
                }
            }
        }

        warn!("{} Failed ({})", label, last_error);
        Err(BotError::TransportError {
            attempts: max_attempts,
            message: last_error,
        })
    }

    /// 单次请求：建立连接、发送、检查状态码
    pub async fn open(&self, request: &ApiRequest) -> BotResult<Response> {
        let client = self.client_for(request.proxy.as_deref())?;
        let timeout = request.timeout.unwrap_or_else(|| self.policy.request_timeout());

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(timeout);

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::UnexpectedStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        Ok(response)
    }

    /// 连通性探测：单次 GET 出口IP查询接口
    pub async fn probe(&self, url: &str, proxy: Option<&str>) -> BotResult<String> {
        let request = ApiRequest::get(url)
            .proxy(proxy)
            .timeout(self.policy.probe_timeout());
        let body: Value = self.open(&request).await?.json().await?;

        Ok(body
            .get("ip")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string())
    }

    fn client_for(&self, proxy: Option<&str>) -> BotResult<Client> {
        let key = proxy.map(str::to_string);
        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder();
        builder = match proxy {
            Some(url) => builder.proxy(
                Proxy::all(url).map_err(|_| BotError::InvalidProxyFormat(url.to_string()))?,
            ),
            None => builder.no_proxy(),
        };
        let client = builder.build()?;

        self.clients.write().insert(key, client.clone());
        Ok(client)
    }
}
