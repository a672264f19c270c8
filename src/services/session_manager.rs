use crate::config::{ClientConfig, Config, EndpointConfig, ProxyConfig};
use crate::error::{BotError, BotResult};
use crate::models::{AuthenticateResponse, NonceRequest, NonceResponse};
use crate::services::http_client::{ApiRequest, RetryClient};
use crate::services::proxy_pool::ProxyPool;
use crate::services::signer::{build_signed_payload, Account};
use crate::utils::random_user_agent;
use parking_lot::RwLock;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 账号认证状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    ProxyValidating,
    NonceRequested,
    SignaturePending,
    Authenticated,
    Failed,
}

/// 三组请求头，共用同一个随机UA
#[derive(Debug, Clone, Default)]
pub struct HeaderSets {
    pub auth: HeaderMap,
    pub api: HeaderMap,
    pub chat: HeaderMap,
}

impl HeaderSets {
    pub fn build(client: &ClientConfig, user_agent: &str) -> Self {
        let referer = format!("{}/", client.origin);
        let ca_id = Uuid::new_v4().to_string();
        let origin = client.origin.as_str();
        let language = client.accept_language.as_str();

        let auth = header_map(&[
            ("Accept", "application/json"),
            ("Accept-Language", language),
            ("Origin", origin),
            ("Privy-App-Id", client.privy_app_id.as_str()),
            ("Privy-Ca-Id", ca_id.as_str()),
            ("Privy-Client", client.privy_client.as_str()),
            ("Referer", referer.as_str()),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "cross-site"),
            ("Sec-Fetch-Storage-Access", "active"),
            ("User-Agent", user_agent),
        ]);

        let api = header_map(&[
            ("Accept", "*/*"),
            ("Accept-Language", language),
            ("Origin", origin),
            ("Referer", referer.as_str()),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "same-site"),
            ("User-Agent", user_agent),
        ]);

        let mut chat_pairs = vec![
            ("Accept", "*/*"),
            ("Accept-Language", language),
            ("Origin", origin),
            ("Referer", referer.as_str()),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "cross-site"),
            ("User-Agent", user_agent),
        ];
        if let Some(key) = &client.chat_api_key {
            chat_pairs.push(("X-Api-Key", key.as_str()));
        }
        let chat = header_map(&chat_pairs);

        Self { auth, api, chat }
    }
}

// 无法表示为请求头的取值直接跳过
fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {}", name),
        }
    }
    headers
}

/// 单个账号的会话状态
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: AuthPhase,
    pub token: Option<String>,
    pub headers: HeaderSets,
    pub proxy: Option<String>,
}

/// 已认证的账号上下文，供活动执行与对话使用
#[derive(Debug, Clone)]
pub struct Session {
    pub masked: String,
    pub token: String,
    pub headers: HeaderSets,
    pub proxy: Option<String>,
}

impl Session {
    pub fn api_headers(&self) -> BotResult<HeaderMap> {
        self.with_bearer(&self.headers.api)
    }

    pub fn chat_headers(&self) -> BotResult<HeaderMap> {
        self.with_bearer(&self.headers.chat)
    }

    fn with_bearer(&self, base: &HeaderMap) -> BotResult<HeaderMap> {
        let mut headers = base.clone();
        let value = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|_| {
            BotError::AuthenticationFailure("token is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

/// 每轮运行独享的会话表：address -> SessionState
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以新的请求头重置账号会话
    pub fn reset(&self, address: &str, headers: HeaderSets) {
        self.sessions.write().insert(
            address.to_string(),
            SessionState {
                phase: AuthPhase::Unauthenticated,
                token: None,
                headers,
                proxy: None,
            },
        );
    }

    pub fn get(&self, address: &str) -> Option<SessionState> {
        self.sessions.read().get(address).cloned()
    }

    fn update<F: FnOnce(&mut SessionState)>(&self, address: &str, f: F) {
        if let Some(state) = self.sessions.write().get_mut(address) {
            f(state);
        }
    }

    fn set_phase(&self, address: &str, phase: AuthPhase) {
        self.update(address, |state| state.phase = phase);
    }
}

/// 会话管理器：连通性检查 -> 获取 nonce -> 签名 -> 换取 token
pub struct SessionManager {
    client: Arc<RetryClient>,
    proxies: Arc<ProxyPool>,
    store: Arc<SessionStore>,
    endpoints: EndpointConfig,
    client_config: ClientConfig,
    proxy_config: ProxyConfig,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        client: Arc<RetryClient>,
        proxies: Arc<ProxyPool>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            client,
            proxies,
            store,
            endpoints: config.endpoints.clone(),
            client_config: config.client.clone(),
            proxy_config: config.proxy.clone(),
        }
    }

    /// 为账号生成新的请求头并回到未认证状态
    pub fn begin<R: Rng + ?Sized>(&self, account: &Account, rng: &mut R) {
        let headers = HeaderSets::build(&self.client_config, random_user_agent(rng));
        self.store.reset(account.address(), headers);
    }

    /// 完整认证流程；失败时会话停在 Failed
    pub async fn authenticate(&self, account: &Account) -> BotResult<Session> {
        let address = account.address();
        if self.store.get(address).is_none() {
            self.store.reset(
                address,
                HeaderSets::build(&self.client_config, random_user_agent(&mut rand::thread_rng())),
            );
        }

        match self.run_authentication(account).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.store.set_phase(address, AuthPhase::Failed);
                warn!("Login failed for {}: {}", account.masked(), e);
                Err(e)
            }
        }
    }

    async fn run_authentication(&self, account: &Account) -> BotResult<Session> {
        let address = account.address();

        self.store.set_phase(address, AuthPhase::ProxyValidating);
        let proxy = self.validate_connectivity(account).await?;
        self.store.update(address, |state| state.proxy = proxy.clone());

        let headers = self
            .store
            .get(address)
            .map(|state| state.headers)
            .unwrap_or_default();

        self.store.set_phase(address, AuthPhase::NonceRequested);
        let nonce = self
            .request_nonce(address, &headers.auth, proxy.as_deref())
            .await?;

        self.store.set_phase(address, AuthPhase::SignaturePending);
        let payload = build_signed_payload(account, &nonce)?;

        let request = ApiRequest::post(format!(
            "{}/api/v1/siwe/authenticate",
            self.endpoints.auth_base_url
        ))
        .headers(headers.auth.clone())
        .json(&payload)?
        .proxy(proxy.as_deref())
        .label("Authentication");

        let value = self
            .client
            .send(&request)
            .await
            .map_err(|e| BotError::AuthenticationFailure(e.to_string()))?;
        let auth: AuthenticateResponse = serde_json::from_value(value).map_err(|e| {
            BotError::AuthenticationFailure(format!("token missing from response: {}", e))
        })?;

        self.store.update(address, |state| {
            state.token = Some(auth.token.clone());
            state.phase = AuthPhase::Authenticated;
        });
        info!("Login success for {}", account.masked());

        Ok(Session {
            masked: account.masked(),
            token: auth.token,
            headers,
            proxy,
        })
    }

    async fn request_nonce(
        &self,
        address: &str,
        headers: &HeaderMap,
        proxy: Option<&str>,
    ) -> BotResult<String> {
        let request = ApiRequest::post(format!("{}/api/v1/siwe/init", self.endpoints.auth_base_url))
            .headers(headers.clone())
            .json(&NonceRequest {
                address: address.to_string(),
            })?
            .proxy(proxy)
            .label("Nonce Retrieval");

        let value = self
            .client
            .send(&request)
            .await
            .map_err(|e| BotError::AuthenticationFailure(e.to_string()))?;
        let nonce: NonceResponse = serde_json::from_value(value).map_err(|e| {
            BotError::AuthenticationFailure(format!("nonce missing from response: {}", e))
        })?;

        Ok(nonce.nonce)
    }

    /// 连通性检查，返回本次使用的代理（直连为 None）
    ///
    /// 开启轮换时最多探测 `pool.len()` 次，全部失败即放弃。
    async fn validate_connectivity(&self, account: &Account) -> BotResult<Option<String>> {
        let address = account.address();
        let ip_url = &self.endpoints.ip_check_url;

        if !self.proxy_config.enabled || self.proxies.is_empty() {
            return match self.client.probe(ip_url, None).await {
                Ok(ip) => {
                    debug!("Current IP (direct): {}", ip);
                    Ok(None)
                }
                Err(e) if self.proxy_config.enabled => {
                    warn!("No proxies available, proceeding without proxy ({})", e);
                    Ok(None)
                }
                Err(e) => Err(BotError::ConnectivityFailure(e.to_string())),
            };
        }

        let max_probes = if self.proxy_config.rotate_on_failure {
            self.proxies.len()
        } else {
            1
        };

        let mut proxy = self.proxies.assign(address);
        let mut last_error = String::new();
        for probe in 1..=max_probes {
            let current = proxy.as_deref();
            match self.client.probe(ip_url, current).await {
                Ok(ip) => {
                    debug!("Current IP via proxy: {}", ip);
                    return Ok(proxy);
                }
                Err(e) => {
                    warn!(
                        "Proxy connection failed for {} via {}: {}",
                        account.masked(),
                        current.unwrap_or("direct"),
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if probe < max_probes {
                proxy = self.proxies.rotate(address);
                info!(
                    "Switching proxy for {} to {}",
                    account.masked(),
                    proxy.as_deref().unwrap_or("direct")
                );
                tokio::time::sleep(self.client.policy().backoff()).await;
            }
        }

        Err(BotError::ConnectivityFailure(format!(
            "{} proxy probe(s) failed, last error: {}",
            max_probes, last_error
        )))
    }
}
