use crate::error::{BotError, BotResult};
use crate::utils::{mask, proxy_scheme_summary};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const ALLOWED_SCHEMES: &[&str] = &["http://", "https://", "socks5://"];

/// 校验代理URL协议
pub fn validate_proxy(proxy: &str) -> BotResult<&str> {
    if ALLOWED_SCHEMES.iter().any(|scheme| proxy.starts_with(scheme)) {
        Ok(proxy)
    } else {
        Err(BotError::InvalidProxyFormat(proxy.to_string()))
    }
}

#[derive(Debug, Default)]
struct PoolState {
    cursor: usize,
    assignments: HashMap<String, String>, // address -> proxy
}

/// 代理池：全局轮询游标 + 每个账号固定分配
#[derive(Debug, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// 载入代理列表，空白项和协议不支持的项被丢弃；空列表不是错误
    pub fn load<I, S>(source: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let proxies: Vec<String> = source
            .into_iter()
            .map(|entry| entry.into().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .filter(|entry| match validate_proxy(entry) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Skipping proxy entry: {}", e);
                    false
                }
            })
            .collect();

        if !proxies.is_empty() {
            info!(
                "Loaded {} proxies ({})",
                proxies.len(),
                proxy_scheme_summary(&proxies)
            );
        }

        Self {
            proxies,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// 获取账号已分配的代理，首次使用时按轮询分配
    pub fn assign(&self, address: &str) -> Option<String> {
        let mut state = self.state.lock();
        if let Some(proxy) = state.assignments.get(address) {
            return Some(proxy.clone());
        }

        self.next_for(&mut state, address)
    }

    /// 为账号切换到下一个代理
    pub fn rotate(&self, address: &str) -> Option<String> {
        let mut state = self.state.lock();
        let proxy = self.next_for(&mut state, address);
        if let Some(proxy) = &proxy {
            debug!("Rotated proxy for {} to {}", mask(address), proxy);
        }
        proxy
    }

    fn next_for(&self, state: &mut PoolState, address: &str) -> Option<String> {
        let proxy = self.proxies.get(state.cursor)?.clone();
        state.assignments.insert(address.to_string(), proxy.clone());
        state.cursor = (state.cursor + 1) % self.proxies.len();
        Some(proxy)
    }
}
