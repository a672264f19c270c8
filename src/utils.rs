use crate::error::{BotError, BotResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/108.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/108.0",
];

/// 毫秒精度的UTC时间戳，以字面量 `Z` 结尾
pub fn utc_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 当前时间的毫秒精度时间戳
pub fn utc_millis_now() -> String {
    utc_millis(Utc::now())
}

/// 随机选择浏览器UA
pub fn random_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// 脱敏显示：保留前6位和后4位
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "Invalid Key".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// 秒数格式化为 HH:MM:SS
pub fn format_countdown(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// 读取按行分隔的文本文件，去除空白行
pub fn load_lines(path: impl AsRef<Path>) -> BotResult<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_lines(&content))
}

pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// 读取问题列表（JSON字符串数组）
pub fn load_questions(path: impl AsRef<Path>) -> BotResult<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        BotError::ConfigError(format!("{} could not be read: {}", path.display(), e))
    })?;
    let questions: Vec<String> = serde_json::from_str(&content).map_err(|e| {
        BotError::ConfigError(format!("Invalid JSON in {}: {}", path.display(), e))
    })?;

    if questions.is_empty() {
        return Err(BotError::EmptyQuestionPool);
    }

    Ok(questions)
}

/// 统计代理协议类型，例如 "http: 3, socks5: 2"
pub fn proxy_scheme_summary(proxies: &[String]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for proxy in proxies {
        let scheme = proxy.split_once("://").map(|(s, _)| s).unwrap_or("unknown");
        *counts.entry(scheme).or_insert(0) += 1;
    }

    counts
        .iter()
        .map(|(scheme, count)| format!("{}: {}", scheme, count))
        .collect::<Vec<_>>()
        .join(", ")
}
