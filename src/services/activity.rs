use crate::config::EndpointConfig;
use crate::error::{BotError, BotResult};
use crate::models::{
    ActivityMetadata, ActivityRequest, ActivityResponse, ActivityResult, ActivityType, UserInfo,
};
use crate::services::http_client::{ApiRequest, RetryClient};
use crate::services::session_manager::Session;
use crate::utils::utc_millis_now;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

fn duplicate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)already recorded today|今日已完成").expect("duplicate pattern is valid")
    })
}

/// 按响应内容判定活动结果
pub fn classify(response: &ActivityResponse) -> ActivityResult {
    if let Some(id) = response.recorded_id() {
        return ActivityResult::Recorded(id);
    }

    match response.message.as_deref() {
        Some(message) if duplicate_pattern().is_match(message) => {
            ActivityResult::AlreadyCompleted(message.to_string())
        }
        Some(message) if !message.is_empty() => ActivityResult::Failed(message.to_string()),
        _ => ActivityResult::Failed("response carried neither activity id nor message".to_string()),
    }
}

/// 活动执行器：签到、游戏、对话活动上报，以及积分查询
pub struct ActivityExecutor {
    client: Arc<RetryClient>,
    api_base_url: String,
}

impl ActivityExecutor {
    pub fn new(endpoints: &EndpointConfig, client: Arc<RetryClient>) -> Self {
        Self {
            client,
            api_base_url: endpoints.api_base_url.clone(),
        }
    }

    pub async fn check_in(&self, session: &Session) -> ActivityResult {
        self.submit(session, ActivityType::Login, None).await
    }

    pub async fn play_game(&self, session: &Session) -> ActivityResult {
        self.submit(session, ActivityType::GamePlay, None).await
    }

    pub async fn chat_interaction(&self, session: &Session, message_length: usize) -> ActivityResult {
        self.submit(session, ActivityType::ChatInteraction, Some(message_length))
            .await
    }

    /// 当前总积分
    pub async fn fetch_balance(&self, session: &Session) -> BotResult<u64> {
        let request = ApiRequest::get(format!("{}/tokens/user/me", self.api_base_url))
            .headers(session.api_headers()?)
            .proxy(session.proxy.as_deref())
            .label("Balance Query");

        let value = self.client.send(&request).await?;
        let info: UserInfo = serde_json::from_value(value)?;
        Ok(info.token.points_total)
    }

    async fn submit(
        &self,
        session: &Session,
        activity_type: ActivityType,
        message_length: Option<usize>,
    ) -> ActivityResult {
        match self.try_submit(session, activity_type, message_length).await {
            Ok(response) => {
                let result = classify(&response);
                debug!(
                    "{} for {}: {}",
                    activity_type.display_name(),
                    session.masked,
                    result.label()
                );
                result
            }
            Err(e) => {
                warn!(
                    "{} for {} errored: {}",
                    activity_type.display_name(),
                    session.masked,
                    e
                );
                ActivityResult::Error(e.to_string())
            }
        }
    }

    async fn try_submit(
        &self,
        session: &Session,
        activity_type: ActivityType,
        message_length: Option<usize>,
    ) -> BotResult<ActivityResponse> {
        let body = ActivityRequest {
            activity_type,
            metadata: ActivityMetadata {
                action: activity_type.action().to_string(),
                message_length,
                timestamp: utc_millis_now(),
            },
        };

        let request = ApiRequest::post(format!("{}/tokens/activity", self.api_base_url))
            .headers(session.api_headers()?)
            .json(&body)?
            .proxy(session.proxy.as_deref())
            .label(activity_type.display_name());

        let value = self.client.send(&request).await?;
        parse_activity_response(value)
    }
}

fn parse_activity_response(value: Value) -> BotResult<ActivityResponse> {
    if !value.is_object() {
        return Err(BotError::ActivityFailure(format!(
            "unexpected activity response: {}",
            value
        )));
    }
    Ok(serde_json::from_value(value)?)
}
