use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

// 身份服务（SIWE）相关结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub message: String,
    pub signature: String,
    pub chain_id: String,
    pub wallet_client_type: String,
    pub connector_type: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateResponse {
    pub token: String,
}

// 应用API相关结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub token: UserTokenInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTokenInfo {
    #[serde(default, deserialize_with = "lenient_points")]
    pub points_total: u64,
}

/// 积分可能是整数、小数、负数或字符串；统一截断为非负整数
fn lenient_points<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let points = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.max(0.0) as u64),
        _ => None,
    };
    Ok(points.unwrap_or(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Login,
    GamePlay,
    ChatInteraction,
}

impl ActivityType {
    pub fn action(&self) -> &'static str {
        match self {
            ActivityType::Login => "user_login",
            ActivityType::GamePlay => "user_game",
            ActivityType::ChatInteraction => "user_chat",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityType::Login => "Daily Check-In",
            ActivityType::GamePlay => "Game Play",
            ActivityType::ChatInteraction => "Chat Activity",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
    pub activity_type: ActivityType,
    pub metadata: ActivityMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityMetadata {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_length: Option<usize>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub activity_id: Option<Value>,
    pub message: Option<String>,
}

impl ActivityResponse {
    /// 活动ID；数字ID转为字符串，null 和空串视为缺失
    pub fn recorded_id(&self) -> Option<String> {
        match self.activity_id.as_ref()? {
            Value::Null => None,
            Value::String(id) if id.is_empty() => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// 单次活动调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityResult {
    /// 服务端返回了活动ID
    Recorded(String),
    /// 当天已完成
    AlreadyCompleted(String),
    /// 服务端返回了其他消息
    Failed(String),
    /// 重试耗尽或响应无法解析
    Error(String),
}

impl ActivityResult {
    /// 已记录或当天已完成都视为完成
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            ActivityResult::Recorded(_) | ActivityResult::AlreadyCompleted(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityResult::Recorded(_) => "recorded",
            ActivityResult::AlreadyCompleted(_) => "already completed",
            ActivityResult::Failed(_) => "failed",
            ActivityResult::Error(_) => "error",
        }
    }
}

impl fmt::Display for ActivityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityResult::Recorded(id) => write!(f, "Activity Recorded ({})", id),
            ActivityResult::AlreadyCompleted(msg)
            | ActivityResult::Failed(msg)
            | ActivityResult::Error(msg) => write!(f, "{}", msg),
        }
    }
}

// 对话服务相关结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateThreadRequest {
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStreamRequest {
    pub input: RunInput,
    pub metadata: RunMetadata,
    pub stream_mode: Vec<String>,
    pub stream_resumable: bool,
    pub assistant_id: String,
    pub on_disconnect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInput {
    pub messages: Vec<InputMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub addresses: Vec<String>,
}

impl RunStreamRequest {
    pub fn human(message_id: String, question: &str) -> Self {
        Self {
            input: RunInput {
                messages: vec![InputMessage {
                    id: message_id,
                    message_type: "human".to_string(),
                    content: question.to_string(),
                }],
            },
            metadata: RunMetadata::default(),
            stream_mode: vec![
                "values".to_string(),
                "messages-tuple".to_string(),
                "custom".to_string(),
            ],
            stream_resumable: true,
            assistant_id: "agent".to_string(),
            on_disconnect: "continue".to_string(),
        }
    }
}
