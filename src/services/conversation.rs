use crate::config::EndpointConfig;
use crate::error::{BotError, BotResult};
use crate::models::{ActivityResult, CreateThreadRequest, RunStreamRequest, ThreadResponse};
use crate::services::activity::ActivityExecutor;
use crate::services::http_client::{ApiRequest, RetryClient};
use crate::services::session_manager::Session;
use crate::services::stream_decoder::collect_answer;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderValue, ACCEPT};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 一轮对话的结果
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub question: String,
    pub answer: String,
    pub activity: ActivityResult,
}

/// 对话驱动：建线程 -> 流式提问 -> 上报对话活动
pub struct ConversationDriver {
    client: Arc<RetryClient>,
    activities: Arc<ActivityExecutor>,
    chat_base_url: String,
}

impl ConversationDriver {
    pub fn new(
        endpoints: &EndpointConfig,
        client: Arc<RetryClient>,
        activities: Arc<ActivityExecutor>,
    ) -> Self {
        Self {
            client,
            activities,
            chat_base_url: endpoints.chat_base_url.clone(),
        }
    }

    pub async fn converse<R: Rng + ?Sized>(
        &self,
        session: &Session,
        questions: &[String],
        rng: &mut R,
    ) -> BotResult<ConversationOutcome> {
        if questions.is_empty() {
            return Err(BotError::EmptyQuestionPool);
        }

        let thread_id = self.create_thread(session).await?;
        let question = questions
            .choose(rng)
            .cloned()
            .ok_or(BotError::EmptyQuestionPool)?;
        info!("[{}] Q: {}", session.masked, question);

        let answer = self.stream_answer(session, &thread_id, &question).await?;
        info!("[{}] A: {}", session.masked, answer);

        // 以字符数计长度
        let activity = self
            .activities
            .chat_interaction(session, question.chars().count())
            .await;

        Ok(ConversationOutcome {
            question,
            answer,
            activity,
        })
    }

    pub async fn create_thread(&self, session: &Session) -> BotResult<String> {
        let request = ApiRequest::post(format!("{}/threads", self.chat_base_url))
            .headers(session.chat_headers()?)
            .json(&CreateThreadRequest::default())?
            .proxy(session.proxy.as_deref())
            .label("AI Chat Init");

        let value = self.client.send(&request).await?;
        let thread: ThreadResponse = serde_json::from_value(value)?;
        debug!("Created thread {} for {}", thread.thread_id, session.masked);
        Ok(thread.thread_id)
    }

    /// 流式获取回答；空回答按失败处理并整体重试
    pub async fn stream_answer(
        &self,
        session: &Session,
        thread_id: &str,
        question: &str,
    ) -> BotResult<String> {
        let mut headers = session.chat_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let request = ApiRequest::post(format!(
            "{}/threads/{}/runs/stream",
            self.chat_base_url, thread_id
        ))
        .headers(headers)
        .json(&RunStreamRequest::human(Uuid::new_v4().to_string(), question))?
        .proxy(session.proxy.as_deref());

        let attempts = self.client.policy().max_attempts;
        let request = &request;
        self.client
            .with_retries("AI Chat Response", attempts, move |_| async move {
                let response = self.client.open(request).await?;
                let answer = collect_answer(response.bytes_stream()).await?;
                if answer.is_empty() {
                    return Err(BotError::StreamParseError(
                        "stream ended without an answer".to_string(),
                    ));
                }
                Ok(answer)
            })
            .await
    }
}
