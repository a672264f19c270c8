//! 对话服务的 SSE 流解码
//!
//! 每个 `data:` 帧是一段 JSON，取其中 `messages` 里 `type == "ai"` 的 `content`，
//! 按到达顺序拼接成最终回答。

use crate::error::{BotError, BotResult};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    messages: Vec<StreamMessage>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type", default)]
    message_type: String,
    #[serde(default)]
    content: serde_json::Value,
}

/// 从单个帧中提取 AI 文本；非 JSON 帧返回错误
pub fn ai_content(data: &str) -> BotResult<String> {
    let frame: StreamFrame = serde_json::from_str(data)
        .map_err(|e| BotError::StreamParseError(format!("malformed frame: {}", e)))?;

    Ok(frame
        .messages
        .iter()
        .filter(|m| m.message_type == "ai")
        .filter_map(|m| m.content.as_str())
        .collect())
}

/// 回答累加器
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    answer: String,
    frames: usize,
    skipped: usize,
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个 `data` 负载；空负载和坏帧被跳过
    pub fn push_frame(&mut self, data: &str) {
        let data = data.trim();
        if data.is_empty() {
            return;
        }

        self.frames += 1;
        match ai_content(data) {
            Ok(text) => self.answer.push_str(&text),
            Err(e) => {
                self.skipped += 1;
                debug!("Skipping stream frame: {}", e);
            }
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> String {
        self.answer
    }
}

/// 按 `\n` 切分字节块；多字节字符跨块时不会被截断
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个块，返回其中已完整的行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// 流结束时剩下的最后一行（没有换行结尾）
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// 取出 `data:` 行的负载；空行、注释行和其他字段返回 None
fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

/// 消费整条字节流并组装回答
///
/// 每个 `data:` 行单独解析。传输中断直接返回错误，已收到的部分内容被丢弃。
pub async fn collect_answer<S, B, E>(stream: S) -> BotResult<String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut chunks = Box::pin(stream);
    let mut lines = LineBuffer::new();
    let mut accumulator = AnswerAccumulator::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk
            .map_err(|e| BotError::StreamParseError(format!("stream interrupted: {}", e)))?;
        for line in lines.push(chunk.as_ref()) {
            if let Some(data) = data_payload(&line) {
                accumulator.push_frame(data);
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(data) = data_payload(&line) {
            accumulator.push_frame(data);
        }
    }

    if accumulator.skipped() > 0 {
        debug!("{} stream frame(s) could not be decoded", accumulator.skipped());
    }
    Ok(accumulator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::DEFAULT_STREAM;
    use futures_util::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> {
        let owned: Vec<Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[test]
    fn test_ai_content_filters_by_type() {
        let text = ai_content(
            r#"{"messages":[{"type":"human","content":"q"},{"type":"ai","content":"a"},{"type":"ai","content":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(text, "ab");

        assert_eq!(ai_content(r#"{"run_id":"x"}"#).unwrap(), "");
        assert!(ai_content("not json").is_err());
    }

    #[test]
    fn test_accumulator_skips_bad_frames() {
        let mut acc = AnswerAccumulator::new();
        acc.push_frame(r#"{"messages":[{"type":"ai","content":"Hi"}]}"#);
        acc.push_frame("{broken");
        acc.push_frame("");
        acc.push_frame(r#"{"messages":[{"type":"ai","content":" there"}]}"#);

        assert_eq!(acc.skipped(), 1);
        assert_eq!(acc.finish(), "Hi there");
    }

    #[tokio::test]
    async fn test_collects_answer_across_frames() {
        let answer = collect_answer(chunks(&[DEFAULT_STREAM])).await.unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let body = "data: {\"messages\":[{\"type\":\"ai\",\"content\":\"Hel\"}]}\n\ndata: {\"messages\":[{\"type\":\"ai\",\"content\":\"lo\"}]}\n\n";
        let (a, b) = body.split_at(17);
        let (b, c) = b.split_at(30);

        let answer = collect_answer(chunks(&[a, b, c])).await.unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let body = "data: {oops\n\ndata: {\"messages\":[{\"type\":\"ai\",\"content\":\"ok\"}]}\n\n";
        let answer = collect_answer(chunks(&[body])).await.unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn test_transport_error_discards_partial_answer() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"messages\":[{\"type\":\"ai\",\"content\":\"Hel\"}]}\n\n".to_vec()),
            Err("connection reset".to_string()),
        ];

        let err = collect_answer(stream::iter(parts)).await.unwrap_err();
        assert!(matches!(err, BotError::StreamParseError(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_empty_stream_yields_empty_answer() {
        let answer = collect_answer(chunks(&[])).await.unwrap();
        assert!(answer.is_empty());
    }

    #[tokio::test]
    async fn test_data_lines_without_blank_separator() {
        let body = "data: {\"messages\":[{\"type\":\"ai\",\"content\":\"Hel\"}]}\ndata: {\"messages\":[{\"type\":\"ai\",\"content\":\"lo\"}]}\n";
        let answer = collect_answer(chunks(&[body])).await.unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn test_final_line_without_newline_is_kept() {
        let body = "data: {\"messages\":[{\"type\":\"ai\",\"content\":\"Hel\"}]}\r\n\r\ndata: {\"messages\":[{\"type\":\"ai\",\"content\":\"lo\"}]}";
        let answer = collect_answer(chunks(&[body])).await.unwrap();
        assert_eq!(answer, "Hello");
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_split() {
        let bytes = "data: 你好\n".as_bytes();
        let mut buffer = LineBuffer::new();

        assert!(buffer.push(&bytes[..7]).is_empty());
        assert_eq!(buffer.push(&bytes[7..]), vec!["data: 你好".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_data_payload_ignores_other_lines() {
        assert_eq!(data_payload("data: {}\r"), Some("{}"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": heartbeat"), None);
        assert_eq!(data_payload("event: values"), None);
        assert_eq!(data_payload("   "), None);
    }
}
