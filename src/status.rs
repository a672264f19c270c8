//! 运行状态事件，供控制台等展示层消费

use crate::models::ActivityResult;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Credential,
    Proxy,
    Login,
    Balance,
    CheckIn,
    Game,
    Chat,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Credential => "Credential",
            Operation::Proxy => "Proxy",
            Operation::Login => "Login",
            Operation::Balance => "Balance",
            Operation::CheckIn => "Daily Check-In",
            Operation::Game => "Game Play",
            Operation::Chat => "AI Chat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AlreadyCompleted,
    Failed,
    Error,
    Info,
}

impl From<&ActivityResult> for Outcome {
    fn from(result: &ActivityResult) -> Self {
        match result {
            ActivityResult::Recorded(_) => Outcome::Success,
            ActivityResult::AlreadyCompleted(_) => Outcome::AlreadyCompleted,
            ActivityResult::Failed(_) => Outcome::Failed,
            ActivityResult::Error(_) => Outcome::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// 脱敏后的账号
    pub account: String,
    pub operation: Operation,
    pub outcome: Outcome,
    pub message: String,
}

/// 单个账号一轮处理的汇总
#[derive(Debug, Clone, Default)]
pub struct AccountReport {
    pub account: String,
    pub logged_in: bool,
    pub points: Option<u64>,
    pub check_in: Option<ActivityResult>,
    pub game: Option<ActivityResult>,
    pub chat: Option<ActivityResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub total_accounts: usize,
    pub active_accounts: usize,
    pub total_points: u64,
}

impl CycleSummary {
    pub fn record(&mut self, report: &AccountReport) {
        if report.logged_in {
            self.active_accounts += 1;
        }
        self.total_points += report.points.unwrap_or(0);
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    CycleStarted {
        cycle: u64,
        total_accounts: usize,
        proxy_rotation: bool,
    },
    AccountStarted {
        index: usize,
        total: usize,
        account: String,
    },
    Status(StatusEvent),
    AccountFinished(AccountReport),
    CycleFinished(CycleSummary),
    Countdown {
        remaining_secs: u64,
    },
    Stopped,
}

/// 状态事件发送端；接收端关闭后事件被丢弃
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl StatusSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(
        &self,
        account: &str,
        operation: Operation,
        outcome: Outcome,
        message: impl Into<String>,
    ) {
        self.emit(RunEvent::Status(StatusEvent {
            account: account.to_string(),
            operation,
            outcome,
            message: message.into(),
        }));
    }
}
