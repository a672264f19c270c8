use crate::config::Config;
use crate::error::{BotError, BotResult};
use crate::models::ActivityResult;
use crate::services::{
    Account, ActivityExecutor, ConversationDriver, ProxyPool, RetryClient, Session,
    SessionManager, SessionStore,
};
use crate::status::{AccountReport, CycleSummary, Operation, Outcome, RunEvent, StatusSink};
use crate::utils::mask;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 多账号运行器：逐个账号 登录 -> 查询积分 -> 签到 -> 游戏 -> 对话，然后等待下一轮
pub struct Runner {
    config: Config,
    credentials: Vec<String>,
    questions: Vec<String>,
    proxies: Arc<ProxyPool>,
    sessions: SessionManager,
    activities: Arc<ActivityExecutor>,
    conversation: ConversationDriver,
    sink: StatusSink,
    rng: StdRng,
}

impl Runner {
    pub fn new(
        config: Config,
        credentials: Vec<String>,
        proxies: Vec<String>,
        questions: Vec<String>,
        sink: StatusSink,
    ) -> BotResult<Self> {
        if credentials.is_empty() {
            return Err(BotError::ConfigError("no accounts loaded".to_string()));
        }
        if questions.is_empty() {
            return Err(BotError::EmptyQuestionPool);
        }

        let client = Arc::new(RetryClient::new(config.retry.clone()));
        let proxies = Arc::new(ProxyPool::load(proxies));
        let sessions = SessionManager::new(
            &config,
            client.clone(),
            proxies.clone(),
            Arc::new(SessionStore::new()),
        );
        let activities = Arc::new(ActivityExecutor::new(&config.endpoints, client.clone()));
        let conversation = ConversationDriver::new(&config.endpoints, client, activities.clone());

        let rng = match config.run.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            credentials,
            questions,
            proxies,
            sessions,
            activities,
            conversation,
            sink,
            rng,
        })
    }

    /// 循环运行直到取消
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut cycle = 0;
        loop {
            cycle += 1;
            let summary = self.run_cycle(cycle, &cancel).await;
            info!(
                "Cycle {} finished: {}/{} accounts active, {} points",
                cycle, summary.active_accounts, summary.total_accounts, summary.total_points
            );

            if cancel.is_cancelled() {
                break;
            }
            if !self.countdown(self.config.run.cycle_interval(), &cancel).await {
                break;
            }
        }

        info!("Run stopped");
        self.sink.emit(RunEvent::Stopped);
    }

    async fn run_cycle(&mut self, cycle: u64, cancel: &CancellationToken) -> CycleSummary {
        let total = self.credentials.len();
        let proxy_rotation = self.config.proxy.enabled
            && self.config.proxy.rotate_on_failure
            && !self.proxies.is_empty();
        self.sink.emit(RunEvent::CycleStarted {
            cycle,
            total_accounts: total,
            proxy_rotation,
        });

        let mut summary = CycleSummary {
            cycle,
            total_accounts: total,
            ..Default::default()
        };

        for index in 0..total {
            if cancel.is_cancelled() {
                break;
            }
            if index > 0 && !pause(self.config.run.account_delay(), cancel).await {
                break;
            }

            let raw = self.credentials[index].clone();
            let report = self.process_account(index, &raw, cancel).await;
            summary.record(&report);
            self.sink.emit(RunEvent::AccountFinished(report));
        }

        self.sink.emit(RunEvent::CycleFinished(summary.clone()));
        summary
    }

    async fn process_account(
        &mut self,
        index: usize,
        raw: &str,
        cancel: &CancellationToken,
    ) -> AccountReport {
        let total = self.credentials.len();

        let account = match Account::from_credential(raw) {
            Ok(account) => account,
            Err(e) => {
                let masked = mask(raw.trim());
                warn!("Skipping account {}: {}", masked, e);
                self.sink.emit(RunEvent::AccountStarted {
                    index,
                    total,
                    account: masked.clone(),
                });
                self.sink
                    .status(&masked, Operation::Credential, Outcome::Error, e.to_string());
                return AccountReport {
                    account: masked,
                    ..Default::default()
                };
            }
        };

        let masked = account.masked();
        info!("Processing account {}/{}: {}", index + 1, total, masked);
        self.sink.emit(RunEvent::AccountStarted {
            index,
            total,
            account: masked.clone(),
        });

        let mut report = AccountReport {
            account: masked.clone(),
            ..Default::default()
        };

        self.sessions.begin(&account, &mut self.rng);
        let session = match self.sessions.authenticate(&account).await {
            Ok(session) => session,
            Err(e) => {
                let operation = match e {
                    BotError::ConnectivityFailure(_) | BotError::InvalidProxyFormat(_) => {
                        Operation::Proxy
                    }
                    _ => Operation::Login,
                };
                self.sink
                    .status(&masked, operation, Outcome::Failed, e.to_string());
                return report;
            }
        };

        self.sink.status(
            &masked,
            Operation::Proxy,
            Outcome::Info,
            session.proxy.as_deref().unwrap_or("None (Direct)"),
        );
        self.sink
            .status(&masked, Operation::Login, Outcome::Success, "Login success");
        report.logged_in = true;

        match self.activities.fetch_balance(&session).await {
            Ok(points) => {
                report.points = Some(points);
                self.sink.status(
                    &masked,
                    Operation::Balance,
                    Outcome::Info,
                    format!("{} PUMPs", points),
                );
            }
            Err(e) => {
                self.sink
                    .status(&masked, Operation::Balance, Outcome::Failed, e.to_string());
            }
        }

        let tasks = self.config.run.tasks;
        if tasks.check_in {
            let result = self.activities.check_in(&session).await;
            self.report_activity(&masked, Operation::CheckIn, &result);
            report.check_in = Some(result);
        }

        if tasks.game {
            let result = self.activities.play_game(&session).await;
            self.report_activity(&masked, Operation::Game, &result);
            report.game = Some(result);
        }

        if tasks.chat {
            report.chat = Some(self.chat_rounds(&session, cancel).await);
        }

        report
    }

    /// 最多 `chat_rounds` 轮完整对话，活动记录成功或当日已完成即停止
    async fn chat_rounds(&mut self, session: &Session, cancel: &CancellationToken) -> ActivityResult {
        let rounds = self.config.run.chat_rounds;
        let masked = session.masked.clone();
        let mut last = ActivityResult::Error("chat was not attempted".to_string());

        for round in 1..=rounds {
            match self
                .conversation
                .converse(session, &self.questions, &mut self.rng)
                .await
            {
                Ok(outcome) => {
                    self.sink.status(
                        &masked,
                        Operation::Chat,
                        Outcome::Info,
                        format!("[Q]: {}", outcome.question),
                    );
                    self.sink.status(
                        &masked,
                        Operation::Chat,
                        Outcome::Info,
                        format!("[A]: {}", outcome.answer),
                    );
                    self.report_activity(&masked, Operation::Chat, &outcome.activity);

                    if outcome.activity.is_done() {
                        return outcome.activity;
                    }
                    last = outcome.activity;
                }
                Err(e) => {
                    self.sink
                        .status(&masked, Operation::Chat, Outcome::Error, e.to_string());
                    last = ActivityResult::Error(e.to_string());
                }
            }

            if round < rounds {
                self.sink
                    .status(&masked, Operation::Chat, Outcome::Info, "Retrying AI Chat...");
                if !pause(self.config.retry.backoff(), cancel).await {
                    return last;
                }
            }
        }

        self.sink.status(
            &masked,
            Operation::Chat,
            Outcome::Failed,
            format!("Failed to complete AI Chat after {} rounds", rounds),
        );
        last
    }

    fn report_activity(&self, account: &str, operation: Operation, result: &ActivityResult) {
        self.sink
            .status(account, operation, Outcome::from(result), result.to_string());
    }

    /// 逐秒倒计时；被取消时返回 false
    async fn countdown(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        let started = Instant::now();
        loop {
            let remaining = duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return true;
            }

            self.sink.emit(RunEvent::Countdown {
                remaining_secs: remaining.as_secs(),
            });
            if !pause(remaining.min(Duration::from_secs(1)), cancel).await {
                return false;
            }
        }
    }
}

/// 可取消的等待；被取消时返回 false
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
