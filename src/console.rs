use crate::models::ActivityResult;
use crate::status::{AccountReport, CycleSummary, Outcome, RunEvent, StatusEvent};
use crate::utils::format_countdown;
use chrono::Local;
use colored::*;
use std::io::Write;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

pub fn banner() -> String {
    format!(
        "{}\n{}",
        "Warden Protocol Autopilot".bright_green().bold(),
        format!("Version: {}", env!("CARGO_PKG_VERSION")).bright_blue()
    )
}

fn timestamped(line: impl std::fmt::Display) -> String {
    format!(
        "{} {}",
        format!("[ {} ]", Local::now().format("%m/%d/%y %H:%M:%S")).cyan(),
        line
    )
}

fn status_line(event: &StatusEvent) -> String {
    let message = match event.outcome {
        Outcome::Success => event.message.green(),
        Outcome::AlreadyCompleted => event.message.yellow(),
        Outcome::Failed => event.message.red(),
        Outcome::Error => event.message.red().bold(),
        Outcome::Info => event.message.white(),
    };
    format!("{} {}", format!("{}:", event.operation).bright_white(), message)
}

fn report_line(report: &AccountReport) -> String {
    let state = if report.logged_in {
        "active".green()
    } else {
        "inactive".red()
    };
    let task = |result: &Option<ActivityResult>| {
        result.as_ref().map(ActivityResult::label).unwrap_or("skipped")
    };
    format!(
        "{} {} ({} points) check-in: {}, game: {}, chat: {}",
        format!("[{}]", report.account).bright_blue(),
        state,
        report.points.unwrap_or(0),
        task(&report.check_in),
        task(&report.game),
        task(&report.chat)
    )
}

fn summary_line(summary: &CycleSummary) -> String {
    format!(
        "Cycle {} complete: {}/{} accounts active, {} total points",
        summary.cycle, summary.active_accounts, summary.total_accounts, summary.total_points
    )
    .bright_green()
    .to_string()
}

/// 事件转为一行控制台输出；倒计时另行处理
pub fn render(event: &RunEvent) -> Option<String> {
    let line = match event {
        RunEvent::CycleStarted {
            cycle,
            total_accounts,
            proxy_rotation,
        } => format!(
            "Cycle {} | Total Accounts: {} | Proxy Rotation: {}",
            cycle,
            total_accounts.to_string().cyan(),
            (if *proxy_rotation { "Enabled" } else { "Disabled" }).cyan()
        ),
        RunEvent::AccountStarted {
            index,
            total,
            account,
        } => format!("=== Processing Account {}/{} [{}] ===", index + 1, total, account)
            .blue()
            .to_string(),
        RunEvent::Status(status) => status_line(status),
        RunEvent::AccountFinished(report) => report_line(report),
        RunEvent::CycleFinished(summary) => summary_line(summary),
        RunEvent::Countdown { .. } => return None,
        RunEvent::Stopped => "Stopped.".red().to_string(),
    };
    Some(timestamped(line))
}

/// 后台任务：持续打印事件，直到所有发送端关闭
pub fn spawn_printer(mut rx: UnboundedReceiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut counting = false;
        while let Some(event) = rx.recv().await {
            if let RunEvent::Countdown { remaining_secs } = event {
                print!(
                    "\r{}",
                    timestamped(
                        format!("Waiting {} for next cycle...", format_countdown(remaining_secs))
                            .bright_blue()
                    )
                );
                let _ = std::io::stdout().flush();
                counting = true;
                continue;
            }

            if counting {
                println!();
                counting = false;
            }
            if let Some(line) = render(&event) {
                println!("{}", line);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Operation;

    #[test]
    fn test_render_status_contains_operation_and_message() {
        colored::control::set_override(false);
        let line = render(&RunEvent::Status(StatusEvent {
            account: "0xabcd...1234".to_string(),
            operation: Operation::CheckIn,
            outcome: Outcome::AlreadyCompleted,
            message: "Already recorded today".to_string(),
        }))
        .unwrap();

        assert!(line.contains("Daily Check-In: Already recorded today"));
    }

    #[test]
    fn test_countdown_is_not_rendered_as_line() {
        assert!(render(&RunEvent::Countdown { remaining_secs: 5 }).is_none());
    }

    #[test]
    fn test_report_line_lists_tasks() {
        colored::control::set_override(false);
        let line = report_line(&AccountReport {
            account: "0xabcd...1234".to_string(),
            logged_in: true,
            points: Some(20),
            check_in: Some(ActivityResult::AlreadyCompleted("dup".to_string())),
            game: None,
            chat: Some(ActivityResult::Recorded("id".to_string())),
        });
        assert!(line.ends_with(
            "(20 points) check-in: already completed, game: skipped, chat: recorded"
        ));
    }

    #[test]
    fn test_summary_line() {
        colored::control::set_override(false);
        let line = summary_line(&CycleSummary {
            cycle: 2,
            total_accounts: 3,
            active_accounts: 2,
            total_points: 450,
        });
        assert_eq!(line, "Cycle 2 complete: 2/3 accounts active, 450 total points");
    }
}
