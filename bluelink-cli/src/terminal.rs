/*!
 * Terminal Host
 * Renders toasts on stderr and answers agent questions from stdin
 */

use async_trait::async_trait;
use chrono::Local;
use crossterm::style::Stylize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use bluelink_core::{Confirmation, Confirmer, Notifier, PromptRequest, Prompter, Toast, ToastStyle};

pub struct TerminalHost {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalHost {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, question: String) -> Option<String> {
        {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "{}", question);
            let _ = stderr.flush();
        }
        match self.input.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read answer from stdin: {}", e);
                None
            }
        }
    }
}

pub fn render(toast: &Toast) -> String {
    let stamp = Local::now().format("%H:%M:%S").to_string().dark_grey();
    let title = match toast.style {
        ToastStyle::Animated => format!("… {}", toast.title).yellow(),
        ToastStyle::Success => format!("✓ {}", toast.title).green().bold(),
        ToastStyle::Failure => format!("✗ {}", toast.title).red().bold(),
    };
    match &toast.message {
        Some(message) => format!("{} {} {}", stamp, title, message.as_str().dim()),
        None => format!("{} {}", stamp, title),
    }
}

#[async_trait]
impl Notifier for TerminalHost {
    async fn show_toast(&self, toast: Toast) {
        eprintln!("{}", render(&toast));
    }
}

#[async_trait]
impl Confirmer for TerminalHost {
    async fn confirm(&self, request: Confirmation) -> bool {
        let question = format!(
            "{}\n{} [{}/{}] ",
            request.title.as_str().bold(),
            request.message,
            request.confirm_label,
            request.dismiss_label
        );
        self.ask(question)
            .await
            .map(|answer| is_affirmative(&answer, &request.confirm_label))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Prompter for TerminalHost {
    async fn prompt(&self, request: PromptRequest) -> Option<String> {
        let hint = request
            .placeholder
            .map(|placeholder| format!(" ({})", placeholder))
            .unwrap_or_default();
        self.ask(format!("{}{}: ", request.title.as_str().bold(), hint))
            .await
    }
}

fn is_affirmative(answer: &str, confirm_label: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y")
        || answer.eq_ignore_ascii_case("yes")
        || answer.eq_ignore_ascii_case(confirm_label)
}
