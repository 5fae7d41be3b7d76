/*!
 * Host Capabilities
 * Toasts, confirmations and text prompts supplied by whoever embeds the workflows
 */

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToastStyle {
    Animated,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub style: ToastStyle,
    pub title: String,
    pub message: Option<String>,
}

impl Toast {
    pub fn animated(title: impl Into<String>) -> Self {
        Self::new(ToastStyle::Animated, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(ToastStyle::Success, title)
    }

    pub fn failure(title: impl Into<String>) -> Self {
        Self::new(ToastStyle::Failure, title)
    }

    fn new(style: ToastStyle, title: impl Into<String>) -> Self {
        Self {
            style,
            title: title.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub dismiss_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub placeholder: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_toast(&self, toast: Toast);
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// True when the user accepted.
    async fn confirm(&self, request: Confirmation) -> bool;
}

#[async_trait]
pub trait Prompter: Send + Sync {
    /// `None` when the user dismissed the prompt.
    async fn prompt(&self, request: PromptRequest) -> Option<String>;
}

#[derive(Clone)]
pub struct Host {
    pub notifier: Arc<dyn Notifier>,
    pub confirmer: Arc<dyn Confirmer>,
    pub prompter: Arc<dyn Prompter>,
}

impl Host {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        confirmer: Arc<dyn Confirmer>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            notifier,
            confirmer,
            prompter,
        }
    }

    pub async fn toast(&self, toast: Toast) {
        self.notifier.show_toast(toast).await
    }
}
