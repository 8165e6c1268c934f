//! User notification sink.
//!
//! Stands in for the page's alert box. Presentation is up to the
//! implementation; the session subsystem only guarantees what gets sent.

use std::sync::Mutex;

use crate::classify::ClassifiedError;

/// One message delivered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(ClassifiedError),
}

/// Opaque "notify user" sink.
///
/// `notify` returning counts as the user acknowledging the message.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    fn info(&self, message: &str) {
        self.notify(Notice::Info(message.to_string()));
    }

    fn error(&self, error: &ClassifiedError) {
        self.notify(Notice::Error(error.clone()));
    }
}

/// Routes notices into the tracing pipeline.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    echo_stderr: bool,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print every notice on stderr.
    pub fn with_stderr(mut self) -> Self {
        self.echo_stderr = true;
        self
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Info(message) => {
                tracing::info!(target: "wallet_session::notify", "{}", message);
                if self.echo_stderr {
                    eprintln!("{message}");
                }
            }
            Notice::Error(error) => {
                tracing::warn!(target: "wallet_session::notify", kind = %error.kind, "{}", error.message);
                if self.echo_stderr {
                    eprintln!("Error: {}", error.message);
                }
            }
        }
    }
}

/// Keeps every notice in memory. Used by tests and headless drivers.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn errors(&self) -> Vec<ClassifiedError> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Error(error) => Some(error),
                Notice::Info(_) => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Info(message) => Some(message),
                Notice::Error(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorKind, classify};
    use crate::error::ProviderError;

    #[test]
    fn recording_notifier_splits_infos_and_errors() {
        let notifier = RecordingNotifier::new();
        notifier.info("deployed");
        notifier.error(&classify(&ProviderError::UserRejected));

        assert_eq!(notifier.infos(), vec!["deployed".to_string()]);
        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::UserRejected);

        notifier.clear();
        assert!(notifier.notices().is_empty());
    }
}
