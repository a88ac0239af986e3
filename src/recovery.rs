// Advisory mapping from a failed run to what the caller should do next.

use serde::Serialize;

use crate::config::preset::Preset;
use crate::error::{FailureKind, SqueezeError};

/// Documents longer than this are retried in chunks on timeout.
pub const CHUNKED_TIMEOUT_PAGE_THRESHOLD: usize = 20;
pub const TIMEOUT_CHUNK_SIZE: usize = 10;
pub const PREMIUM_CHUNK_SIZE: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserInputKind {
    Password,
    FileAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    UnlimitedUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    RetryDegraded { preset: Preset },
    RetryChunked { chunk_size: usize },
    RequestUserInput { input: UserInputKind },
    SuggestUpgrade { feature: Feature },
    ShowError { retryable: bool },
    Cancelled,
}

impl RecoveryAction {
    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            RecoveryAction::RetryDegraded { .. } | RecoveryAction::RetryChunked { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext {
    pub preset: Preset,
    pub file_size: u64,
    pub page_count: usize,
    pub is_premium_entitled: bool,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryPlanner {
    max_retries: u32,
}

impl Default for RecoveryPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RecoveryPlanner {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn plan(&self, error: &SqueezeError, context: &RecoveryContext) -> RecoveryAction {
        let action = Self::table(error.kind(), context);
        if action.is_retry() && context.retry_count >= self.max_retries {
            return RecoveryAction::ShowError { retryable: false };
        }
        action
    }

    fn table(kind: FailureKind, context: &RecoveryContext) -> RecoveryAction {
        match kind {
            FailureKind::MemoryExhausted => RecoveryAction::RetryDegraded {
                preset: context.preset.degraded(),
            },
            FailureKind::Timeout if context.page_count > CHUNKED_TIMEOUT_PAGE_THRESHOLD => {
                RecoveryAction::RetryChunked {
                    chunk_size: TIMEOUT_CHUNK_SIZE,
                }
            }
            FailureKind::Timeout => RecoveryAction::RetryDegraded {
                preset: context.preset.degraded(),
            },
            FailureKind::Encrypted => RecoveryAction::RequestUserInput {
                input: UserInputKind::Password,
            },
            FailureKind::FileTooLarge if context.is_premium_entitled => {
                RecoveryAction::RetryChunked {
                    chunk_size: PREMIUM_CHUNK_SIZE,
                }
            }
            FailureKind::FileTooLarge => RecoveryAction::SuggestUpgrade {
                feature: Feature::UnlimitedUsage,
            },
            FailureKind::InvalidInput => RecoveryAction::ShowError { retryable: false },
            FailureKind::Cancelled => RecoveryAction::Cancelled,
            FailureKind::AccessDenied => RecoveryAction::RequestUserInput {
                input: UserInputKind::FileAccess,
            },
            FailureKind::Other => RecoveryAction::ShowError { retryable: true },
        }
    }
}
