use pdf_squeeze::config::preset::Preset;
use pdf_squeeze::error::{ResourceKind, SqueezeError};
use pdf_squeeze::recovery::{
    Feature, RecoveryAction, RecoveryContext, RecoveryPlanner, UserInputKind,
};

fn context(page_count: usize, premium: bool) -> RecoveryContext {
    RecoveryContext {
        preset: Preset::Smart,
        file_size: 5_000_000,
        page_count,
        is_premium_entitled: premium,
        retry_count: 0,
    }
}

fn timeout() -> SqueezeError {
    SqueezeError::ResourceExhausted(ResourceKind::Timeout)
}

fn too_large() -> SqueezeError {
    SqueezeError::ResourceExhausted(ResourceKind::FileTooLarge)
}

// ============================================================
// 1. Table
// ============================================================

#[test]
fn test_timeout_on_long_document_is_chunked() {
    let action = RecoveryPlanner::default().plan(&timeout(), &context(25, false));
    assert_eq!(action, RecoveryAction::RetryChunked { chunk_size: 10 });
}

#[test]
fn test_timeout_on_short_document_degrades() {
    let action = RecoveryPlanner::default().plan(&timeout(), &context(5, false));
    assert_eq!(
        action,
        RecoveryAction::RetryDegraded {
            preset: Preset::Document
        }
    );
    // 20 pages is not "more than 20".
    let action = RecoveryPlanner::default().plan(&timeout(), &context(20, false));
    assert!(matches!(action, RecoveryAction::RetryDegraded { .. }));
}

#[test]
fn test_file_too_large_depends_on_entitlement() {
    let planner = RecoveryPlanner::default();
    assert_eq!(
        planner.plan(&too_large(), &context(3, true)),
        RecoveryAction::RetryChunked { chunk_size: 5 }
    );
    assert_eq!(
        planner.plan(&too_large(), &context(3, false)),
        RecoveryAction::SuggestUpgrade {
            feature: Feature::UnlimitedUsage
        }
    );
}

#[test]
fn test_memory_exhaustion_degrades_preset() {
    let ctx = RecoveryContext {
        preset: Preset::Id,
        ..context(1, false)
    };
    let action = RecoveryPlanner::default().plan(
        &SqueezeError::ResourceExhausted(ResourceKind::Memory),
        &ctx,
    );
    assert_eq!(
        action,
        RecoveryAction::RetryDegraded {
            preset: Preset::Archive
        }
    );
}

#[test]
fn test_remaining_rows() {
    let planner = RecoveryPlanner::default();
    let ctx = context(1, false);

    assert_eq!(
        planner.plan(&SqueezeError::Encrypted, &ctx),
        RecoveryAction::RequestUserInput {
            input: UserInputKind::Password
        }
    );
    assert_eq!(
        planner.plan(&SqueezeError::invalid_input("truncated"), &ctx),
        RecoveryAction::ShowError { retryable: false }
    );
    assert_eq!(
        planner.plan(&SqueezeError::Cancelled, &ctx),
        RecoveryAction::Cancelled
    );
    assert_eq!(
        planner.plan(&SqueezeError::access_denied("/scans/a.pdf"), &ctx),
        RecoveryAction::RequestUserInput {
            input: UserInputKind::FileAccess
        }
    );
    assert_eq!(
        planner.plan(&SqueezeError::unknown("boom"), &ctx),
        RecoveryAction::ShowError { retryable: true }
    );
    assert_eq!(
        planner.plan(&SqueezeError::pdf_write("disk full"), &ctx),
        RecoveryAction::ShowError { retryable: true }
    );
}

#[test]
fn test_io_errors_are_classified() {
    let planner = RecoveryPlanner::default();
    let ctx = context(1, false);
    let denied = SqueezeError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
    assert_eq!(
        planner.plan(&denied, &ctx),
        RecoveryAction::RequestUserInput {
            input: UserInputKind::FileAccess
        }
    );
}

// ============================================================
// 2. Retry cap
// ============================================================

#[test]
fn test_retry_cap_stops_retries() {
    let planner = RecoveryPlanner::new(3);
    let ctx = RecoveryContext {
        retry_count: 3,
        ..context(25, true)
    };
    assert_eq!(
        planner.plan(&timeout(), &ctx),
        RecoveryAction::ShowError { retryable: false }
    );
    // Non-retry actions are unaffected.
    assert_eq!(
        planner.plan(&SqueezeError::Encrypted, &ctx),
        RecoveryAction::RequestUserInput {
            input: UserInputKind::Password
        }
    );
}

#[test]
fn test_repeated_degradation_reaches_receipt() {
    let planner = RecoveryPlanner::new(10);
    let oom = SqueezeError::ResourceExhausted(ResourceKind::Memory);
    let mut preset = Preset::Id;
    for retry in 0..6 {
        let ctx = RecoveryContext {
            preset,
            retry_count: retry,
            ..context(1, false)
        };
        match planner.plan(&oom, &ctx) {
            RecoveryAction::RetryDegraded { preset: next } => preset = next,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(preset, Preset::Receipt);
}
