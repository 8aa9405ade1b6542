use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use rusty_bridge_core::bridge::{await_settlement, SettlementStatus, StatusSource};
use rusty_bridge_core::{ClockPort, Error, PortError, TimestampMs};

struct FixedClock(u64);

impl ClockPort for FixedClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.0)
    }
}

/// Answers polls from a script; an exhausted script keeps reporting pending.
struct Scripted(Mutex<VecDeque<Result<SettlementStatus, Error>>>);

impl Scripted {
    fn new(script: Vec<Result<SettlementStatus, Error>>) -> Self {
        Self(Mutex::new(script.into()))
    }
}

#[async_trait]
impl StatusSource for Scripted {
    async fn poll(&self) -> Result<SettlementStatus, Error> {
        self.0
            .lock()
            .expect("script")
            .pop_front()
            .unwrap_or(Ok(SettlementStatus::Pending))
    }
}

fn flake() -> Result<SettlementStatus, Error> {
    Err(Error::Task("status endpoint timed out".to_owned()))
}

#[tokio::test]
async fn pending_poll_resets_the_error_budget() {
    let source = Scripted::new(vec![
        flake(),
        Ok(SettlementStatus::Pending),
        flake(),
        Ok(SettlementStatus::Pending),
        flake(),
        Ok(SettlementStatus::Cancelled),
    ]);

    let status = await_settlement(&source, Duration::ZERO, None, &FixedClock(0), 1)
        .await
        .expect("isolated failures stay within budget");
    assert_eq!(status, SettlementStatus::Cancelled);
}

#[tokio::test]
async fn consecutive_failures_past_the_budget_end_the_wait() {
    let source = Scripted::new(vec![
        Ok(SettlementStatus::Pending),
        flake(),
        flake(),
        Ok(SettlementStatus::Cancelled),
    ]);

    let err = await_settlement(&source, Duration::ZERO, None, &FixedClock(0), 1)
        .await
        .expect_err("second consecutive failure exceeds the budget");
    assert!(matches!(err, Error::Task(_)));
}

#[tokio::test]
async fn passed_deadline_expires_before_polling() {
    let source = Scripted::new(vec![Ok(SettlementStatus::Completed {
        destination_tx: None,
    })]);

    let status = await_settlement(
        &source,
        Duration::ZERO,
        Some(TimestampMs(100)),
        &FixedClock(100),
        0,
    )
    .await
    .expect("expired");
    assert_eq!(status, SettlementStatus::Expired);
}
