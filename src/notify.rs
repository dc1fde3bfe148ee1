//! Match notifications.
//!
//! Fired after a due is credited, automatically or by an operator. Delivery is
//! someone else's problem: implementations must not block and must swallow
//! their own failures (logging them), so a notification can never undo or
//! delay a match.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{Id, MatchMethod};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchNotice {
    pub resident_id: Id,
    pub due_id: Id,
    pub transaction_id: Id,
    pub amount: Decimal,
    pub method: MatchMethod,
}

pub trait MatchNotifier: Send + Sync {
    fn notify_matched(&self, notice: &MatchNotice);
}

#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl MatchNotifier for NoopNotifier {
    fn notify_matched(&self, _notice: &MatchNotice) {}
}

/// Writes each notice to the log at info level.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl MatchNotifier for LoggingNotifier {
    fn notify_matched(&self, notice: &MatchNotice) {
        tracing::info!(
            resident_id = %notice.resident_id,
            due_id = %notice.due_id,
            transaction_id = %notice.transaction_id,
            amount = %notice.amount,
            method = ?notice.method,
            "due credited"
        );
    }
}

/// Hands notices to an async consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<MatchNotice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MatchNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MatchNotifier for ChannelNotifier {
    fn notify_matched(&self, notice: &MatchNotice) {
        if self.tx.send(notice.clone()).is_err() {
            tracing::warn!(due_id = %notice.due_id, "match notice dropped: receiver closed");
        }
    }
}
