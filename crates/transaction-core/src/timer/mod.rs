//! Transaction timers.
//!
//! A running timer is a spawned task that sleeps and then posts
//! [`InternalTransactionCommand::Timer`] to its transaction's command loop.
//! The loop owns the returned `JoinHandle` and aborts it when the state changes.

pub mod types;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::transaction::{InternalTransactionCommand, TransactionKey};

pub use types::{TimerSettings, TimerType};

/// Starts `timer`, firing after `delay`.
pub fn start_timer(
    id: &TransactionKey,
    timer: TimerType,
    delay: Duration,
    cmd_tx: mpsc::Sender<InternalTransactionCommand>,
) -> JoinHandle<()> {
    start_timer_at(id, timer, Instant::now() + delay, cmd_tx)
}

/// Starts `timer`, firing at `deadline`.
pub fn start_timer_at(
    id: &TransactionKey,
    timer: TimerType,
    deadline: Instant,
    cmd_tx: mpsc::Sender<InternalTransactionCommand>,
) -> JoinHandle<()> {
    let id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        trace!(id=%id, "Timer {} fired", timer);
        let _ = cmd_tx.send(InternalTransactionCommand::Timer(timer)).await;
    })
}

/// Aborts the timer in `slot`, if any.
pub fn cancel_timer(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigstack_sip_core::Method;

    #[test]
    fn test_default_settings() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(settings.transaction_timeout, settings.t1 * 64);
        assert_eq!(TimerType::B.to_string(), "B");
    }

    #[test]
    fn test_backoff_is_capped_at_t2() {
        let settings = TimerSettings::default();
        let mut interval = settings.t1;
        let mut seen = vec![interval];
        for _ in 0..5 {
            interval = settings.next_interval(interval);
            seen.push(interval);
        }
        let millis: Vec<u128> = seen.iter().map(Duration::as_millis).collect();
        assert_eq!(millis, vec![500, 1000, 2000, 4000, 4000, 4000]);
    }

    #[test]
    fn test_from_t1_t2_t4() {
        let settings = TimerSettings::from_t1_t2_t4(
            Duration::from_millis(100),
            Duration::from_millis(400),
            Duration::from_millis(500),
        );
        assert_eq!(settings.transaction_timeout, Duration::from_millis(6400));
        assert_eq!(settings.wait_time_d, Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_posts_command() {
        let (tx, mut rx) = mpsc::channel(4);
        let key = TransactionKey::new("z9hG4bKtimer".into(), Method::Options, false);
        let _handle = start_timer(&key, TimerType::E, Duration::from_millis(500), tx);

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            rx.recv().await,
            Some(InternalTransactionCommand::Timer(TimerType::E))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let key = TransactionKey::new("z9hG4bKtimer".into(), Method::Options, false);
        let mut slot = Some(start_timer(&key, TimerType::F, Duration::from_secs(1), tx));
        cancel_timer(&mut slot);
        assert!(slot.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.recv().await.is_none());
    }
}
