//! Per-question countdown owned by a battle.
//!
//! A [`Countdown`] ticks once per unit on a spawned tokio task. When it reaches
//! zero it marks the arming as expired and invokes the expiry callback once.
//! Cancelling or re-arming clears the shared arming cell, so an expiry that
//! has not been claimed through [`Countdown::take_expired`] by then is stale.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_QUESTION_SECONDS: u32 = 30;

const EXPIRED_BIT: u64 = 1 << 63;
const DISARMED: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArmingId(u64);

#[derive(Debug, Default)]
pub struct Countdown {
    next_arming: u64,
    live: Arc<AtomicU64>,
    remaining: Arc<AtomicU32>,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a countdown of `units` ticks of length `tick`, replacing any
    /// countdown already running.
    pub fn arm<F, Fut>(&mut self, units: u32, tick: Duration, on_expire: F) -> ArmingId
    where
        F: FnOnce(ArmingId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.next_arming += 1;
        let arming = ArmingId(self.next_arming);
        let remaining = Arc::new(AtomicU32::new(units));
        self.remaining = remaining.clone();
        self.live.store(arming.0, Ordering::SeqCst);

        let live = self.live.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while remaining.load(Ordering::SeqCst) > 0 {
                ticker.tick().await;
                remaining.fetch_sub(1, Ordering::SeqCst);
            }

            let fired = live
                .compare_exchange(
                    arming.0,
                    arming.0 | EXPIRED_BIT,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();

            if fired {
                tracing::debug!("Countdown {:?} expired", arming);
                // The handler usually cancels this countdown, which aborts
                // this task, so it must run on its own task.
                tokio::spawn(on_expire(arming));
            }
        }));

        arming
    }

    /// Stops the countdown. Once this returns, no expiry of the previous
    /// arming can be claimed.
    pub fn cancel(&mut self) {
        self.live.store(DISARMED, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Claims an expiry delivered for `arming`. Returns false when the
    /// countdown was cancelled or re-armed after that expiry fired.
    pub fn take_expired(&mut self, arming: ArmingId) -> bool {
        let claimed = self
            .live
            .compare_exchange(
                arming.0 | EXPIRED_BIT,
                DISARMED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if claimed {
            self.handle = None;
        }
        claimed
    }

    /// Remaining units of the current arming, if one is live.
    pub fn remaining(&self) -> Option<u32> {
        if self.live.load(Ordering::SeqCst) == DISARMED {
            None
        } else {
            Some(self.remaining.load(Ordering::SeqCst))
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
