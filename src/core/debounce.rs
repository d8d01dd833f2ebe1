//! Coalesce rapid triggers into one delayed action.
//!
//! Each [`Debouncer::trigger`] re-arms a single timer: a pending action that has not
//! fired yet is discarded and the new one fires `delay` after the most recent trigger.
//! A burst of N triggers spaced closer than `delay` therefore runs exactly one action.
//!
//! One timer thread serves the debouncer for its whole life. Triggers and cancels
//! update the shared slot and wake the thread through a re-arm channel; the thread
//! exits once the debouncer is dropped.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TimerSlot {
    deadline: Option<Instant>,
    action: Option<Action>,
}

impl TimerSlot {
    /// Take the armed action if its deadline has passed.
    fn take_due(&mut self, now: Instant) -> Option<Action> {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                self.action.take()
            }
            _ => None,
        }
    }
}

pub struct Debouncer {
    delay: Duration,
    slot: Arc<Mutex<TimerSlot>>,
    rearm: Sender<()>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let slot = Arc::new(Mutex::new(TimerSlot::default()));
        let (rearm, wakeups) = bounded::<()>(1);

        let timer_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name("debounce-timer".to_string())
            .spawn(move || run_timer(timer_slot, wakeups));
        if let Err(e) = spawned {
            log::error!("Failed to spawn debounce timer thread: {e}");
        }

        Self { delay, slot, rearm }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer to run `action` after the delay, replacing any pending action.
    pub fn trigger<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut slot = self.slot.lock();
            slot.deadline = Some(Instant::now() + self.delay);
            slot.action = Some(Box::new(action));
        }
        // a full channel already holds a wakeup the timer has not consumed
        let _ = self.rearm.try_send(());
    }

    /// Disarm the pending timer, if any, without running its action. An action the
    /// timer already took may still be running when this returns.
    pub fn cancel(&self) {
        let discarded = {
            let mut slot = self.slot.lock();
            slot.deadline = None;
            slot.action.take()
        };
        // the action may own the last reference to whatever owns this debouncer
        drop(discarded);
        let _ = self.rearm.try_send(());
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().deadline.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Timer loop: sleep until the armed deadline or the next wakeup, run due actions,
/// exit when every sender is gone.
fn run_timer(slot: Arc<Mutex<TimerSlot>>, wakeups: Receiver<()>) {
    loop {
        let now = Instant::now();
        let (due, deadline) = {
            let mut slot = slot.lock();
            let due = slot.take_due(now);
            (due, slot.deadline)
        };
        if let Some(action) = due {
            action();
            continue;
        }

        match deadline {
            Some(at) => select! {
                recv(wakeups) -> message => if message.is_err() { break },
                default(at.saturating_duration_since(now)) => {}
            },
            None => {
                if wakeups.recv().is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("Debounce timer exited");
}
