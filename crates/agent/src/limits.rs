//! Session usage limits.
//!
//! [`LimitTracker`] is the pure state machine; [`LimitEnforcer`] runs it on
//! its own task, fed by the session's tool-execution events and a separate
//! duration timer task. The first limit hit shuts the session down with
//! drain; later hits are no-ops.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, warn};

use logicall_core::domain::profile::Limits;

use crate::session::{AgentSession, ToolExecutionEvent};

pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LimitState {
    pub triggered: bool,
    pub tool_calls_total: u64,
    /// Calls inside the current rate window, oldest first.
    pub tool_call_timestamps: VecDeque<Instant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitReason {
    MaxMinutes { limit: u32 },
    MaxToolCalls { limit: u32, total: u64 },
    MaxToolCallsPerMinute { limit: u32, in_window: usize },
}

impl LimitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxMinutes { .. } => "max_minutes",
            Self::MaxToolCalls { .. } => "max_tool_calls",
            Self::MaxToolCallsPerMinute { .. } => "max_tool_calls_per_minute",
        }
    }
}

impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxMinutes { limit } => write!(f, "session reached {limit} minute(s)"),
            Self::MaxToolCalls { limit, total } => {
                write!(f, "{total} tool calls exceed the session limit of {limit}")
            }
            Self::MaxToolCallsPerMinute { limit, in_window } => {
                write!(f, "{in_window} tool calls in the last minute exceed the limit of {limit}")
            }
        }
    }
}

#[derive(Debug)]
pub struct LimitTracker {
    limits: Limits,
    state: LimitState,
}

impl LimitTracker {
    pub fn new(limits: Limits) -> Self {
        Self { limits, state: LimitState::default() }
    }

    pub fn state(&self) -> &LimitState {
        &self.state
    }

    pub fn into_state(self) -> LimitState {
        self.state
    }

    /// Records a batch of `count` calls made at `now`. Returns the reason
    /// only for the batch that moves the session into the triggered state.
    pub fn record_tool_calls(&mut self, count: usize, now: Instant) -> Option<LimitReason> {
        if count == 0 {
            return None;
        }

        self.state.tool_calls_total += count as u64;
        self.state.tool_call_timestamps.extend(std::iter::repeat(now).take(count));
        while let Some(oldest) = self.state.tool_call_timestamps.front() {
            if now.saturating_duration_since(*oldest) <= RATE_WINDOW {
                break;
            }
            self.state.tool_call_timestamps.pop_front();
        }

        let total = self.state.tool_calls_total;
        let in_window = self.state.tool_call_timestamps.len();
        let reason = match (self.limits.max_tool_calls, self.limits.max_tool_calls_per_minute) {
            (Some(limit), _) if total > u64::from(limit) => {
                Some(LimitReason::MaxToolCalls { limit, total })
            }
            (_, Some(limit)) if in_window > limit as usize => {
                Some(LimitReason::MaxToolCallsPerMinute { limit, in_window })
            }
            _ => None,
        };
        reason.and_then(|reason| self.trigger(reason))
    }

    pub fn duration_elapsed(&mut self) -> Option<LimitReason> {
        let limit = self.limits.max_minutes.filter(|minutes| *minutes > 0)?;
        self.trigger(LimitReason::MaxMinutes { limit })
    }

    fn trigger(&mut self, reason: LimitReason) -> Option<LimitReason> {
        if self.state.triggered {
            return None;
        }
        self.state.triggered = true;
        Some(reason)
    }
}

/// Handle to a running enforcer task.
pub struct LimitEnforcer {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<LimitState>,
    triggered: Arc<AtomicBool>,
}

impl LimitEnforcer {
    pub fn spawn(
        limits: Limits,
        session: Arc<dyn AgentSession>,
        mut events: mpsc::UnboundedReceiver<ToolExecutionEvent>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let triggered = Arc::new(AtomicBool::new(false));
        let triggered_flag = Arc::clone(&triggered);

        let task = tokio::spawn(async move {
            let (timer_tx, mut timer_rx) = oneshot::channel::<()>();
            let timer = limits.max_minutes.filter(|minutes| *minutes > 0).map(|minutes| {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(u64::from(minutes) * 60)).await;
                    let _ = timer_tx.send(());
                })
            });
            let mut timer_armed = timer.is_some();
            let mut events_open = true;
            let mut tracker = LimitTracker::new(limits);

            loop {
                let reason = tokio::select! {
                    biased;

                    event = events.recv(), if events_open => match event {
                        Some(event) => {
                            tracker.record_tool_calls(event.call_count(), Instant::now())
                        }
                        None => {
                            events_open = false;
                            None
                        }
                    },
                    fired = &mut timer_rx, if timer_armed => {
                        timer_armed = false;
                        fired.ok().and_then(|()| tracker.duration_elapsed())
                    },
                    _ = &mut stop_rx => break,
                };

                if let Some(reason) = reason {
                    triggered_flag.store(true, Ordering::SeqCst);
                    warn!(
                        event_name = "limits.triggered",
                        reason = reason.as_str(),
                        detail = %reason,
                        "session limit reached, shutting down"
                    );
                    session.shutdown(true).await;
                }
            }

            if let Some(timer) = timer {
                timer.abort();
                if let Err(error) = timer.await {
                    if !error.is_cancelled() {
                        warn!(
                            event_name = "limits.timer.failed",
                            error = %error,
                            "duration timer task failed"
                        );
                    }
                }
            }

            let state = tracker.into_state();
            debug!(
                event_name = "limits.enforcer.stopped",
                triggered = state.triggered,
                tool_calls_total = state.tool_calls_total,
                "limit enforcer stopped"
            );
            state
        });

        Self { stop: Some(stop_tx), task, triggered }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Stops the enforcer after it drains queued events, cancels the
    /// duration timer and returns the final state.
    pub async fn close(mut self) -> Result<LimitState, JoinError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await
    }
}

impl Drop for LimitEnforcer {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use logicall_core::domain::profile::Limits;

    use super::{LimitEnforcer, LimitReason, LimitTracker};
    use crate::session::{AgentSession, SessionError, ToolExecutionEvent};
    use crate::tools::Tool;

    #[derive(Default)]
    struct CountingSession {
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl AgentSession for CountingSession {
        async fn start(&self, _: &str, _: Vec<Arc<dyn Tool>>) -> Result<(), SessionError> {
            Ok(())
        }

        async fn shutdown(&self, drain: bool) {
            assert!(drain, "limit shutdowns must drain");
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }

        fn take_tool_events(&self) -> Option<mpsc::UnboundedReceiver<ToolExecutionEvent>> {
            None
        }
    }

    fn limits(minutes: Option<u32>, total: Option<u32>, per_minute: Option<u32>) -> Limits {
        Limits {
            max_minutes: minutes,
            max_tool_calls: total,
            max_tool_calls_per_minute: per_minute,
        }
    }

    #[test]
    fn eleventh_call_in_a_minute_triggers_once() {
        let mut tracker = LimitTracker::new(limits(None, None, Some(10)));
        let start = Instant::now();

        for second in 0..10 {
            assert_eq!(tracker.record_tool_calls(1, start + Duration::from_secs(second)), None);
        }
        assert_eq!(
            tracker.record_tool_calls(1, start + Duration::from_secs(10)),
            Some(LimitReason::MaxToolCallsPerMinute { limit: 10, in_window: 11 })
        );
        assert_eq!(tracker.record_tool_calls(1, start + Duration::from_secs(11)), None);
        assert!(tracker.state().triggered);
        assert_eq!(tracker.state().tool_calls_total, 12);
    }

    #[test]
    fn old_calls_leave_the_window() {
        let mut tracker = LimitTracker::new(limits(None, None, Some(2)));
        let start = Instant::now();

        assert_eq!(tracker.record_tool_calls(2, start), None);
        assert_eq!(tracker.record_tool_calls(1, start + Duration::from_secs(61)), None);
        assert_eq!(tracker.state().tool_call_timestamps.len(), 1);
        assert!(!tracker.state().triggered);
    }

    #[test]
    fn total_is_checked_before_rate() {
        let mut tracker = LimitTracker::new(limits(None, Some(3), Some(3)));

        assert_eq!(
            tracker.record_tool_calls(4, Instant::now()),
            Some(LimitReason::MaxToolCalls { limit: 3, total: 4 })
        );
    }

    #[test]
    fn zero_or_absent_minutes_never_time_out() {
        assert_eq!(LimitTracker::new(limits(Some(0), None, None)).duration_elapsed(), None);
        assert_eq!(LimitTracker::new(Limits::default()).duration_elapsed(), None);

        let mut tracker = LimitTracker::new(limits(Some(5), None, None));
        assert_eq!(tracker.duration_elapsed(), Some(LimitReason::MaxMinutes { limit: 5 }));
        assert_eq!(tracker.duration_elapsed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_limit_shuts_down_once() {
        let session = Arc::new(CountingSession::default());
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let enforcer =
            LimitEnforcer::spawn(limits(Some(30), None, None), session.clone(), events_rx);

        tokio::time::sleep(Duration::from_secs(30 * 60 - 1)).await;
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(enforcer.is_triggered());
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 1);

        let state = enforcer.close().await.expect("enforcer task");
        assert!(state.triggered);
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_a_pending_timer() {
        let session = Arc::new(CountingSession::default());
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let enforcer =
            LimitEnforcer::spawn(limits(Some(30), None, None), session.clone(), events_rx);

        let state = enforcer.close().await.expect("enforcer task");
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;

        assert!(!state.triggered);
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_triggers_from_the_event_stream() {
        let session = Arc::new(CountingSession::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let enforcer =
            LimitEnforcer::spawn(limits(None, None, Some(10)), session.clone(), events_rx);

        for _ in 0..12 {
            events_tx.send(ToolExecutionEvent::new(["wait"])).expect("send event");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let state = enforcer.close().await.expect("enforcer task");
        assert!(state.triggered);
        assert_eq!(state.tool_calls_total, 12);
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 1);
    }
}
