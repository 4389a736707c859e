//! Settlement Poller
//!
//! A repeating probe that owns its timer. The caller awaits [`SettlementPoller::tick`],
//! does the tick's work, and only then asks for the next tick, so two ticks
//! never overlap. Dropping the poller cancels the timer.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Lower bound for the poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4000);

/// Clamp an interval to [`MIN_POLL_INTERVAL`]
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_POLL_INTERVAL)
}

/// Interval from a signed millisecond count; zero and negative values clamp
pub fn interval_from_millis(millis: i64) -> Duration {
    clamp_interval(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}

/// Polling limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay before the first tick and between ticks
    pub interval: Duration,

    /// Stop after this many probes (None = unbounded)
    pub max_attempts: Option<u32>,

    /// Stop once this much time has passed since polling began (None = unbounded)
    pub deadline: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

/// Why polling gave up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exhaustion {
    MaxAttempts(u32),
    Deadline(Duration),
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxAttempts(n) => write!(f, "{n} attempts used"),
            Self::Deadline(d) => write!(f, "deadline of {}ms passed", d.as_millis()),
        }
    }
}

/// Outcome of waiting for the next tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Probe now; carries the 1-based attempt number
    Probe(u32),
    /// No more probes will be issued
    Exhausted(Exhaustion),
}

/// Cancellable repeating probe timer
pub struct SettlementPoller {
    ticker: Interval,
    started: Instant,
    attempts: u32,
    max_attempts: Option<u32>,
    deadline: Option<Duration>,
}

impl SettlementPoller {
    /// Start the timer. The first tick fires one interval from now.
    pub fn start(config: &PollerConfig) -> Self {
        let interval = clamp_interval(config.interval);
        let started = Instant::now();
        let mut ticker = time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            ticker,
            started,
            attempts: 0,
            max_attempts: config.max_attempts,
            deadline: config.deadline,
        }
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> Tick {
        if let Some(max) = self.max_attempts.filter(|max| self.attempts >= *max) {
            return Tick::Exhausted(Exhaustion::MaxAttempts(max));
        }

        match self.deadline {
            Some(deadline) => {
                if time::timeout_at(self.started + deadline, self.ticker.tick())
                    .await
                    .is_err()
                {
                    return Tick::Exhausted(Exhaustion::Deadline(deadline));
                }
            }
            None => {
                self.ticker.tick().await;
            }
        }

        self.attempts += 1;
        Tick::Probe(self.attempts)
    }

    /// Probes issued so far
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn period(&self) -> Duration {
        self.ticker.period()
    }
}
