use std::time::{Duration, Instant};

use drainwatch_platform::GpsSource;
use drainwatch_protocol::{GpsState, GpsUsage, IterationSnapshot, Subsystem, UsageRecord};

use super::Monitor;
use crate::error::MonitorError;

/// Tracks the receiver through on, sleep and off.
///
/// After the engine stops the receiver idles in sleep for a fixed time
/// before powering down. Time in each state is accumulated per window.
pub struct GpsMonitor {
    source: Box<dyn GpsSource>,
    sleep: Duration,
    state: GpsState,
    sleep_until: Option<Instant>,
    last: Option<Instant>,
}

impl GpsMonitor {
    pub fn new(source: Box<dyn GpsSource>, sleep_secs: f64) -> Self {
        let sleep = Duration::try_from_secs_f64(sleep_secs).unwrap_or_default();
        Self {
            source,
            sleep,
            state: GpsState::Off,
            sleep_until: None,
            last: None,
        }
    }

    pub fn state(&self) -> GpsState {
        self.state
    }

    pub fn sample_at(&mut self, iteration: u64, now: Instant) -> Result<IterationSnapshot, MonitorError> {
        let engine_on = self
            .source
            .engine_on()
            .map_err(|e| MonitorError::unavailable(Subsystem::Gps, e))?;

        let mut usage = GpsUsage::default();
        if let Some(last) = self.last {
            let window = now.saturating_duration_since(last);
            usage.window_secs = window.as_secs_f64();
            self.accumulate(&mut usage, last, now);
        }
        self.last = Some(now);

        self.state = match (engine_on, self.state) {
            (true, _) => {
                self.sleep_until = None;
                GpsState::On
            }
            (false, GpsState::On) if !self.sleep.is_zero() => {
                self.sleep_until = Some(now + self.sleep);
                GpsState::Sleep
            }
            (false, GpsState::Sleep) if self.sleep_until.is_some_and(|until| now < until) => {
                GpsState::Sleep
            }
            (false, _) => {
                self.sleep_until = None;
                GpsState::Off
            }
        };

        Ok(IterationSnapshot::new(iteration, UsageRecord::Gps(usage)))
    }

    /// Charges `[last, now)` to the state held since the previous sample,
    /// splitting a sleep that expired inside the window.
    fn accumulate(&self, usage: &mut GpsUsage, last: Instant, now: Instant) {
        let window = now.saturating_duration_since(last).as_secs_f64();
        match (self.state, self.sleep_until) {
            (GpsState::Sleep, Some(until)) if until < now => {
                let asleep = until.saturating_duration_since(last).as_secs_f64();
                usage.state_secs[GpsState::Sleep.index()] += asleep;
                usage.state_secs[GpsState::Off.index()] += window - asleep;
            }
            (state, _) => usage.state_secs[state.index()] += window,
        }
    }
}

impl Monitor for GpsMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Gps
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        self.sample_at(iteration, Instant::now())
    }
}
