use std::collections::BTreeMap;
use std::time::Instant;

use drainwatch_platform::SensorSource;
use drainwatch_protocol::{IterationSnapshot, SensorUsage, Subsystem, UsageRecord};
use tracing::warn;

use super::Monitor;
use crate::error::MonitorError;

/// Turns cumulative sensor on-times into per-window deltas.
pub struct SensorMonitor {
    source: Box<dyn SensorSource>,
    last: Option<(BTreeMap<String, f64>, Instant)>,
}

impl SensorMonitor {
    pub fn new(source: Box<dyn SensorSource>) -> Self {
        Self { source, last: None }
    }

    pub fn sample_at(&mut self, iteration: u64, now: Instant) -> IterationSnapshot {
        let on_times = match self.source.on_times() {
            Ok(on_times) => on_times,
            Err(e) => {
                warn!(error = %e, "Failed to read sensor on-times");
                return IterationSnapshot::zero(Subsystem::Sensors, iteration);
            }
        };

        let mut usage = SensorUsage::default();
        if let Some((previous, last_at)) = &self.last {
            usage.window_secs = now.saturating_duration_since(*last_at).as_secs_f64();
            for (name, total) in &on_times {
                // Sensors seen for the first time only set a baseline.
                if let Some(before) = previous.get(name) {
                    let delta = (total - before).max(0.0);
                    if delta > 0.0 {
                        usage.on_secs.insert(name.clone(), delta);
                    }
                }
            }
        }

        self.last = Some((on_times, now));
        IterationSnapshot::new(iteration, UsageRecord::Sensors(usage))
    }
}

impl Monitor for SensorMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Sensors
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        Ok(self.sample_at(iteration, Instant::now()))
    }
}
