use drainwatch_platform::AudioSource;
use drainwatch_protocol::{AudioUsage, IterationSnapshot, Subsystem, Uid, UsageRecord};
use tracing::warn;

use super::Monitor;
use crate::error::MonitorError;

pub struct AudioMonitor {
    source: Box<dyn AudioSource>,
}

impl AudioMonitor {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self { source }
    }
}

impl Monitor for AudioMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Audio
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        let playing = self
            .source
            .is_playing()
            .map_err(|e| MonitorError::unavailable(Subsystem::Audio, e))?;

        let mut snapshot =
            IterationSnapshot::new(iteration, UsageRecord::Audio(AudioUsage { playing }));
        if !playing {
            return Ok(snapshot);
        }

        match self.source.playing_owners() {
            Ok(owners) => {
                for uid in owners.into_iter().map(Uid).take_while(|uid| !uid.is_sentinel()) {
                    snapshot.set_owner_usage(uid, UsageRecord::Audio(AudioUsage { playing: true }));
                }
            }
            Err(e) => warn!(error = %e, "Failed to list playing owners"),
        }

        Ok(snapshot)
    }
}
