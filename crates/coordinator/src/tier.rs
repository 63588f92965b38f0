use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Background processing class. Analysis tiers are strictly ordered
/// `ActiveFile > Normal > Low`; propagation runs beside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    ActiveFile,
    Normal,
    Low,
    Propagation,
}

impl Tier {
    pub const ANALYSIS: [Tier; 3] = [Tier::ActiveFile, Tier::Normal, Tier::Low];

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::ActiveFile => "active-file",
            Tier::Normal => "normal",
            Tier::Low => "low",
            Tier::Propagation => "propagation",
        }
    }

    /// Analysis tiers this tier must wait for
    pub const fn higher(self) -> &'static [Tier] {
        match self {
            Tier::ActiveFile | Tier::Propagation => &[],
            Tier::Normal => &[Tier::ActiveFile],
            Tier::Low => &[Tier::ActiveFile, Tier::Normal],
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Tier::ActiveFile => 0,
            Tier::Normal => 1,
            Tier::Low => 2,
            Tier::Propagation => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occupancy a tier publishes to the tiers below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TierLoad {
    pub pending: usize,
    pub executing: usize,
}

impl TierLoad {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.executing == 0
    }
}

/// Time of the last activity a tier's backoff window is measured from
#[derive(Debug)]
pub(crate) struct ActivityClock {
    last: Mutex<Instant>,
}

impl ActivityClock {
    pub(crate) fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_tiers_wait_for_every_higher_tier() {
        assert!(Tier::ActiveFile.higher().is_empty());
        assert_eq!(Tier::Normal.higher(), &[Tier::ActiveFile]);
        assert_eq!(Tier::Low.higher(), &[Tier::ActiveFile, Tier::Normal]);
        assert!(Tier::Propagation.higher().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_clock_restarts_on_touch() {
        let clock = ActivityClock::new();
        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(clock.elapsed() >= Duration::from_millis(40));
        clock.touch();
        assert!(clock.elapsed() < Duration::from_millis(1));
    }
}
