use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Points in a turn where the pipeline yields to pace external API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacePoint {
    /// Before every search after the first one of a turn.
    BetweenRetrievals,
    /// Before the final report call.
    BeforeSynthesis,
}

/// Floor for any configured pause.
pub const MIN_DELAY: Duration = Duration::from_millis(1500);

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, point: PacePoint);
}

/// Sleeps a fixed amount at each pace point.
#[derive(Debug, Clone)]
pub struct FixedPacer {
    pub retrieval: Duration,
    pub synthesis: Duration,
}

impl FixedPacer {
    /// Build from millisecond values, raising anything below `MIN_DELAY` to it.
    pub fn from_millis(retrieval_ms: u64, synthesis_ms: u64) -> Self {
        Self {
            retrieval: Duration::from_millis(retrieval_ms).max(MIN_DELAY),
            synthesis: Duration::from_millis(synthesis_ms).max(MIN_DELAY),
        }
    }

    pub fn delay_for(&self, point: PacePoint) -> Duration {
        match point {
            PacePoint::BetweenRetrievals => self.retrieval,
            PacePoint::BeforeSynthesis => self.synthesis,
        }
    }
}

impl Default for FixedPacer {
    fn default() -> Self {
        Self::from_millis(3000, 1500)
    }
}

#[async_trait]
impl Pacer for FixedPacer {
    async fn pause(&self, point: PacePoint) {
        let delay = self.delay_for(point);
        debug!(?point, delay_ms = delay.as_millis() as u64, "pacing");
        tokio::time::sleep(delay).await;
    }
}

/// Never waits. For tests and offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer;

#[async_trait]
impl Pacer for NoPacer {
    async fn pause(&self, _point: PacePoint) {}
}
