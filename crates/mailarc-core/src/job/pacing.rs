//! Batch pacing for bulk remote operations.
//!
//! Sync, restore and import loops call [`Pacer::pace`] before each item
//! so providers are not hammered at full speed. The sleeps are also the
//! suspension points where cancellation gets observed promptly.

use std::time::Duration;

/// Pause configuration for bulk operations.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Items per batch.
    pub batch_size: usize,
    /// Pause between two items inside a batch.
    pub pause_between_items: Duration,
    /// Pause on a batch boundary.
    pub pause_between_batches: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            pause_between_items: Duration::from_millis(50),
            pause_between_batches: Duration::from_secs(1),
        }
    }
}

impl PacingConfig {
    /// Pacing with no pauses, for tests and local imports.
    #[must_use]
    pub const fn unpaced() -> Self {
        Self {
            batch_size: usize::MAX,
            pause_between_items: Duration::ZERO,
            pause_between_batches: Duration::ZERO,
        }
    }
}

/// Tracks the item position inside the batch cadence.
#[derive(Debug)]
pub struct Pacer {
    config: PacingConfig,
    items: usize,
}

impl Pacer {
    /// Create a pacer for one bulk loop.
    #[must_use]
    pub const fn new(config: PacingConfig) -> Self {
        Self { config, items: 0 }
    }

    /// Sleep according to the cadence. Call once before each item; the
    /// first item never sleeps.
    pub async fn pace(&mut self) {
        if self.items > 0 {
            let boundary = self.config.batch_size > 0 && self.items % self.config.batch_size == 0;
            let pause = if boundary {
                self.config.pause_between_batches
            } else {
                self.config.pause_between_items
            };
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        self.items += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn first_item_is_not_delayed() {
        let mut pacer = Pacer::new(PacingConfig::default());
        let start = Instant::now();
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_boundaries_use_the_longer_pause() {
        let config = PacingConfig {
            batch_size: 2,
            pause_between_items: Duration::from_millis(10),
            pause_between_batches: Duration::from_millis(100),
        };
        let mut pacer = Pacer::new(config);

        let start = Instant::now();
        for _ in 0..5 {
            pacer.pace().await;
        }
        // item pauses after items 1 and 3, batch pauses after items 2 and 4
        assert_eq!(start.elapsed(), Duration::from_millis(220));
    }

    #[tokio::test(start_paused = true)]
    async fn unpaced_never_sleeps() {
        let mut pacer = Pacer::new(PacingConfig::unpaced());
        let start = Instant::now();
        for _ in 0..100 {
            pacer.pace().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
