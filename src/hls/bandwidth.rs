use std::collections::VecDeque;

/// How many target durations of history the estimate covers.
const ESTIMATE_WINDOW_FACTOR: f64 = 5.0;

struct Block {
    size_bits: u64,
    duration: f64,
}

/// Sliding-window bitrate estimator for playlist bandwidth attributes.
///
/// Each media segment contributes one block; the average is taken over the
/// most recent blocks covering a window derived from the target segment
/// duration, while the maximum tracks the single hottest block ever seen.
pub struct BandwidthEstimator {
    window_seconds: f64,
    blocks: VecDeque<Block>,
    total_bits: u64,
    total_duration: f64,
    max_bitrate: u64,
}

impl BandwidthEstimator {
    /// Creates an estimator whose averaging window is sized from the
    /// target segment duration.
    pub fn new(target_segment_duration: f64) -> Self {
        Self {
            window_seconds: (target_segment_duration * ESTIMATE_WINDOW_FACTOR).max(1.0),
            blocks: VecDeque::new(),
            total_bits: 0,
            total_duration: 0.0,
            max_bitrate: 0,
        }
    }

    /// Accounts one segment of `size_bytes` bytes lasting
    /// `duration_seconds`. Zero-duration blocks are ignored.
    pub fn add_block(&mut self, size_bytes: u64, duration_seconds: f64) {
        if duration_seconds <= 0.0 {
            return;
        }
        let size_bits = size_bytes * 8;
        let bitrate = (size_bits as f64 / duration_seconds).ceil() as u64;
        self.max_bitrate = self.max_bitrate.max(bitrate);

        self.blocks.push_back(Block {
            size_bits,
            duration: duration_seconds,
        });
        self.total_bits += size_bits;
        self.total_duration += duration_seconds;

        // Drop history beyond the window, but always keep the newest block.
        while self.blocks.len() > 1 {
            let front = self.blocks.front().unwrap();
            if self.total_duration - front.duration < self.window_seconds {
                break;
            }
            self.total_bits -= front.size_bits;
            self.total_duration -= front.duration;
            self.blocks.pop_front();
        }
    }

    /// The windowed average bitrate in bits per second.
    pub fn estimate(&self) -> u64 {
        if self.total_duration <= 0.0 {
            return 0;
        }
        (self.total_bits as f64 / self.total_duration).ceil() as u64
    }

    /// The highest per-block bitrate observed.
    pub fn max(&self) -> u64 {
        self.max_bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_block() {
        let mut estimator = BandwidthEstimator::new(10.0);
        estimator.add_block(1_000_000, 8.0);
        assert_eq!(estimator.estimate(), 1_000_000);
        assert_eq!(estimator.max(), 1_000_000);
    }

    #[test]
    fn test_window_eviction() {
        let mut estimator = BandwidthEstimator::new(1.0);
        // The first block leaves the 5-second window as later ones arrive.
        estimator.add_block(10_000_000, 4.0);
        for _ in 0..5 {
            estimator.add_block(125_000, 1.0);
        }
        // Average now reflects the recent 1 Mbps blocks only.
        assert_eq!(estimator.estimate(), 1_000_000);
        // The old peak is still the max.
        assert_eq!(estimator.max(), 20_000_000);
    }

    #[test]
    fn test_zero_duration_ignored() {
        let mut estimator = BandwidthEstimator::new(10.0);
        estimator.add_block(500, 0.0);
        assert_eq!(estimator.estimate(), 0);
        assert_eq!(estimator.max(), 0);
    }
}
