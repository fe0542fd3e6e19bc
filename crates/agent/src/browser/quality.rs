// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// JPEG quality bounds for the screencast.
pub const MIN_QUALITY: u8 = 20;
pub const MAX_QUALITY: u8 = 90;

const DEFAULT_QUALITY: u8 = 70;
const STEP: u8 = 10;

/// Rolling-window size for the latency estimate.
const WINDOW: usize = 10;
/// Raise quality when the rolling mean sits below this.
const LOW_WATERMARK_MS: u64 = 150;
/// Lower quality when the rolling mean climbs above this.
const HIGH_WATERMARK_MS: u64 = 400;
/// Minimum gap between adjustments; with the watermark band this is what
/// keeps the controller from oscillating.
const ADJUST_COOLDOWN: Duration = Duration::from_secs(2);

/// Screencast quality policy driven by frame-ack round-trip times.
///
/// Quality moves one step at a time within `[MIN_QUALITY, MAX_QUALITY]`:
/// down when the rolling mean RTT exceeds the high watermark, up when it
/// sits under the low one, and never more often than the cooldown allows.
#[derive(Debug)]
pub struct QualityController {
    samples: VecDeque<u64>,
    quality: u8,
    last_adjust: Option<Instant>,
}

impl QualityController {
    pub fn new() -> Self {
        Self { samples: VecDeque::with_capacity(WINDOW), quality: DEFAULT_QUALITY, last_adjust: None }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Record one ack RTT. Returns the new quality when the policy wants
    /// the screencast restarted at a different setting.
    pub fn record(&mut self, rtt_ms: u64) -> Option<u8> {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt_ms);
        if self.samples.len() < WINDOW / 2 {
            return None;
        }

        if let Some(last) = self.last_adjust {
            if last.elapsed() < ADJUST_COOLDOWN {
                return None;
            }
        }

        let mean = self.samples.iter().sum::<u64>() / self.samples.len() as u64;
        let next = if mean > HIGH_WATERMARK_MS {
            self.quality.saturating_sub(STEP).max(MIN_QUALITY)
        } else if mean < LOW_WATERMARK_MS {
            (self.quality + STEP).min(MAX_QUALITY)
        } else {
            self.quality
        };

        if next == self.quality {
            return None;
        }
        self.quality = next;
        self.last_adjust = Some(Instant::now());
        // A regime change deserves a fresh window.
        self.samples.clear();
        Some(next)
    }

    /// Forget history (screencast restart).
    pub fn reset(&mut self) {
        self.samples.clear();
        self.quality = DEFAULT_QUALITY;
        self.last_adjust = None;
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
