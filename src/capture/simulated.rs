//! Simulated fingerprint reader
//!
//! Deterministic synthetic scans for development and testing without
//! hardware: every finger seed produces a stable ridge-density pattern,
//! and every scan of that finger gets its own sensor noise, so repeated
//! scans agree without ever being bit-identical.

use std::collections::VecDeque;

use super::{CaptureEvent, CaptureSource};
use crate::biometric::{QualityFeedback, RawSample};

const SCAN_SIZE: u32 = 96;
/// Synthetic pattern raster; one density cell spans 12x12 pixels
const PATTERN_CELLS: u32 = 8;

/// Tiny deterministic PRNG for synthetic scans (xorshift64).
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).max(1),
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Synthesize one scan of the given finger.
///
/// The per-cell gray levels depend only on `finger_seed`; the additive
/// noise depends on the scan index as well.
pub(crate) fn synth_scan(finger_seed: u64, scan_index: u32) -> RawSample {
    let mut pattern = Rng::new(finger_seed);
    let cells: Vec<i32> = (0..PATTERN_CELLS * PATTERN_CELLS)
        .map(|_| 40 + (pattern.next() % 150) as i32)
        .collect();

    let mut noise = Rng::new(finger_seed ^ ((scan_index as u64 + 1) << 32));
    let cell_span = SCAN_SIZE / PATTERN_CELLS;

    let mut pixels = Vec::with_capacity((SCAN_SIZE * SCAN_SIZE) as usize);
    for y in 0..SCAN_SIZE {
        for x in 0..SCAN_SIZE {
            let cell = (y / cell_span) * PATTERN_CELLS + (x / cell_span);
            // Ridge texture: alternating dark/light stripes every 3 pixels
            let stripe = if (x / 3) % 2 == 0 { -35 } else { 35 };
            let jitter = (noise.next() % 13) as i32 - 6;
            let value = cells[cell as usize] + stripe + jitter;
            pixels.push(value.clamp(0, 255) as u8);
        }
    }

    RawSample::new(SCAN_SIZE, SCAN_SIZE, pixels).expect("synthetic scan dimensions are fixed")
}

/// Scripted reader producing `scans` touch/capture/lift cycles of one
/// synthetic finger.
pub struct SimulatedReader {
    events: VecDeque<CaptureEvent>,
}

impl SimulatedReader {
    pub fn new(finger_seed: u64, scans: u32) -> Self {
        let mut events = VecDeque::new();
        events.push_back(CaptureEvent::ReaderConnected("simulated".into()));
        for scan in 0..scans {
            events.push_back(CaptureEvent::FingerTouched);
            events.push_back(CaptureEvent::SampleQuality(QualityFeedback::Good));
            events.push_back(CaptureEvent::SampleCaptured(synth_scan(finger_seed, scan)));
            events.push_back(CaptureEvent::FingerLifted);
        }
        events.push_back(CaptureEvent::ReaderDisconnected("simulated".into()));

        log::info!("simulated reader ready: finger seed {finger_seed}, {scans} scans");
        Self { events }
    }
}

impl CaptureSource for SimulatedReader {
    fn next_event(&mut self) -> Option<CaptureEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::extractor::{ExtractorConfig, FeatureExtractor, GridExtractor};
    use crate::biometric::{cosine, SamplePurpose};

    fn features_of(seed: u64, scan: u32) -> Vec<f32> {
        let extractor = GridExtractor::new(ExtractorConfig::default());
        let (features, feedback) = extractor
            .extract(&synth_scan(seed, scan), SamplePurpose::Enrollment)
            .unwrap();
        assert!(feedback.is_good(), "synthetic scan failed gate: {feedback}");
        features.vector().to_vec()
    }

    #[test]
    fn test_scans_are_deterministic_but_not_identical() {
        let a = synth_scan(7, 0);
        let b = synth_scan(7, 0);
        assert_eq!(a.pixels(), b.pixels());

        let c = synth_scan(7, 1);
        assert_ne!(a.pixels(), c.pixels());
    }

    #[test]
    fn test_same_finger_scans_agree() {
        let a = features_of(7, 0);
        let b = features_of(7, 3);
        assert!(cosine(&a, &b) > 0.95);
    }

    #[test]
    fn test_different_fingers_disagree() {
        let a = features_of(7, 0);
        let b = features_of(8, 0);
        assert!(cosine(&a, &b) < 0.5);
    }

    #[test]
    fn test_event_script_shape() {
        let mut reader = SimulatedReader::new(1, 2);
        let mut captured = 0;
        let mut disconnects = 0;
        while let Some(event) = reader.next_event() {
            match event {
                CaptureEvent::SampleCaptured(_) => captured += 1,
                CaptureEvent::ReaderDisconnected(_) => disconnects += 1,
                _ => {}
            }
        }
        assert_eq!(captured, 2);
        assert_eq!(disconnects, 1);
    }
}
