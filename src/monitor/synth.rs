use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed demo heart rate.
pub const HEART_RATE_BPM: u32 = 75;
/// Cycle length derived from the heart rate (800 ms at 75 bpm).
pub const CYCLE_MS: f64 = 60_000.0 / HEART_RATE_BPM as f64;
/// Cadence the engine drives the synthesizer at (100 Hz).
pub const TICK_MS: u64 = 10;
/// Per-tick probability of injecting a lead-off fault.
pub const FAULT_PROBABILITY: f64 = 0.001;

const BASELINE: f64 = 512.0;

/// Noise-free PQRST shape for one cardiac cycle, `phase` in [0, 1).
///
/// Each deflection is a half-sine over its phase window; the PR and ST
/// segments and the end of the cycle sit on the baseline.
pub fn pqrst(phase: f64) -> f64 {
    let mut value = BASELINE;
    if (0.00..0.10).contains(&phase) {
        // P wave
        value += 30.0 * (PI * (phase - 0.00) / 0.10).sin();
    } else if (0.20..0.22).contains(&phase) {
        // Q wave
        value -= 20.0 * (PI * (phase - 0.20) / 0.02).sin();
    } else if (0.22..0.26).contains(&phase) {
        // R wave, the dominant peak
        value += 250.0 * (PI * (phase - 0.22) / 0.04).sin();
    } else if (0.26..0.28).contains(&phase) {
        // S wave
        value -= 40.0 * (PI * (phase - 0.26) / 0.02).sin();
    } else if (0.40..0.55).contains(&phase) {
        // T wave
        value += 50.0 * (PI * (phase - 0.40) / 0.15).sin();
    }
    value
}

/// Generator of physiologically shaped sample values over elapsed time,
/// used when no physical source is attached.
pub struct WaveSynth {
    rng: StdRng,
}

impl WaveSynth {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample value for `elapsed_ms` since the producer epoch, in [0, 1023].
    pub fn sample(&mut self, elapsed_ms: u64) -> i32 {
        let phase = (elapsed_ms as f64 % CYCLE_MS) / CYCLE_MS;
        let value = pqrst(phase) + self.rng.gen_range(-2.5..2.5);
        value.round().clamp(0.0, 1023.0) as i32
    }

    /// Independent per-tick draw for the stochastic lead-off injector.
    pub fn fault_due(&mut self) -> bool {
        self.rng.gen_bool(FAULT_PROBABILITY)
    }
}

impl Default for WaveSynth {
    fn default() -> Self {
        Self::new()
    }
}
