//! Stateful plant-sensor simulator for local development.
//!
//! Produces coherent soil moisture (%), light (0–1023 device scale) and
//! temperature (°C) readings:
//! - Temporal coherence via random walk with mean reversion
//! - Scenario-specific moisture drift (drying out, waterlogging)
//! - Diurnal (day/night) light cycle with per-reading noise
//! - Occasional spikes (sensor flakiness)

use std::fmt;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Everything in band. The plant stays healthy.
    Thriving,
    /// Moisture drifts steadily toward dry. Exercises the healthy range
    /// from the low end without usually leaving it.
    Drying,
    /// Hovers around the waterlogged band so the backend flips between
    /// recovering and bad.
    Swamped,
    /// Light well below the acceptable band. The plant reads bad on light
    /// while moisture and temperature stay fine.
    Gloomy,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "drying" => Self::Drying,
            "swamped" => Self::Swamped,
            "gloomy" => Self::Gloomy,
            _ => Self::Thriving, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thriving => write!(f, "thriving"),
            Self::Drying => write!(f, "drying"),
            Self::Swamped => write!(f, "swamped"),
            Self::Gloomy => write!(f, "gloomy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// One synthetic reading of the full sensor suite.
#[derive(Debug, Clone, Copy)]
pub struct SampleSet {
    pub temperature: f64,
    pub light: f64,
    pub soil_moisture: f64,
}

/// Stateful simulator producing coherent readings across the three sensors.
pub struct PlantSim {
    // Moisture random walk
    moisture: f64,
    moisture_center: f64,
    moisture_drift: f64,
    walk_sigma: f64,
    mean_reversion: f64,

    // Temperature random walk
    temperature: f64,
    temp_center: f64,
    temp_sigma: f64,

    // Diurnal light cycle
    light_base: f64,
    light_amplitude: f64,
    light_sigma: f64,
    diurnal_period_s: f64,
    tick: u64,
    tick_seconds: f64,

    // Sensor flakiness
    spike_prob: f32,
    spike_sigma: f64,
}

impl PlantSim {
    /// Create a simulator. `diurnal_period_s` controls the day/night cycle
    /// length and `tick_seconds` how much simulated time passes per sample.
    /// Use a short period (600 s) for fast dev iteration or 86400 for
    /// real-time.
    pub fn new(scenario: Scenario, diurnal_period_s: f64, tick_seconds: f64) -> Self {
        let (m_start, m_center, m_drift, walk_sigma, mean_rev, l_base, l_amp, spike_prob) =
            match scenario {
                Scenario::Thriving => (50.0, 50.0, 0.0, 0.8, 0.05, 500.0, 250.0, 0.01_f32),
                Scenario::Drying => (45.0, 20.0, -0.15, 0.8, 0.02, 500.0, 250.0, 0.01),
                Scenario::Swamped => (75.0, 78.0, 0.05, 1.0, 0.05, 400.0, 200.0, 0.01),
                Scenario::Gloomy => (50.0, 50.0, 0.0, 0.8, 0.05, 55.0, 30.0, 0.01),
            };

        Self {
            moisture: m_start,
            moisture_center: m_center,
            moisture_drift: m_drift,
            walk_sigma,
            mean_reversion: mean_rev,
            temperature: 23.0,
            temp_center: 23.0,
            temp_sigma: 0.15,
            light_base: l_base,
            light_amplitude: l_amp,
            light_sigma: 20.0,
            diurnal_period_s,
            tick: 0,
            tick_seconds,
            spike_prob,
            spike_sigma: 15.0,
        }
    }

    /// Produce the next reading. The internal state evolves with each call,
    /// so call frequency matters.
    pub fn sample(&mut self) -> SampleSet {
        // -- Moisture: drift + mean reversion + random walk ----------------
        let pull = self.mean_reversion * (self.moisture_center - self.moisture);
        let walk = gaussian(0.0, self.walk_sigma);
        self.moisture = (self.moisture + self.moisture_drift + pull + walk).clamp(0.0, 100.0);

        // -- Temperature: slow walk around the room temperature ------------
        let pull = 0.05 * (self.temp_center - self.temperature);
        self.temperature += pull + gaussian(0.0, self.temp_sigma);

        // -- Light: sinusoidal day/night cycle plus noise -------------------
        let now_s = self.tick as f64 * self.tick_seconds;
        self.tick += 1;
        let phase = 2.0 * std::f64::consts::PI * now_s / self.diurnal_period_s;
        let mut light = self.light_base + self.light_amplitude * phase.sin();
        light += gaussian(0.0, self.light_sigma);
        if fastrand::f32() < self.spike_prob {
            light += gaussian(0.0, self.spike_sigma * 10.0);
        }

        SampleSet {
            temperature: (self.temperature * 100.0).round() / 100.0,
            light: light.clamp(0.0, 1023.0).round(),
            soil_moisture: (self.moisture * 100.0).round() / 100.0,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
