//! Sensor normalization and health-status derivation.
//!
//! `normalize` rescales/clamps raw analog values into canonical units;
//! `StatusEngine::compute` turns a normalized sample into a health category
//! and a continuous mood score. Thresholds and the category→glyph table are
//! injected at construction so nothing in here touches shared state.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Coarse health classification, stored and serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
    Healthy,
    Recovering,
    Bad,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Recovering => "recovering",
            Self::Bad => "bad",
        }
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Thresholds and glyphs for the status engine. Loaded from the `[engine]`
/// section of the config file; the defaults below are the calibrated values
/// for the standard sensor suite.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Survivable temperature band, °C.
    pub temp_min: f64,
    pub temp_max: f64,
    /// Acceptable light band on the 0–1023 device scale.
    pub light_min: f64,
    pub light_max: f64,
    /// Soil moisture (%) at or above which the plant is waterlogged-adjacent
    /// and classified recovering.
    pub moisture_recovering_min: f64,
    /// Soil moisture (%) above which the plant is flooded (bad).
    pub moisture_max: f64,
    pub glyph_healthy: String,
    pub glyph_recovering: String,
    pub glyph_bad: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_min: 15.0,
            temp_max: 35.0,
            light_min: 100.0,
            light_max: 900.0,
            moisture_recovering_min: 70.0,
            moisture_max: 80.0,
            glyph_healthy: "😊".to_string(),
            glyph_recovering: "😐".to_string(),
            glyph_bad: "😢".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Samples and moods
// ---------------------------------------------------------------------------

/// A sensor sample in canonical units: °C, 0–1023 light, 0–100 % moisture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub temperature: f64,
    pub light: f64,
    pub soil_moisture: f64,
}

/// A derived health classification: category plus continuous mood score and
/// the display glyph for that category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mood {
    pub category: Category,
    pub mood_index: f64,
    pub mood_face: String,
}

/// Full scale of the light sensor's device-native range.
const LIGHT_SCALE_MAX: f64 = 1023.0;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StatusEngine {
    cfg: EngineConfig,
}

impl StatusEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    pub fn glyph(&self, category: Category) -> &str {
        match category {
            Category::Healthy => &self.cfg.glyph_healthy,
            Category::Recovering => &self.cfg.glyph_recovering,
            Category::Bad => &self.cfg.glyph_bad,
        }
    }

    /// Clamp/rescale raw analog values into canonical units. Out-of-range
    /// inputs are clamped, never rejected: field hardware is noisy and a
    /// wild reading is still a reading.
    ///
    /// Light arrives on two scales depending on firmware: a [0,1] fraction
    /// or the raw 0–1023 ADC value. A value ≤ 1 is treated as a fraction and
    /// rescaled before clamping.
    pub fn normalize(&self, temperature: f64, light: f64, soil_moisture: f64) -> Sample {
        let light = if light <= 1.0 {
            light * LIGHT_SCALE_MAX
        } else {
            light
        };
        Sample {
            temperature: temperature.clamp(self.cfg.temp_min, self.cfg.temp_max),
            light: light.clamp(0.0, LIGHT_SCALE_MAX),
            soil_moisture: soil_moisture.clamp(0.0, 100.0),
        }
    }

    /// Derive category and mood score from a sample. First match wins:
    ///
    /// 1. any band violation → bad (0.3 for one violation, 0.1 for more);
    /// 2. moisture in the recovering band → recovering, score interpolated
    ///    from 0.7 at the band floor down to 0.4 at the flood line;
    /// 3. otherwise healthy, 0.7 + 0.3 × fraction of bands satisfied.
    pub fn compute(&self, temperature: f64, light: f64, soil_moisture: f64) -> Mood {
        let temp_ok = (self.cfg.temp_min..=self.cfg.temp_max).contains(&temperature);
        let light_ok = (self.cfg.light_min..=self.cfg.light_max).contains(&light);
        let moisture_ok = soil_moisture <= self.cfg.moisture_max;

        let violations = [temp_ok, light_ok, moisture_ok]
            .iter()
            .filter(|ok| !**ok)
            .count();

        let (category, score) = if violations > 0 {
            let score = if violations == 1 { 0.3 } else { 0.1 };
            (Category::Bad, score)
        } else if soil_moisture >= self.cfg.moisture_recovering_min {
            let span = self.cfg.moisture_max - self.cfg.moisture_recovering_min;
            let t = (soil_moisture - self.cfg.moisture_recovering_min) / span;
            (Category::Recovering, 0.7 - 0.3 * t)
        } else {
            let in_range = [temp_ok, light_ok, moisture_ok]
                .iter()
                .filter(|ok| **ok)
                .count();
            (Category::Healthy, 0.7 + 0.3 * in_range as f64 / 3.0)
        };

        Mood {
            category,
            mood_index: round2(score),
            mood_face: self.glyph(category).to_string(),
        }
    }

    /// Build a mood directly from an explicit category/score, bypassing the
    /// decision tree. Used by the read-only status query when no stored
    /// status exists yet.
    pub fn mood_override(&self, category: Category, mood_index: f64) -> Mood {
        Mood {
            category,
            mood_index: round2(mood_index),
            mood_face: self.glyph(category).to_string(),
        }
    }

    /// The no-data default: a neutral recovering face at 0.5.
    pub fn default_mood(&self) -> Mood {
        self.mood_override(Category::Recovering, 0.5)
    }
}

impl Default for StatusEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> StatusEngine {
        StatusEngine::default()
    }

    // -- normalize ---------------------------------------------------------

    #[test]
    fn normalize_clamps_everything_into_bounds() {
        let e = engine();
        for &t in &[-40.0, 0.0, 15.0, 22.5, 35.0, 90.0] {
            for &l in &[-5.0, 0.0, 0.5, 1.0, 100.0, 1023.0, 5000.0] {
                for &m in &[-10.0, 0.0, 50.0, 100.0, 250.0] {
                    let s = e.normalize(t, l, m);
                    assert!((15.0..=35.0).contains(&s.temperature), "temp {t} -> {}", s.temperature);
                    assert!((0.0..=1023.0).contains(&s.light), "light {l} -> {}", s.light);
                    assert!(
                        (0.0..=100.0).contains(&s.soil_moisture),
                        "moisture {m} -> {}",
                        s.soil_moisture
                    );
                }
            }
        }
    }

    #[test]
    fn normalize_rescales_fractional_light() {
        let s = engine().normalize(20.0, 0.5, 50.0);
        assert_eq!(s.light, 511.5);
    }

    #[test]
    fn normalize_treats_exactly_one_as_fraction() {
        let s = engine().normalize(20.0, 1.0, 50.0);
        assert_eq!(s.light, 1023.0);
    }

    #[test]
    fn normalize_passes_native_scale_light_through() {
        let s = engine().normalize(20.0, 500.0, 50.0);
        assert_eq!(s.light, 500.0);
    }

    #[test]
    fn normalize_clamps_negative_light_to_zero() {
        let s = engine().normalize(20.0, -3.0, 50.0);
        assert_eq!(s.light, 0.0);
    }

    #[test]
    fn normalize_clamps_cold_temperature_up() {
        let s = engine().normalize(4.0, 500.0, 50.0);
        assert_eq!(s.temperature, 15.0);
    }

    // -- compute: category decisions ---------------------------------------

    #[test]
    fn ideal_sample_is_healthy() {
        let mood = engine().compute(25.0, 500.0, 50.0);
        assert_eq!(mood.category, Category::Healthy);
        assert!(mood.mood_index >= 0.7, "got {}", mood.mood_index);
        assert_eq!(mood.mood_face, "😊");
    }

    #[test]
    fn cold_temperature_is_bad() {
        let mood = engine().compute(10.0, 500.0, 50.0);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.3);
        assert_eq!(mood.mood_face, "😢");
    }

    #[test]
    fn hot_temperature_is_bad() {
        let mood = engine().compute(40.0, 500.0, 50.0);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.3);
    }

    #[test]
    fn dim_light_is_bad() {
        let mood = engine().compute(25.0, 50.0, 50.0);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.3);
    }

    #[test]
    fn flooded_soil_is_bad() {
        let mood = engine().compute(25.0, 500.0, 85.0);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.3);
    }

    #[test]
    fn multiple_violations_floor_the_score() {
        let mood = engine().compute(10.0, 50.0, 50.0);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.1);

        let mood = engine().compute(10.0, 50.0, 95.0);
        assert_eq!(mood.mood_index, 0.1);
    }

    #[test]
    fn wet_soil_is_recovering() {
        let mood = engine().compute(25.0, 500.0, 75.0);
        assert_eq!(mood.category, Category::Recovering);
        assert!(
            mood.mood_index > 0.4 && mood.mood_index < 0.7,
            "got {}",
            mood.mood_index
        );
        assert_eq!(mood.mood_index, 0.55);
        assert_eq!(mood.mood_face, "😐");
    }

    #[test]
    fn recovering_band_floor_scores_point_seven() {
        let mood = engine().compute(25.0, 500.0, 70.0);
        assert_eq!(mood.category, Category::Recovering);
        assert_eq!(mood.mood_index, 0.7);
    }

    #[test]
    fn recovering_band_ceiling_scores_point_four() {
        let mood = engine().compute(25.0, 500.0, 80.0);
        assert_eq!(mood.category, Category::Recovering);
        assert_eq!(mood.mood_index, 0.4);
    }

    #[test]
    fn just_past_flood_line_is_bad_not_recovering() {
        let mood = engine().compute(25.0, 500.0, 80.1);
        assert_eq!(mood.category, Category::Bad);
    }

    #[test]
    fn mood_index_rounds_to_two_decimals() {
        // moisture 70.33 -> 0.7 - 0.3 * 0.033 = 0.6901 -> 0.69
        let mood = engine().compute(25.0, 500.0, 70.33);
        assert_eq!(mood.mood_index, 0.69);
    }

    // -- compute: boundary temperatures ------------------------------------

    #[test]
    fn band_edges_are_inclusive() {
        assert_eq!(engine().compute(15.0, 500.0, 50.0).category, Category::Healthy);
        assert_eq!(engine().compute(35.0, 500.0, 50.0).category, Category::Healthy);
        assert_eq!(engine().compute(25.0, 100.0, 50.0).category, Category::Healthy);
        assert_eq!(engine().compute(25.0, 900.0, 50.0).category, Category::Healthy);
    }

    // -- override entry point ----------------------------------------------

    #[test]
    fn default_mood_is_neutral_recovering() {
        let mood = engine().default_mood();
        assert_eq!(mood.category, Category::Recovering);
        assert_eq!(mood.mood_index, 0.5);
        assert_eq!(mood.mood_face, "😐");
    }

    #[test]
    fn mood_override_bypasses_decision_tree() {
        let mood = engine().mood_override(Category::Bad, 0.987);
        assert_eq!(mood.category, Category::Bad);
        assert_eq!(mood.mood_index, 0.99);
        assert_eq!(mood.mood_face, "😢");
    }

    // -- custom thresholds --------------------------------------------------

    #[test]
    fn custom_config_shifts_the_bands() {
        let cfg = EngineConfig {
            temp_min: 5.0,
            temp_max: 20.0,
            ..EngineConfig::default()
        };
        let e = StatusEngine::new(cfg);
        assert_eq!(e.compute(10.0, 500.0, 50.0).category, Category::Healthy);
        assert_eq!(e.compute(25.0, 500.0, 50.0).category, Category::Bad);
    }

    #[test]
    fn category_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Healthy).unwrap(), "\"healthy\"");
        assert_eq!(serde_json::to_string(&Category::Bad).unwrap(), "\"bad\"");
    }
}
