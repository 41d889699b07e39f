//! TOML config file loading and validation: status-engine thresholds plus
//! optional seed records for standalone bring-up.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use time::OffsetDateTime;

use crate::db::Db;
use crate::engine::EngineConfig;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub seed: Seed,
}

/// Records created on startup if they do not already exist. The platform's
/// CRUD surface normally owns these tables; seeding covers a fresh install
/// that needs at least one adoptable plant before any telemetry can land.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub foundations: Vec<FoundationEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub plants: Vec<PlantEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FoundationEntry {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserEntry {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlantEntry {
    pub name: String,
    pub species: Option<String>,
    #[serde(default)]
    pub is_adopted: bool,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_engine(&mut errors);
        self.validate_seed(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_engine(&self, errors: &mut Vec<String>) {
        let e = &self.engine;

        if e.temp_min >= e.temp_max {
            errors.push(format!(
                "engine: temp_min ({}) must be below temp_max ({})",
                e.temp_min, e.temp_max
            ));
        }
        if e.light_min >= e.light_max {
            errors.push(format!(
                "engine: light_min ({}) must be below light_max ({})",
                e.light_min, e.light_max
            ));
        }
        if !(0.0..=1023.0).contains(&e.light_min) || !(0.0..=1023.0).contains(&e.light_max) {
            errors.push(format!(
                "engine: light band [{}, {}] outside the 0-1023 device scale",
                e.light_min, e.light_max
            ));
        }
        if e.moisture_recovering_min >= e.moisture_max {
            errors.push(format!(
                "engine: moisture_recovering_min ({}) must be below moisture_max ({})",
                e.moisture_recovering_min, e.moisture_max
            ));
        }
        if !(0.0..=100.0).contains(&e.moisture_recovering_min)
            || !(0.0..=100.0).contains(&e.moisture_max)
        {
            errors.push(format!(
                "engine: moisture band [{}, {}] outside the 0-100 scale",
                e.moisture_recovering_min, e.moisture_max
            ));
        }
        for (label, glyph) in [
            ("glyph_healthy", &e.glyph_healthy),
            ("glyph_recovering", &e.glyph_recovering),
            ("glyph_bad", &e.glyph_bad),
        ] {
            if glyph.is_empty() {
                errors.push(format!("engine: {label} is empty"));
            }
        }
    }

    fn validate_seed(&self, errors: &mut Vec<String>) {
        let mut seen_foundations: HashSet<&str> = HashSet::new();
        for (i, f) in self.seed.foundations.iter().enumerate() {
            if f.name.trim().is_empty() {
                errors.push(format!("seed.foundations[{i}]: name is empty"));
            } else if !seen_foundations.insert(&f.name) {
                errors.push(format!("seed.foundations[{i}]: duplicate name '{}'", f.name));
            }
        }

        let mut seen_users: HashSet<&str> = HashSet::new();
        for (i, u) in self.seed.users.iter().enumerate() {
            if u.name.trim().is_empty() {
                errors.push(format!("seed.users[{i}]: name is empty"));
            } else if !seen_users.insert(&u.name) {
                errors.push(format!("seed.users[{i}]: duplicate name '{}'", u.name));
            }
        }

        let mut seen_plants: HashSet<&str> = HashSet::new();
        for (i, p) in self.seed.plants.iter().enumerate() {
            if p.name.trim().is_empty() {
                errors.push(format!("seed.plants[{i}]: name is empty"));
            } else if !seen_plants.insert(&p.name) {
                errors.push(format!("seed.plants[{i}]: duplicate name '{}'", p.name));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load + apply
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file is not an
/// error: the engine has sensible built-in defaults.
pub fn load(path: &str) -> Result<Config> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file found, using built-in defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config: {path}"));
        }
    };
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Create all seed records that do not already exist. Idempotent by name,
/// so restarting the server never duplicates rows.
pub async fn apply(config: &Config, db: &Db) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    for f in &config.seed.foundations {
        if db.foundation_by_name(&f.name).await?.is_none() {
            db.insert_foundation(&f.name, now)
                .await
                .with_context(|| format!("failed to seed foundation '{}'", f.name))?;
        }
    }

    for u in &config.seed.users {
        if db.user_by_name(&u.name).await?.is_none() {
            db.insert_user(&u.name, now)
                .await
                .with_context(|| format!("failed to seed user '{}'", u.name))?;
        }
    }

    for p in &config.seed.plants {
        if db.plant_by_name(&p.name).await?.is_none() {
            db.insert_plant(&p.name, p.species.as_deref(), p.is_adopted)
                .await
                .with_context(|| format!("failed to seed plant '{}'", p.name))?;
        }
    }

    tracing::info!(
        foundations = config.seed.foundations.len(),
        users = config.seed.users.len(),
        plants = config.seed.plants.len(),
        "config applied"
    );

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
