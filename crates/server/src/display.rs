//! 8×8 bitmap encoding of plant mood for the physical LED matrix.

use crate::engine::Category;

pub type Matrix = [[u8; 8]; 8];

pub const HAPPY: Matrix = [
    [0, 0, 1, 1, 1, 1, 0, 0],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [1, 0, 0, 1, 1, 0, 0, 1],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [0, 0, 1, 1, 1, 1, 0, 0],
];

pub const NEUTRAL: Matrix = [
    [0, 0, 1, 1, 1, 1, 0, 0],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 1, 1, 1, 1, 0, 1],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [0, 0, 1, 1, 1, 1, 0, 0],
];

pub const SAD: Matrix = [
    [0, 0, 1, 1, 1, 1, 0, 0],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 1, 1, 0, 0, 1],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [0, 0, 1, 1, 1, 1, 0, 0],
];

/// Pick the bitmap for a status. When a mood score is available it takes
/// precedence over the category: the physical display consumer keys off
/// score bands (≥0.7 happy, ≥0.4 neutral, else sad), which can disagree
/// with the category right at the thresholds. Keep it that way.
pub fn matrix_for(category: Category, mood_index: Option<f64>) -> &'static Matrix {
    if let Some(score) = mood_index {
        return if score >= 0.7 {
            &HAPPY
        } else if score >= 0.4 {
            &NEUTRAL
        } else {
            &SAD
        };
    }
    match category {
        Category::Healthy => &HAPPY,
        Category::Recovering => &NEUTRAL,
        Category::Bad => &SAD,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
