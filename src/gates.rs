use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BlueprintError, Result};
use crate::CelestialBody;

/// Width of one gate on the wheel: 360 / 64.
pub const GATE_DEGREES: f64 = 5.625;
/// Width of one line within a gate: GATE_DEGREES / 6.
pub const LINE_DEGREES: f64 = 0.9375;

/// The I-Ching wheel in zodiacal order, rotated so that slot 0 is the gate
/// containing 0 degrees Aries. 64 slots of exactly 5.625 degrees each cover
/// the full circle with no gaps or overlaps.
pub const GATE_WHEEL: [u8; 64] = [
    25, 17, 21, 51, 42, 3, // Aries
    27, 24, 2, 23, 8, // Taurus
    20, 16, 35, 45, 12, 15, // Gemini
    52, 39, 53, 62, 56, 31, // Cancer
    33, 7, 4, 29, 59, 40, // Leo
    64, 47, 6, 46, 18, 48, // Virgo
    57, 32, 50, 28, 44, // Libra
    1, 43, 14, 34, 9, 5, // Scorpio
    26, 11, 10, 58, 38, 54, // Sagittarius
    61, 60, // Capricorn
    41, 19, 13, 49, 30, 55, 37, 63, 22, 36, // Aquarius / Pisces
];

/// The nine energetic centers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Center {
    Head,
    Ajna,
    Throat,
    G,
    Heart,
    SolarPlexus,
    Sacral,
    Spleen,
    Root,
}

impl Center {
    pub fn all() -> impl Iterator<Item = Center> {
        [
            Center::Head,
            Center::Ajna,
            Center::Throat,
            Center::G,
            Center::Heart,
            Center::SolarPlexus,
            Center::Sacral,
            Center::Spleen,
            Center::Root,
        ]
        .iter()
        .copied()
    }

    /// snake_case key used in the outward centers map.
    pub fn key(&self) -> &'static str {
        match self {
            Center::Head => "head",
            Center::Ajna => "ajna",
            Center::Throat => "throat",
            Center::G => "g",
            Center::Heart => "heart",
            Center::SolarPlexus => "solar_plexus",
            Center::Sacral => "sacral",
            Center::Spleen => "spleen",
            Center::Root => "root",
        }
    }

    /// Motor centers can drive action; relevant to type determination.
    pub fn is_motor(&self) -> bool {
        matches!(
            self,
            Center::Heart | Center::SolarPlexus | Center::Sacral | Center::Root
        )
    }
}

impl fmt::Display for Center {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Center::Head => "Head",
            Center::Ajna => "Ajna",
            Center::Throat => "Throat",
            Center::G => "G",
            Center::Heart => "Heart",
            Center::SolarPlexus => "Solar Plexus",
            Center::Sacral => "Sacral",
            Center::Spleen => "Spleen",
            Center::Root => "Root",
        };
        write!(f, "{}", name)
    }
}

/// Every gate belongs to exactly one center.
pub fn center_of_gate(gate: u8) -> Center {
    match gate {
        61 | 63 | 64 => Center::Head,
        4 | 11 | 17 | 24 | 43 | 47 => Center::Ajna,
        8 | 12 | 16 | 20 | 23 | 31 | 33 | 35 | 45 | 56 | 62 => Center::Throat,
        1 | 2 | 7 | 10 | 13 | 15 | 25 | 46 => Center::G,
        21 | 26 | 40 | 51 => Center::Heart,
        6 | 22 | 30 | 36 | 37 | 49 | 55 => Center::SolarPlexus,
        3 | 5 | 9 | 14 | 27 | 29 | 34 | 42 | 59 => Center::Sacral,
        18 | 28 | 32 | 44 | 48 | 50 | 57 => Center::Spleen,
        19 | 38 | 39 | 41 | 52 | 53 | 54 | 58 | 60 => Center::Root,
        _ => unreachable!("gate {} outside 1..=64", gate),
    }
}

/// One activated gate: which body produced it, and where on the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateActivation {
    pub body: CelestialBody,
    pub gate: u8,
    pub line: u8,
    pub longitude: f64,
}

impl GateActivation {
    /// `"gate.line"` notation.
    pub fn notation(&self) -> String {
        format!("{}.{}", self.gate, self.line)
    }
}

/// Maps an ecliptic longitude to its (gate, line) pair. Total and
/// deterministic: the same longitude always yields the same pair.
///
/// The longitude is circularly normalized first, so a line outside 1..=6
/// is mathematically impossible; if it happens anyway it signals a defect
/// upstream and fails fast rather than being clamped.
pub fn gate_for_longitude(longitude: f64) -> Result<(u8, u8)> {
    if !longitude.is_finite() {
        return Err(BlueprintError::invariant(format!(
            "non-finite longitude {} reached the gate mapper",
            longitude
        )));
    }

    let normalized = longitude.rem_euclid(360.0);
    let slot = (normalized / GATE_DEGREES).floor() as usize % 64;
    let line = ((normalized % GATE_DEGREES) / LINE_DEGREES).floor() as i64 + 1;

    if !(1..=6).contains(&line) {
        return Err(BlueprintError::invariant(format!(
            "line {} for longitude {} outside 1..=6",
            line, longitude
        )));
    }

    Ok((GATE_WHEEL[slot], line as u8))
}

/// Convenience wrapper producing a [`GateActivation`] for a body.
pub fn activation(body: CelestialBody, longitude: f64) -> Result<GateActivation> {
    let (gate, line) = gate_for_longitude(longitude)?;
    Ok(GateActivation {
        body,
        gate,
        line,
        longitude: longitude.rem_euclid(360.0),
    })
}
