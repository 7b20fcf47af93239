//! Bodygraph derivation: channels, centers, type, authority, profile.
//!
//! Two activation sets feed this module, one from the birth instant and
//! one from the design instant roughly 88 solar-arc degrees earlier. A
//! channel completes when both of its gates appear anywhere across the
//! union, its two centers then count as defined, and type and authority
//! fall out of which centers ended up defined and connected.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::{BlueprintError, Result};
use crate::gates::{Center, GateActivation};
use crate::{CelestialBody, JulianDay};

// ---------------------------
// ## Design instant
// ---------------------------

/// Mean solar motion in degrees per day.
const SOLAR_ARC_RATE: f64 = 0.985_607_668_6;

/// Solar-arc offset between birth and design, in degrees.
const DESIGN_ARC_DEGREES: f64 = 88.36;

/// The design instant sits where the Sun was `88.36` degrees of mean
/// motion before birth, about 89.65 days earlier.
pub fn design_julian_day(birth_jd: JulianDay) -> JulianDay {
    birth_jd - DESIGN_ARC_DEGREES / SOLAR_ARC_RATE
}

// ---------------------------
// ## Channels
// ---------------------------

/// The 36 channels of the bodygraph as gate pairs with their center pair.
pub const CHANNELS: [(u8, u8, Center, Center); 36] = [
    (1, 8, Center::G, Center::Throat),
    (2, 14, Center::G, Center::Sacral),
    (3, 60, Center::Sacral, Center::Root),
    (4, 63, Center::Ajna, Center::Head),
    (5, 15, Center::Sacral, Center::G),
    (6, 59, Center::SolarPlexus, Center::Sacral),
    (7, 31, Center::G, Center::Throat),
    (9, 52, Center::Sacral, Center::Root),
    (10, 20, Center::G, Center::Throat),
    (10, 34, Center::G, Center::Sacral),
    (10, 57, Center::G, Center::Spleen),
    (11, 56, Center::Ajna, Center::Throat),
    (12, 22, Center::Throat, Center::SolarPlexus),
    (13, 33, Center::G, Center::Throat),
    (16, 48, Center::Throat, Center::Spleen),
    (17, 62, Center::Ajna, Center::Throat),
    (18, 58, Center::Spleen, Center::Root),
    (19, 49, Center::Root, Center::SolarPlexus),
    (20, 34, Center::Throat, Center::Sacral),
    (20, 57, Center::Throat, Center::Spleen),
    (21, 45, Center::Heart, Center::Throat),
    (23, 43, Center::Throat, Center::Ajna),
    (24, 61, Center::Ajna, Center::Head),
    (25, 51, Center::G, Center::Heart),
    (26, 44, Center::Heart, Center::Spleen),
    (27, 50, Center::Sacral, Center::Spleen),
    (28, 38, Center::Spleen, Center::Root),
    (29, 46, Center::Sacral, Center::G),
    (30, 41, Center::SolarPlexus, Center::Root),
    (32, 54, Center::Spleen, Center::Root),
    (34, 57, Center::Sacral, Center::Spleen),
    (35, 36, Center::Throat, Center::SolarPlexus),
    (37, 40, Center::SolarPlexus, Center::Heart),
    (39, 55, Center::Root, Center::SolarPlexus),
    (42, 53, Center::Sacral, Center::Root),
    (47, 64, Center::Ajna, Center::Head),
];

// ---------------------------
// ## Classification enums
// ---------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HdType {
    Manifestor,
    Generator,
    ManifestingGenerator,
    Projector,
    Reflector,
}

impl fmt::Display for HdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HdType::Manifestor => "Manifestor",
            HdType::Generator => "Generator",
            HdType::ManifestingGenerator => "Manifesting Generator",
            HdType::Projector => "Projector",
            HdType::Reflector => "Reflector",
        };
        write!(f, "{name}")
    }
}

impl HdType {
    pub fn strategy(&self) -> &'static str {
        match self {
            HdType::Manifestor => "Inform before acting",
            HdType::Generator | HdType::ManifestingGenerator => "Wait to respond",
            HdType::Projector => "Wait for the invitation",
            HdType::Reflector => "Wait a lunar cycle",
        }
    }

    pub fn not_self_theme(&self) -> &'static str {
        match self {
            HdType::Manifestor => "Anger",
            HdType::Generator | HdType::ManifestingGenerator => "Frustration",
            HdType::Projector => "Bitterness",
            HdType::Reflector => "Disappointment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Authority {
    Emotional,
    Sacral,
    Splenic,
    Ego,
    SelfProjected,
    Mental,
    Outer,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Authority::Emotional => "Emotional",
            Authority::Sacral => "Sacral",
            Authority::Splenic => "Splenic",
            Authority::Ego => "Ego",
            Authority::SelfProjected => "Self-Projected",
            Authority::Mental => "Mental",
            Authority::Outer => "None (Outer)",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Definition {
    None,
    Single,
    Split,
    TripleSplit,
    QuadrupleSplit,
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Definition::None => "No Definition",
            Definition::Single => "Single Definition",
            Definition::Split => "Split Definition",
            Definition::TripleSplit => "Triple Split Definition",
            Definition::QuadrupleSplit => "Quadruple Split Definition",
        };
        write!(f, "{name}")
    }
}

const PROFILE_ARCHETYPES: [&str; 6] = [
    "Investigator",
    "Hermit",
    "Martyr",
    "Opportunist",
    "Heretic",
    "Role Model",
];

// ---------------------------
// ## Derived chart
// ---------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HumanDesign {
    pub hd_type: HdType,
    pub strategy: &'static str,
    pub authority: Authority,
    pub profile: String,
    pub definition: Definition,
    pub not_self_theme: &'static str,
    /// Completed channels as "gate-gate" strings, ascending.
    pub channels: Vec<String>,
    /// Every center keyed by its snake_case name, true when defined.
    pub centers: BTreeMap<&'static str, bool>,
    /// Personality-side activations in body order, "gate.line" notation.
    pub personality_gates: Vec<String>,
    /// Design-side activations in body order, "gate.line" notation.
    pub design_gates: Vec<String>,
}

/// Derives the full bodygraph from the two activation sets. Both slices
/// carry one activation per chart point, birth side first.
pub fn derive(personality: &[GateActivation], design: &[GateActivation]) -> Result<HumanDesign> {
    let gates: BTreeSet<u8> = personality
        .iter()
        .chain(design.iter())
        .map(|a| a.gate)
        .collect();

    let completed: Vec<&(u8, u8, Center, Center)> = CHANNELS
        .iter()
        .filter(|(a, b, _, _)| gates.contains(a) && gates.contains(b))
        .collect();

    let mut defined: BTreeSet<Center> = BTreeSet::new();
    for (_, _, x, y) in &completed {
        defined.insert(*x);
        defined.insert(*y);
    }

    let hd_type = classify_type(&defined, &completed);
    let authority = classify_authority(hd_type, &defined);
    let definition = classify_definition(&defined, &completed);
    let profile = profile_label(personality, design)?;

    let centers = Center::all()
        .map(|c| (c.key(), defined.contains(&c)))
        .collect();

    Ok(HumanDesign {
        hd_type,
        strategy: hd_type.strategy(),
        authority,
        profile,
        definition,
        not_self_theme: hd_type.not_self_theme(),
        channels: completed
            .iter()
            .map(|(a, b, _, _)| format!("{a}-{b}"))
            .collect(),
        centers,
        personality_gates: personality.iter().map(|a| a.notation()).collect(),
        design_gates: design.iter().map(|a| a.notation()).collect(),
    })
}

fn classify_type(
    defined: &BTreeSet<Center>,
    completed: &[&(u8, u8, Center, Center)],
) -> HdType {
    if defined.is_empty() {
        return HdType::Reflector;
    }
    let sacral = defined.contains(&Center::Sacral);
    let throat = defined.contains(&Center::Throat);

    // A motor wired through to the throat can initiate.
    let motor_to_throat = completed.iter().any(|(_, _, x, y)| {
        (x.is_motor() && *y == Center::Throat) || (y.is_motor() && *x == Center::Throat)
    });

    if sacral {
        let sacral_to_throat = throat
            && completed.iter().any(|(_, _, x, y)| {
                matches!(
                    (x, y),
                    (Center::Sacral, Center::Throat) | (Center::Throat, Center::Sacral)
                )
            });
        if sacral_to_throat {
            HdType::ManifestingGenerator
        } else {
            HdType::Generator
        }
    } else if motor_to_throat {
        HdType::Manifestor
    } else {
        HdType::Projector
    }
}

/// Inner authority in the standard hierarchy. A chart whose defined
/// centers carry no inner authority at all (Head, Ajna, Throat only with
/// centers present) lands on the outer bucket.
fn classify_authority(hd_type: HdType, defined: &BTreeSet<Center>) -> Authority {
    if hd_type == HdType::Reflector {
        return Authority::Mental;
    }
    if defined.contains(&Center::SolarPlexus) {
        Authority::Emotional
    } else if defined.contains(&Center::Sacral) {
        Authority::Sacral
    } else if defined.contains(&Center::Spleen) {
        Authority::Splenic
    } else if defined.contains(&Center::Heart) {
        Authority::Ego
    } else if defined.contains(&Center::G) {
        Authority::SelfProjected
    } else {
        Authority::Outer
    }
}

/// Counts connected groups of defined centers over the completed channels.
fn classify_definition(
    defined: &BTreeSet<Center>,
    completed: &[&(u8, u8, Center, Center)],
) -> Definition {
    if defined.is_empty() {
        return Definition::None;
    }

    let mut unvisited: BTreeSet<Center> = defined.clone();
    let mut groups = 0u8;
    while let Some(&seed) = unvisited.iter().next() {
        groups += 1;
        let mut frontier = vec![seed];
        unvisited.remove(&seed);
        while let Some(center) = frontier.pop() {
            for (_, _, x, y) in completed {
                let next = if *x == center {
                    *y
                } else if *y == center {
                    *x
                } else {
                    continue;
                };
                if unvisited.remove(&next) {
                    frontier.push(next);
                }
            }
        }
    }

    match groups {
        1 => Definition::Single,
        2 => Definition::Split,
        3 => Definition::TripleSplit,
        _ => Definition::QuadrupleSplit,
    }
}

/// Profile is the personality Sun line over the design Sun line.
fn profile_label(personality: &[GateActivation], design: &[GateActivation]) -> Result<String> {
    let sun_line = |set: &[GateActivation]| {
        set.iter()
            .find(|a| a.body == CelestialBody::Sun)
            .map(|a| a.line)
    };
    let p = sun_line(personality)
        .ok_or_else(|| BlueprintError::invariant("personality set missing the Sun"))?;
    let d = sun_line(design)
        .ok_or_else(|| BlueprintError::invariant("design set missing the Sun"))?;
    Ok(format!(
        "{p}/{d} ({}/{})",
        PROFILE_ARCHETYPES[(p - 1) as usize],
        PROFILE_ARCHETYPES[(d - 1) as usize]
    ))
}
