//! blueprint_core: natal chart, bodygraph and numerology calculation.
//!
//! The engine takes a name, a birth date, an optional birth time and a
//! free-text location, and produces one self-describing blueprint: a
//! western chart with houses, a Human Design bodygraph, numerology and a
//! Chinese zodiac entry, plus provenance describing how precise the
//! underlying ephemeris lookups were and whether the location was exact.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod analytic;
pub mod binary;
pub mod ephemeris;
pub mod error;
pub mod gates;
pub mod geo;
pub mod houses;
pub mod human_design;
pub mod numerology;
pub mod time;

pub use crate::error::{BlueprintError, Result};
use crate::ephemeris::{EphemerisSource, ProviderChain};
use crate::gates::GateActivation;
use crate::geo::GeoResolver;
use crate::houses::{HouseMethod, HouseSystem};
use crate::human_design::HumanDesign;
use crate::numerology::{ChineseZodiac, Numerology};

/// Julian Day in Universal Time.
pub type JulianDay = f64;

// ---------------------------
// ## Enumerations
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CelestialBody {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    NorthNode,
}

impl CelestialBody {
    /// All eleven chart points in fixed output order.
    pub fn points() -> impl Iterator<Item = CelestialBody> {
        [
            CelestialBody::Sun,
            CelestialBody::Moon,
            CelestialBody::Mercury,
            CelestialBody::Venus,
            CelestialBody::Mars,
            CelestialBody::Jupiter,
            CelestialBody::Saturn,
            CelestialBody::Uranus,
            CelestialBody::Neptune,
            CelestialBody::Pluto,
            CelestialBody::NorthNode,
        ]
        .iter()
        .copied()
    }

    /// The ten physical bodies of the western chart, node excluded.
    pub fn chart_bodies() -> impl Iterator<Item = CelestialBody> {
        Self::points().filter(|b| *b != CelestialBody::NorthNode)
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Moon => "Moon",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
            CelestialBody::NorthNode => "North Node",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZodiacSign {
    Aries = 0,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub fn from_longitude(longitude: f64) -> ZodiacSign {
        Self::from_index((longitude.rem_euclid(360.0) / 30.0).floor() as usize % 12)
    }

    pub fn from_index(index: usize) -> ZodiacSign {
        match index % 12 {
            0 => ZodiacSign::Aries,
            1 => ZodiacSign::Taurus,
            2 => ZodiacSign::Gemini,
            3 => ZodiacSign::Cancer,
            4 => ZodiacSign::Leo,
            5 => ZodiacSign::Virgo,
            6 => ZodiacSign::Libra,
            7 => ZodiacSign::Scorpio,
            8 => ZodiacSign::Sagittarius,
            9 => ZodiacSign::Capricorn,
            10 => ZodiacSign::Aquarius,
            _ => ZodiacSign::Pisces,
        }
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ZodiacSign::Aries => "Aries",
            ZodiacSign::Taurus => "Taurus",
            ZodiacSign::Gemini => "Gemini",
            ZodiacSign::Cancer => "Cancer",
            ZodiacSign::Leo => "Leo",
            ZodiacSign::Virgo => "Virgo",
            ZodiacSign::Libra => "Libra",
            ZodiacSign::Scorpio => "Scorpio",
            ZodiacSign::Sagittarius => "Sagittarius",
            ZodiacSign::Capricorn => "Capricorn",
            ZodiacSign::Aquarius => "Aquarius",
            ZodiacSign::Pisces => "Pisces",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------
// ## Position contract
// ---------------------------

/// One ecliptic position as every backend reports it. Longitude and
/// latitude are degrees, distance is AU where known, speed is degrees of
/// longitude per day (negative when retrograde).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CelestialPosition {
    pub body: CelestialBody,
    pub longitude: f64,
    pub latitude: f64,
    pub distance: Option<f64>,
    pub right_ascension: Option<f64>,
    pub declination: Option<f64>,
    pub speed_longitude: f64,
}

// ---------------------------
// ## Engine input and config
// ---------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BirthInput {
    pub full_name: String,
    /// `YYYY-MM-DD`, local calendar.
    pub birth_date: String,
    /// `HH:MM` or `HH:MM:SS`, local wall clock. Defaults to noon.
    pub birth_time: Option<String>,
    /// Free text or an explicit `"lat,lon"` pair.
    pub birth_location: String,
    /// IANA zone used when location resolution cannot supply one.
    pub timezone_hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Ordered URLs for the high-precision ephemeris module. Empty means
    /// the chain starts at the analytic tier.
    pub module_sources: Vec<String>,
    pub module_timeout: Option<Duration>,
    pub geocoder_base: Option<String>,
    pub timezone_base: Option<String>,
}

// ---------------------------
// ## Blueprint payload
// ---------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BodyPlacement {
    pub longitude: f64,
    pub latitude: f64,
    /// AU, absent for points without a physical distance.
    pub distance: Option<f64>,
    pub sign: String,
    pub sign_index: u8,
    pub house: u8,
    pub speed: f64,
    pub retrograde: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WesternChart {
    /// Placements keyed by body name, plus Ascendant and Midheaven.
    pub placements: BTreeMap<String, BodyPlacement>,
    pub house_cusps: [f64; 12],
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    /// Least precise ephemeris tier that contributed to the chart.
    pub ephemeris_source: EphemerisSource,
    pub approximate_location: bool,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Blueprint {
    pub full_name: String,
    pub western: WesternChart,
    pub human_design: HumanDesign,
    pub numerology: Numerology,
    pub chinese_zodiac: ChineseZodiac,
    pub provenance: Provenance,
}

// ---------------------------
// ## Engine
// ---------------------------

pub struct BlueprintEngine {
    geo: GeoResolver,
    provider: ProviderChain,
}

impl BlueprintEngine {
    /// Fully offline engine: no geocoder, no binary ephemeris module.
    pub fn new() -> Self {
        BlueprintEngine {
            geo: GeoResolver::offline(),
            provider: ProviderChain::without_binary(),
        }
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let binary = if config.module_sources.is_empty() {
            None
        } else {
            Some(match config.module_timeout {
                Some(t) => binary::BinaryEphemeris::with_timeout(config.module_sources, t),
                None => binary::BinaryEphemeris::new(config.module_sources),
            })
        };
        BlueprintEngine {
            geo: GeoResolver::new(config.geocoder_base, config.timezone_base),
            provider: ProviderChain::new(binary),
        }
    }

    /// Calculates the full blueprint for one birth. Fails whole: either
    /// every section is present or an error comes back.
    pub async fn calculate(&self, input: &BirthInput) -> Result<Blueprint> {
        if input.full_name.trim().is_empty() {
            return Err(BlueprintError::invalid_input("full name is empty"));
        }

        let location = self
            .geo
            .resolve(&input.birth_location, input.timezone_hint.as_deref())
            .await;
        debug!(?location, "location resolved");

        let moment = time::normalize(
            &input.birth_date,
            input.birth_time.as_deref(),
            &location.timezone,
        )?;
        info!(jd = moment.julian_day, tz = %moment.timezone, "birth instant normalized");

        let (birth_positions, birth_source) = self.positions_at(moment.julian_day).await?;
        let houses = houses::calculate(
            moment.julian_day,
            location.latitude,
            location.longitude,
            HouseMethod::PlacidusApproximate,
        );

        let design_jd = human_design::design_julian_day(moment.julian_day);
        let (design_positions, design_source) = self.positions_at(design_jd).await?;

        let personality = activations(&birth_positions)?;
        let design = activations(&design_positions)?;
        let hd = human_design::derive(&personality, &design)?;

        let numerology = numerology::calculate(&input.full_name, &input.birth_date)?;
        let chinese_zodiac = numerology::chinese_zodiac(moment.date.year());

        Ok(Blueprint {
            full_name: input.full_name.trim().to_string(),
            western: western_chart(&birth_positions, &houses),
            human_design: hd,
            numerology,
            chinese_zodiac,
            provenance: Provenance {
                ephemeris_source: birth_source.min(design_source),
                approximate_location: location.approximate,
                timezone: location.timezone,
            },
        })
    }

    /// All eleven chart points at one instant, with the least precise tier
    /// that answered.
    async fn positions_at(
        &self,
        jd: JulianDay,
    ) -> Result<(Vec<CelestialPosition>, EphemerisSource)> {
        let mut positions = Vec::with_capacity(11);
        let mut weakest = EphemerisSource::HighPrecisionBinary;
        for body in CelestialBody::points() {
            let (pos, source) = self.provider.position(body, jd).await?;
            if !pos.longitude.is_finite() {
                return Err(BlueprintError::MissingBody { body });
            }
            weakest = weakest.min(source);
            positions.push(pos);
        }
        Ok((positions, weakest))
    }
}

impl Default for BlueprintEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn activations(positions: &[CelestialPosition]) -> Result<Vec<GateActivation>> {
    positions
        .iter()
        .map(|p| gates::activation(p.body, p.longitude))
        .collect()
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

fn placement(
    longitude: f64,
    latitude: f64,
    distance: Option<f64>,
    speed: f64,
    houses: &HouseSystem,
) -> BodyPlacement {
    let normalized = longitude.rem_euclid(360.0);
    let sign = ZodiacSign::from_longitude(normalized);
    BodyPlacement {
        longitude: round6(normalized),
        latitude: round6(latitude),
        distance: distance.map(round6),
        sign: sign.to_string(),
        sign_index: sign as u8,
        house: houses.house_of(normalized),
        speed: round6(speed),
        retrograde: speed < 0.0,
    }
}

fn western_chart(positions: &[CelestialPosition], houses: &HouseSystem) -> WesternChart {
    let mut placements = BTreeMap::new();
    for pos in positions {
        if pos.body == CelestialBody::NorthNode {
            continue;
        }
        placements.insert(
            pos.body.to_string(),
            placement(
                pos.longitude,
                pos.latitude,
                pos.distance,
                pos.speed_longitude,
                houses,
            ),
        );
    }
    // The angles are points on the ecliptic, not bodies.
    placements.insert(
        "Ascendant".to_string(),
        placement(houses.ascendant, 0.0, None, 0.0, houses),
    );
    placements.insert(
        "Midheaven".to_string(),
        placement(houses.midheaven, 0.0, None, 0.0, houses),
    );
    WesternChart {
        placements,
        house_cusps: houses.cusps.map(round6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_input() -> BirthInput {
        BirthInput {
            full_name: "John Smith".to_string(),
            birth_date: "2000-01-01".to_string(),
            birth_time: Some("12:00".to_string()),
            birth_location: "51.4769, 0.0".to_string(),
            timezone_hint: None,
        }
    }

    #[test]
    fn signs_follow_longitude() {
        assert_eq!(ZodiacSign::from_longitude(0.0), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_longitude(29.999), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_longitude(30.0), ZodiacSign::Taurus);
        assert_eq!(ZodiacSign::from_longitude(280.4), ZodiacSign::Capricorn);
        assert_eq!(ZodiacSign::from_longitude(-10.0), ZodiacSign::Pisces);
        assert_eq!(ZodiacSign::from_longitude(360.0), ZodiacSign::Aries);
    }

    #[test]
    fn eleven_points_ten_chart_bodies() {
        assert_eq!(CelestialBody::points().count(), 11);
        assert_eq!(CelestialBody::chart_bodies().count(), 10);
        assert!(CelestialBody::chart_bodies().all(|b| b != CelestialBody::NorthNode));
    }

    #[tokio::test]
    async fn scenario_chart_assembles() {
        let engine = BlueprintEngine::new();
        let blueprint = engine.calculate(&scenario_input()).await.unwrap();

        // 2000-01-01 12:00 UT over Greenwich: Sun in late Capricorn.
        let sun = &blueprint.western.placements["Sun"];
        assert!((sun.longitude - 280.37).abs() < 0.5, "sun at {}", sun.longitude);
        assert_eq!(sun.sign, "Capricorn");
        assert_eq!(sun.sign_index, 9);
        assert!(!sun.retrograde);
        assert_eq!(sun.latitude, 0.0);
        let distance = sun.distance.expect("sun carries a distance");
        assert!((distance - 0.9833).abs() < 0.001, "sun at {distance} AU");

        // Angles are distance-free points.
        assert!(blueprint.western.placements["Ascendant"].distance.is_none());

        // Ten bodies plus the two angles.
        assert_eq!(blueprint.western.placements.len(), 12);
        assert!(blueprint.western.placements.contains_key("Ascendant"));

        // Offline engine tops out at the analytic tier.
        assert_eq!(blueprint.provenance.ephemeris_source, EphemerisSource::Analytic);
        assert!(!blueprint.provenance.approximate_location);
        assert_eq!(blueprint.provenance.timezone, "Europe/London");
    }

    #[tokio::test]
    async fn blueprint_serializes_with_every_section() {
        let engine = BlueprintEngine::new();
        let blueprint = engine.calculate(&scenario_input()).await.unwrap();
        let value = serde_json::to_value(&blueprint).unwrap();
        for key in [
            "western",
            "human_design",
            "numerology",
            "chinese_zodiac",
            "provenance",
        ] {
            assert!(value.get(key).is_some(), "missing section {key}");
        }
        assert_eq!(value["human_design"]["centers"].as_object().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_blueprints() {
        let engine = BlueprintEngine::new();
        let a = engine.calculate(&scenario_input()).await.unwrap();
        let b = engine.calculate(&scenario_input()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn empty_name_is_refused() {
        let engine = BlueprintEngine::new();
        let mut input = scenario_input();
        input.full_name = "  ".to_string();
        assert!(matches!(
            engine.calculate(&input).await,
            Err(BlueprintError::InputValidation { .. })
        ));
    }

    #[tokio::test]
    async fn out_of_window_year_is_refused() {
        let engine = BlueprintEngine::new();
        let mut input = scenario_input();
        input.birth_date = "1850-06-01".to_string();
        assert!(matches!(
            engine.calculate(&input).await,
            Err(BlueprintError::OutOfRange { year: 1850 })
        ));
    }
}
