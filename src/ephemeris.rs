//! The uniform position contract and the capability-fallback chain.
//!
//! Three backends implement one contract; callers never see which tier
//! answered except through the provenance tag carried alongside the result.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analytic::AnalyticEphemeris;
use crate::binary::BinaryEphemeris;
use crate::error::{BlueprintError, Result};
use crate::houses::equatorial_from_ecliptic;
use crate::{CelestialBody, CelestialPosition, JulianDay};

/// Which calculation tier produced a position. Ordered by precision so the
/// chart-level provenance is simply the minimum over all lookups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EphemerisSource {
    ClosedForm,
    Analytic,
    HighPrecisionBinary,
}

impl fmt::Display for EphemerisSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EphemerisSource::ClosedForm => "closed-form",
            EphemerisSource::Analytic => "analytic",
            EphemerisSource::HighPrecisionBinary => "high-precision-binary",
        };
        write!(f, "{}", name)
    }
}

/// Uniform position contract: pure and deterministic per call. A backend
/// that cannot serve a request answers `EphemerisUnavailable` and the chain
/// moves on; any other error is a real failure.
pub trait EphemerisBackend {
    fn source(&self) -> EphemerisSource;
    fn position(&self, body: CelestialBody, jd: JulianDay) -> Result<CelestialPosition>;
}

// ---------------------------
// ## Closed-form tier
// ---------------------------

/// Last-resort backend: short Sun/Moon truncations plus a deterministic,
/// reproducible placeholder for every other body. Always available and
/// explicitly the lowest-precision tier; callers can tell from provenance.
pub struct ClosedFormEphemeris;

const J2000: f64 = 2_451_545.0;

impl ClosedFormEphemeris {
    pub fn new() -> Self {
        ClosedFormEphemeris
    }

    fn longitude_of(body: CelestialBody, jd: JulianDay) -> f64 {
        let d = jd - J2000;
        match body {
            CelestialBody::Sun => {
                let l = 280.460 + 0.985_647_4 * d;
                let m = (357.528 + 0.985_600_3 * d).to_radians();
                (l + 1.915 * m.sin() + 0.020 * (2.0 * m).sin()).rem_euclid(360.0)
            }
            CelestialBody::Moon => {
                let l = 218.316 + 13.176_396 * d;
                let mp = (134.963 + 13.064_993 * d).to_radians();
                (l + 6.289 * mp.sin()).rem_euclid(360.0)
            }
            CelestialBody::NorthNode => (125.045 - 0.052_953_8 * d).rem_euclid(360.0),
            other => placeholder_longitude(other, jd),
        }
    }
}

impl Default for ClosedFormEphemeris {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemerisBackend for ClosedFormEphemeris {
    fn source(&self) -> EphemerisSource {
        EphemerisSource::ClosedForm
    }

    fn position(&self, body: CelestialBody, jd: JulianDay) -> Result<CelestialPosition> {
        let longitude = Self::longitude_of(body, jd);
        let before = Self::longitude_of(body, jd - 0.5);
        let after = Self::longitude_of(body, jd + 0.5);

        Ok(CelestialPosition {
            body,
            longitude,
            latitude: 0.0,
            distance: None,
            right_ascension: None,
            declination: None,
            speed_longitude: (after - before + 540.0).rem_euclid(360.0) - 180.0,
        })
    }
}

/// Reproducible pseudo-position for bodies the closed forms do not model:
/// a splitmix-style hash of (body, jd) scaled onto the circle. Identical
/// inputs always map to the identical longitude.
fn placeholder_longitude(body: CelestialBody, jd: JulianDay) -> f64 {
    let mut h = (body as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ jd.to_bits();
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    (h as f64 / u64::MAX as f64) * 360.0 % 360.0
}

// ---------------------------
// ## Fallback chain
// ---------------------------

/// Orders the tiers most-precise first and reports which one answered.
/// A tier that answers `EphemerisUnavailable` only disables itself for the
/// call; the request keeps going down the chain.
pub struct ProviderChain {
    binary: Option<BinaryEphemeris>,
    analytic: AnalyticEphemeris,
    closed_form: ClosedFormEphemeris,
}

impl ProviderChain {
    pub fn new(binary: Option<BinaryEphemeris>) -> Self {
        ProviderChain {
            binary,
            analytic: AnalyticEphemeris::new(),
            closed_form: ClosedFormEphemeris::new(),
        }
    }

    /// The analytic and closed-form tiers only.
    pub fn without_binary() -> Self {
        Self::new(None)
    }

    pub async fn position(
        &self,
        body: CelestialBody,
        jd: JulianDay,
    ) -> Result<(CelestialPosition, EphemerisSource)> {
        if let Some(binary) = &self.binary {
            if let Some(module) = binary.module().await {
                match module.position(body, jd) {
                    Ok(pos) => {
                        return Ok((
                            fill_equatorial(pos, jd),
                            EphemerisSource::HighPrecisionBinary,
                        ))
                    }
                    Err(BlueprintError::EphemerisUnavailable { reason, .. }) => {
                        warn!(%body, jd, reason, "binary ephemeris declined, falling back");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        match self.analytic.position(body, jd) {
            Ok(pos) => return Ok((pos, EphemerisSource::Analytic)),
            Err(BlueprintError::EphemerisUnavailable { reason, .. }) => {
                warn!(%body, jd, reason, "analytic ephemeris declined, falling back");
            }
            Err(other) => return Err(other),
        }

        debug!(%body, jd, "serving closed-form position");
        let pos = self.closed_form.position(body, jd)?;
        Ok((pos, EphemerisSource::ClosedForm))
    }
}

fn fill_equatorial(mut pos: CelestialPosition, jd: JulianDay) -> CelestialPosition {
    if pos.right_ascension.is_none() {
        let (ra, dec) = equatorial_from_ecliptic(pos.longitude, pos.latitude, jd);
        pos.right_ascension = Some(ra);
        pos.declination = Some(dec);
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn closed_form_sun_matches_scenario() {
        // 2000-01-01 noon UT: Sun near 280 degrees (Capricorn).
        let pos = ClosedFormEphemeris::new()
            .position(CelestialBody::Sun, J2000)
            .unwrap();
        assert_relative_eq!(pos.longitude, 280.0, epsilon = 1.0);
        assert_eq!((pos.longitude / 30.0).floor() as u8 % 12, 9);
    }

    #[test]
    fn placeholder_is_deterministic_and_normalized() {
        for body in [CelestialBody::Mercury, CelestialBody::Pluto] {
            let a = placeholder_longitude(body, 2_451_545.25);
            let b = placeholder_longitude(body, 2_451_545.25);
            assert_eq!(a, b);
            assert!((0.0..360.0).contains(&a));
        }
        // Different bodies at the same instant scatter.
        assert_ne!(
            placeholder_longitude(CelestialBody::Mercury, J2000),
            placeholder_longitude(CelestialBody::Venus, J2000)
        );
    }

    #[test]
    fn source_ordering_tracks_precision() {
        assert!(EphemerisSource::ClosedForm < EphemerisSource::Analytic);
        assert!(EphemerisSource::Analytic < EphemerisSource::HighPrecisionBinary);
    }

    #[tokio::test]
    async fn chain_without_binary_serves_analytic() {
        let chain = ProviderChain::without_binary();
        let (pos, source) = chain.position(CelestialBody::Sun, J2000).await.unwrap();
        assert_eq!(source, EphemerisSource::Analytic);
        assert_relative_eq!(pos.longitude, 280.37, epsilon = 0.05);
        assert!(pos.right_ascension.is_some());
    }

    #[tokio::test]
    async fn unreachable_binary_sources_degrade_to_analytic() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/ephe.bin");
            then.status(500);
        });

        let chain = ProviderChain::new(Some(crate::binary::BinaryEphemeris::new(vec![
            server.url("/ephe.bin"),
        ])));
        let (pos, source) = chain.position(CelestialBody::Sun, J2000).await.unwrap();
        assert_eq!(source, EphemerisSource::Analytic);
        assert_relative_eq!(pos.longitude, 280.37, epsilon = 0.05);
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn chain_degrades_to_closed_form_out_of_series_range() {
        let chain = ProviderChain::without_binary();
        let far_future = 2_816_787.5; // year ~3000
        let (pos, source) = chain
            .position(CelestialBody::Sun, far_future)
            .await
            .unwrap();
        assert_eq!(source, EphemerisSource::ClosedForm);
        assert!((0.0..360.0).contains(&pos.longitude));
    }
}
