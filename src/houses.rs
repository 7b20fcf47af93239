use serde::Serialize;

use crate::JulianDay;

const J2000: f64 = 2_451_545.0;

/// House calculation method. The quadrant method trisects each quadrant
/// between the angles, which approximates Placidus without the iterative
/// semi-arc division of the true method.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum HouseMethod {
    PlacidusApproximate,
    Equal,
}

/// The chart angles plus twelve cusps, ordered from house 1 ascending
/// circularly. Each house spans [cusps[i], cusps[i+1]) with wraparound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseSystem {
    pub ascendant: f64,
    pub midheaven: f64,
    pub cusps: [f64; 12],
}

/// Greenwich mean sidereal time in degrees (IAU 1982 polynomial).
pub fn gmst_degrees(jd: JulianDay) -> f64 {
    let t = (jd - J2000) / 36525.0;
    let theta = 280.460_618_37
        + 360.985_647_366_29 * (jd - J2000)
        + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    theta.rem_euclid(360.0)
}

/// Mean obliquity of the ecliptic in degrees, polynomial in centuries
/// since J2000.0.
pub fn obliquity(jd: JulianDay) -> f64 {
    let t = (jd - J2000) / 36525.0;
    23.439_291_1 - 0.013_004_2 * t - 1.64e-7 * t * t + 5.04e-7 * t * t * t
}

/// Right ascension and declination from ecliptic coordinates, degrees.
pub fn equatorial_from_ecliptic(longitude: f64, latitude: f64, jd: JulianDay) -> (f64, f64) {
    let eps = obliquity(jd).to_radians();
    let lam = longitude.to_radians();
    let bet = latitude.to_radians();

    let ra = (lam.sin() * eps.cos() - bet.tan() * eps.sin()).atan2(lam.cos());
    let dec = (bet.sin() * eps.cos() + bet.cos() * eps.sin() * lam.sin()).asin();
    (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
}

/// Computes the chart angles and cusps for a moment and place.
///
/// Local sidereal time becomes the Right Ascension of the Midheaven; the
/// Midheaven is taken as RAMC directly and the Ascendant from the standard
/// horizon formula. Longitude is degrees east.
pub fn calculate(
    jd: JulianDay,
    latitude: f64,
    longitude: f64,
    method: HouseMethod,
) -> HouseSystem {
    let ramc = (gmst_degrees(jd) + longitude).rem_euclid(360.0);
    let eps = obliquity(jd).to_radians();
    let ramc_rad = ramc.to_radians();
    let lat_rad = latitude.to_radians();

    let ascendant = ramc_rad
        .cos()
        .atan2(-(ramc_rad.sin() * eps.cos() + lat_rad.tan() * eps.sin()))
        .to_degrees()
        .rem_euclid(360.0);
    let midheaven = ramc;

    let cusps = match method {
        HouseMethod::Equal => {
            let mut cusps = [0.0; 12];
            for (i, cusp) in cusps.iter_mut().enumerate() {
                *cusp = (ascendant + 30.0 * i as f64).rem_euclid(360.0);
            }
            cusps
        }
        HouseMethod::PlacidusApproximate => quadrant_cusps(ascendant, midheaven),
    };

    HouseSystem {
        ascendant,
        midheaven,
        cusps,
    }
}

/// Trisects the four quadrants between Ascendant, IC, Descendant and
/// Midheaven. Walking cusps 1..12 always moves forward around the circle.
fn quadrant_cusps(ascendant: f64, midheaven: f64) -> [f64; 12] {
    let ic = (midheaven + 180.0).rem_euclid(360.0);
    let descendant = (ascendant + 180.0).rem_euclid(360.0);

    let mut cusps = [0.0; 12];
    cusps[0] = ascendant;
    cusps[3] = ic;
    cusps[6] = descendant;
    cusps[9] = midheaven;

    let trisect = |from: f64, to: f64, k: f64| (from + arc(from, to) * k / 3.0).rem_euclid(360.0);

    cusps[1] = trisect(ascendant, ic, 1.0);
    cusps[2] = trisect(ascendant, ic, 2.0);
    cusps[4] = trisect(ic, descendant, 1.0);
    cusps[5] = trisect(ic, descendant, 2.0);
    cusps[7] = trisect(descendant, midheaven, 1.0);
    cusps[8] = trisect(descendant, midheaven, 2.0);
    cusps[10] = trisect(midheaven, ascendant, 1.0);
    cusps[11] = trisect(midheaven, ascendant, 2.0);

    cusps
}

/// Forward circular arc from one longitude to another, in [0, 360).
fn arc(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(360.0)
}

impl HouseSystem {
    /// House number (1..=12) containing an ecliptic longitude, by circular
    /// interval containment with wraparound at 0/360.
    pub fn house_of(&self, longitude: f64) -> u8 {
        let lon = longitude.rem_euclid(360.0);
        for i in 0..12 {
            let start = self.cusps[i];
            let span = arc(start, self.cusps[(i + 1) % 12]);
            if arc(start, lon) < span {
                return (i + 1) as u8;
            }
        }
        // Degenerate cusps collapse every span to zero; treat as house 1.
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gmst_at_j2000() {
        // Known value: GMST at 2000-01-01 12:00 UT is 280.46061837 degrees.
        assert_relative_eq!(gmst_degrees(J2000), 280.460_618_37, epsilon = 1e-6);
    }

    #[test]
    fn obliquity_near_epoch() {
        assert_relative_eq!(obliquity(J2000), 23.439_291_1, epsilon = 1e-9);
        // Still close a century later.
        assert_relative_eq!(obliquity(J2000 + 36525.0), 23.426, epsilon = 0.01);
    }

    #[test]
    fn ascendant_rises_a_quadrant_ahead_of_the_midheaven() {
        // 2000-01-01 noon UT over Greenwich: MC 280.46, Asc near 24.3,
        // so the Ascendant sits in the quadrant after the Midheaven.
        let hs = calculate(J2000, 51.4769, 0.0, HouseMethod::PlacidusApproximate);
        assert_relative_eq!(hs.midheaven, 280.460_618, epsilon = 1e-5);
        assert_relative_eq!(hs.ascendant, 24.3, epsilon = 0.1);
        let mc_to_asc = arc(hs.midheaven, hs.ascendant);
        assert!(mc_to_asc > 0.0 && mc_to_asc < 180.0, "mc->asc arc {mc_to_asc}");
    }

    #[test]
    fn angles_equal_their_cusps() {
        let hs = calculate(J2000, 51.4769, 0.0, HouseMethod::PlacidusApproximate);
        assert_relative_eq!(hs.cusps[0], hs.ascendant, epsilon = 1e-12);
        assert_relative_eq!(hs.cusps[9], hs.midheaven, epsilon = 1e-12);
        assert!(hs.ascendant >= 0.0 && hs.ascendant < 360.0);
        assert!(hs.midheaven >= 0.0 && hs.midheaven < 360.0);
    }

    #[test]
    fn cusps_walk_forward_around_the_circle() {
        for (jd, lat, lon) in [
            (J2000, 51.4769, 0.0),
            (J2000 + 7654.321, 10.522, 76.172),
            (J2000 - 3650.0, -33.87, 151.21),
        ] {
            let hs = calculate(jd, lat, lon, HouseMethod::PlacidusApproximate);
            let total: f64 = (0..12).map(|i| arc(hs.cusps[i], hs.cusps[(i + 1) % 12])).sum();
            assert_relative_eq!(total, 360.0, epsilon = 1e-6);
            for i in 0..12 {
                assert!(arc(hs.cusps[i], hs.cusps[(i + 1) % 12]) > 0.0);
            }
        }
    }

    #[test]
    fn equal_houses_are_thirty_degrees() {
        let hs = calculate(J2000, 40.0, -74.0, HouseMethod::Equal);
        for i in 0..12 {
            assert_relative_eq!(arc(hs.cusps[i], hs.cusps[(i + 1) % 12]), 30.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn membership_handles_wraparound() {
        let hs = HouseSystem {
            ascendant: 350.0,
            midheaven: 260.0,
            cusps: [
                350.0, 20.0, 50.0, 80.0, 110.0, 140.0, 170.0, 200.0, 230.0, 260.0, 290.0, 320.0,
            ],
        };
        assert_eq!(hs.house_of(355.0), 1);
        assert_eq!(hs.house_of(5.0), 1); // wrapped past 0
        assert_eq!(hs.house_of(20.0), 2); // cusp belongs to the next house
        assert_eq!(hs.house_of(319.9), 11);
        assert_eq!(hs.house_of(349.9), 12);
    }

    #[test]
    fn equatorial_conversion_roundtrip_points() {
        // 0 Aries on the ecliptic equator maps to RA 0, Dec 0.
        let (ra, dec) = equatorial_from_ecliptic(0.0, 0.0, J2000);
        assert_relative_eq!(ra, 0.0, epsilon = 1e-9);
        assert_relative_eq!(dec, 0.0, epsilon = 1e-9);
        // 90 degrees longitude tilts by the obliquity.
        let (_, dec) = equatorial_from_ecliptic(90.0, 0.0, J2000);
        assert_relative_eq!(dec, obliquity(J2000), epsilon = 1e-6);
    }
}
