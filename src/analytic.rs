//! Default-precision ephemeris tier: truncated analytic series.
//!
//! Sun and Moon come from short trigonometric series; planets from mean
//! orbital elements (equinox of date) solved through Kepler's equation and
//! reduced to geocentric ecliptic coordinates. Good to a few arcminutes for
//! the Sun/Moon and well under a degree for the planets inside the
//! supported window, which is far finer than a 5.625-degree gate.

use crate::ephemeris::{EphemerisBackend, EphemerisSource};
use crate::error::{BlueprintError, Result};
use crate::houses::equatorial_from_ecliptic;
use crate::{CelestialBody, CelestialPosition, JulianDay};

const J2000: f64 = 2_451_545.0;
const KM_PER_AU: f64 = 149_597_870.7;

/// The series are exercised a little beyond the input window so the
/// design-instant shift never drops a request out of tier on its own.
const MIN_JD: f64 = 2_414_655.0; // ~1899-01-01
const MAX_JD: f64 = 2_488_800.0; // ~2102-01-01

pub struct AnalyticEphemeris;

impl AnalyticEphemeris {
    pub fn new() -> Self {
        AnalyticEphemeris
    }
}

impl Default for AnalyticEphemeris {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemerisBackend for AnalyticEphemeris {
    fn source(&self) -> EphemerisSource {
        EphemerisSource::Analytic
    }

    fn position(&self, body: CelestialBody, jd: JulianDay) -> Result<CelestialPosition> {
        if !(MIN_JD..=MAX_JD).contains(&jd) {
            return Err(BlueprintError::EphemerisUnavailable {
                tier: EphemerisSource::Analytic,
                reason: format!("jd {} outside validated series range", jd),
            });
        }

        let (longitude, latitude, distance) = ecliptic_of(body, jd);
        let before = ecliptic_of(body, jd - 0.5).0;
        let after = ecliptic_of(body, jd + 0.5).0;
        let (ra, dec) = equatorial_from_ecliptic(longitude, latitude, jd);

        Ok(CelestialPosition {
            body,
            longitude,
            latitude,
            distance,
            right_ascension: Some(ra),
            declination: Some(dec),
            speed_longitude: circular_diff(before, after),
        })
    }
}

/// Signed shortest angular difference `to - from`, in (-180, 180].
fn circular_diff(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

fn ecliptic_of(body: CelestialBody, jd: JulianDay) -> (f64, f64, Option<f64>) {
    match body {
        CelestialBody::Sun => {
            let (lon, dist) = sun_position(jd);
            (lon, 0.0, Some(dist))
        }
        CelestialBody::Moon => {
            let (lon, lat, dist) = moon_position(jd);
            (lon, lat, Some(dist))
        }
        CelestialBody::NorthNode => (mean_lunar_node(jd), 0.0, None),
        planet => {
            let (lon, lat, dist) = planet_position(planet, jd);
            (lon, lat, Some(dist))
        }
    }
}

/// Apparent solar longitude (degrees) and distance (AU), truncated
/// equation-of-center series.
pub fn sun_position(jd: JulianDay) -> (f64, f64) {
    let t = (jd - J2000) / 36525.0;

    let l0 = 280.46646 + 36000.76983 * t + 0.0003032 * t * t;
    let m = (357.52911 + 35999.05029 * t - 0.0001537 * t * t).to_radians();
    let e = 0.016708634 - 0.000042037 * t - 0.0000001267 * t * t;

    let c = (1.914602 - 0.004817 * t - 0.000014 * t * t) * m.sin()
        + (0.019993 - 0.000101 * t) * (2.0 * m).sin()
        + 0.000289 * (3.0 * m).sin();

    let true_longitude = l0 + c;
    let true_anomaly = m + c.to_radians();
    let distance = 1.000001018 * (1.0 - e * e) / (1.0 + e * true_anomaly.cos());

    // Aberration and nutation-in-longitude correction for the apparent place.
    let omega = (125.04 - 1934.136 * t).to_radians();
    let apparent = true_longitude - 0.00569 - 0.00478 * omega.sin();

    (apparent.rem_euclid(360.0), distance)
}

/// Geocentric lunar longitude/latitude (degrees) and distance (AU) from the
/// largest ELP2000 terms.
pub fn moon_position(jd: JulianDay) -> (f64, f64, f64) {
    let t = (jd - J2000) / 36525.0;

    let lp = 218.316_447_7 + 481_267.881_234_21 * t - 0.001_578_6 * t * t;
    let d = (297.850_192_1 + 445_267.111_403_4 * t - 0.001_881_9 * t * t).to_radians();
    let m = (357.529_109_2 + 35_999.050_290_9 * t - 0.000_153_6 * t * t).to_radians();
    let mp = (134.963_396_4 + 477_198.867_505_5 * t + 0.008_741_4 * t * t).to_radians();
    let f = (93.272_095_0 + 483_202.017_523_3 * t - 0.003_653_9 * t * t).to_radians();

    let longitude = lp
        + 6.288_774 * mp.sin()
        + 1.274_027 * (2.0 * d - mp).sin()
        + 0.658_314 * (2.0 * d).sin()
        + 0.213_618 * (2.0 * mp).sin()
        - 0.185_116 * m.sin()
        - 0.114_332 * (2.0 * f).sin()
        + 0.058_793 * (2.0 * d - 2.0 * mp).sin()
        + 0.057_066 * (2.0 * d - m - mp).sin()
        + 0.053_322 * (2.0 * d + mp).sin()
        + 0.045_758 * (2.0 * d - m).sin();

    let latitude = 5.128_122 * f.sin()
        + 0.280_602 * (mp + f).sin()
        + 0.277_693 * (mp - f).sin()
        + 0.173_237 * (2.0 * d - f).sin();

    let distance_km = 385_000.56 - 20_905.355 * mp.cos()
        - 3_699.111 * (2.0 * d - mp).cos()
        - 2_955.968 * (2.0 * d).cos();

    (
        longitude.rem_euclid(360.0),
        latitude,
        distance_km / KM_PER_AU,
    )
}

/// Mean longitude of the ascending lunar node, degrees.
pub fn mean_lunar_node(jd: JulianDay) -> f64 {
    let t = (jd - J2000) / 36525.0;
    (125.044_547_9 - 1_934.136_289_1 * t + 0.002_075_4 * t * t + t * t * t / 467_441.0)
        .rem_euclid(360.0)
}

/// Mean orbital elements at a moment: all angles in degrees, a in AU.
struct Elements {
    mean_longitude: f64,
    semi_major_axis: f64,
    eccentricity: f64,
    inclination: f64,
    ascending_node: f64,
    perihelion_longitude: f64,
}

fn elements(body: CelestialBody, t: f64) -> Elements {
    // Linear mean elements referred to the mean equinox of date; Pluto's
    // catalog values are J2000-referred, so general precession is folded in.
    let (l, a, e, i, om, pi) = match body {
        CelestialBody::Mercury => (
            252.250906 + 149_474.0722491 * t,
            0.387098310,
            0.20563175 + 0.000020406 * t,
            7.004986 + 0.0018215 * t,
            48.330893 + 1.1861890 * t,
            77.456119 + 1.5564775 * t,
        ),
        CelestialBody::Venus => (
            181.979801 + 58_519.2130302 * t,
            0.723329820,
            0.00677188 - 0.000047766 * t,
            3.394662 + 0.0010037 * t,
            76.679920 + 0.9011190 * t,
            131.563707 + 1.4022188 * t,
        ),
        CelestialBody::Mars => (
            355.433275 + 19_141.6964746 * t,
            1.523679342,
            0.09340062 + 0.000090483 * t,
            1.849726 - 0.0006010 * t,
            49.558093 + 0.7720923 * t,
            336.060234 + 1.8410331 * t,
        ),
        CelestialBody::Jupiter => (
            34.351484 + 3_036.3027889 * t,
            5.202603191,
            0.04849485 + 0.000163244 * t,
            1.303270 - 0.0054966 * t,
            100.464441 + 1.0209550 * t,
            14.331309 + 1.6126668 * t,
        ),
        CelestialBody::Saturn => (
            50.077471 + 1_223.5110141 * t,
            9.554909596,
            0.05550862 - 0.000346818 * t,
            2.488878 - 0.0037363 * t,
            113.665524 + 0.8770979 * t,
            93.056787 + 1.9637694 * t,
        ),
        CelestialBody::Uranus => (
            314.055005 + 429.8640561 * t,
            19.218446062,
            0.04629590 - 0.000027337 * t,
            0.773196 + 0.0007744 * t,
            74.005947 + 0.5211258 * t,
            173.005159 + 1.4863784 * t,
        ),
        CelestialBody::Neptune => (
            304.348665 + 219.8833092 * t,
            30.110386869,
            0.00898809 + 0.000006408 * t,
            1.769952 - 0.0093082 * t,
            131.784057 + 1.1022057 * t,
            48.123691 + 1.4262677 * t,
        ),
        CelestialBody::Pluto => (
            238.92903833 + (145.20780515 + 1.39697) * t,
            39.48211675 - 0.00031596 * t,
            0.24882730 + 0.00005170 * t,
            17.14001206 + 0.00004818 * t,
            110.30393684 + (-0.01183482 + 1.39697) * t,
            224.06891629 + (-0.04062942 + 1.39697) * t,
        ),
        // Earth carries the geocentric reduction for every planet.
        CelestialBody::Sun | CelestialBody::Moon | CelestialBody::NorthNode => (
            100.466449 + 36_000.7698231 * t,
            1.000001018,
            0.01670862 - 0.000042037 * t,
            0.0,
            0.0,
            102.937348 + 1.7195269 * t,
        ),
    };

    Elements {
        mean_longitude: l,
        semi_major_axis: a,
        eccentricity: e,
        inclination: i,
        ascending_node: om,
        perihelion_longitude: pi,
    }
}

/// Solves Kepler's equation E - e sin E = M by Newton iteration.
fn eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let mut e_anom = mean_anomaly + eccentricity * mean_anomaly.sin();
    for _ in 0..10 {
        let delta = (e_anom - eccentricity * e_anom.sin() - mean_anomaly)
            / (1.0 - eccentricity * e_anom.cos());
        e_anom -= delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }
    e_anom
}

/// Heliocentric rectangular ecliptic coordinates, AU.
fn heliocentric(el: &Elements) -> (f64, f64, f64) {
    let m = (el.mean_longitude - el.perihelion_longitude)
        .rem_euclid(360.0)
        .to_radians();
    let ecc = el.eccentricity;
    let e_anom = eccentric_anomaly(m, ecc);

    let true_anom = 2.0
        * (((1.0 + ecc) / (1.0 - ecc)).sqrt() * (e_anom / 2.0).tan()).atan();
    let r = el.semi_major_axis * (1.0 - ecc * e_anom.cos());

    // Argument of latitude measured from the ascending node.
    let u = (true_anom.to_degrees() + el.perihelion_longitude - el.ascending_node).to_radians();
    let om = el.ascending_node.to_radians();
    let inc = el.inclination.to_radians();

    let x = r * (om.cos() * u.cos() - om.sin() * u.sin() * inc.cos());
    let y = r * (om.sin() * u.cos() + om.cos() * u.sin() * inc.cos());
    let z = r * u.sin() * inc.sin();
    (x, y, z)
}

/// Geocentric ecliptic longitude/latitude (degrees) and distance (AU).
fn planet_position(body: CelestialBody, jd: JulianDay) -> (f64, f64, f64) {
    let t = (jd - J2000) / 36525.0;

    let (px, py, pz) = heliocentric(&elements(body, t));
    let (ex, ey, ez) = heliocentric(&elements(CelestialBody::Sun, t));

    let (gx, gy, gz) = (px - ex, py - ey, pz - ez);
    let longitude = gy.atan2(gx).to_degrees().rem_euclid(360.0);
    let latitude = gz.atan2((gx * gx + gy * gy).sqrt()).to_degrees();
    let distance = (gx * gx + gy * gy + gz * gz).sqrt();

    (longitude, latitude, distance)
}
