//! Location resolution: free text to coordinates plus an IANA timezone.
//!
//! Resolution never fails. The ladder is: explicit "lat,lon" pair, the
//! external geocoding service, the built-in gazetteer, and finally
//! Greenwich with the `approximate` flag raised. Timezone lookup follows
//! the same service-then-fallback shape, ending at the caller's hint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Results are memoized per process for this long.
const CACHE_TTL: Duration = Duration::from_secs(6 * 3600);

const GREENWICH: (f64, f64) = (51.4769, 0.0);

/// A resolved place. `approximate` is raised whenever the coordinates came
/// from anything other than an exact parse or the geocoding service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub approximate: bool,
}

#[derive(Debug, Deserialize)]
struct GeocoderPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct TimezoneAnswer {
    #[serde(alias = "timeZone", alias = "timezone")]
    time_zone: String,
}

pub struct GeoResolver {
    client: reqwest::Client,
    geocoder_base: Option<String>,
    timezone_base: Option<String>,
    cache: Mutex<HashMap<String, (Instant, ResolvedLocation)>>,
}

impl GeoResolver {
    /// A resolver that only uses the built-in ladder (no network).
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn new(geocoder_base: Option<String>, timezone_base: Option<String>) -> Self {
        GeoResolver {
            client: reqwest::Client::new(),
            geocoder_base,
            timezone_base,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Best-effort resolution of a free-text location. Always returns a
    /// coordinate; unrecognized input degrades to Greenwich, flagged.
    pub async fn resolve(&self, location: &str, tz_hint: Option<&str>) -> ResolvedLocation {
        let key = format!("{}|{}", location.trim().to_lowercase(), tz_hint.unwrap_or(""));
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        let resolved = self.resolve_uncached(location, tz_hint).await;
        self.cache
            .lock()
            .unwrap()
            .insert(key, (Instant::now(), resolved.clone()));
        resolved
    }

    fn cached(&self, key: &str) -> Option<ResolvedLocation> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(key)
            .filter(|(at, _)| at.elapsed() < CACHE_TTL)
            .map(|(_, loc)| loc.clone())
    }

    async fn resolve_uncached(&self, location: &str, tz_hint: Option<&str>) -> ResolvedLocation {
        if let Some((lat, lon)) = parse_coordinate_pair(location) {
            let timezone = self.timezone_for(lat, lon, tz_hint).await;
            return ResolvedLocation {
                latitude: lat,
                longitude: lon,
                timezone,
                approximate: false,
            };
        }

        if let Some(base) = &self.geocoder_base {
            match self.geocode(base, location).await {
                Ok(Some((lat, lon))) => {
                    let timezone = self.timezone_for(lat, lon, tz_hint).await;
                    return ResolvedLocation {
                        latitude: lat,
                        longitude: lon,
                        timezone,
                        approximate: false,
                    };
                }
                Ok(None) => debug!(location, "geocoder had no match"),
                Err(e) => warn!(location, error = %e, "geocoder unreachable"),
            }
        }

        if let Some(entry) = gazetteer_lookup(location) {
            debug!(location, city = entry.0, "resolved from gazetteer");
            return ResolvedLocation {
                latitude: entry.1,
                longitude: entry.2,
                timezone: entry.3.to_string(),
                approximate: true,
            };
        }

        warn!(location, "unrecognized location, defaulting to Greenwich");
        ResolvedLocation {
            latitude: GREENWICH.0,
            longitude: GREENWICH.1,
            timezone: tz_hint.unwrap_or("UTC").to_string(),
            approximate: true,
        }
    }

    async fn geocode(&self, base: &str, location: &str) -> reqwest::Result<Option<(f64, f64)>> {
        let places: Vec<GeocoderPlace> = self
            .client
            .get(format!("{}/search", base.trim_end_matches('/')))
            .query(&[("q", location), ("format", "json"), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, "blueprint_core")
            .timeout(Duration::from_secs(6))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(places.first().and_then(|p| {
            match (p.lat.parse::<f64>(), p.lon.parse::<f64>()) {
                (Ok(lat), Ok(lon)) => Some((lat, lon)),
                _ => None,
            }
        }))
    }

    async fn timezone_for(&self, lat: f64, lon: f64, tz_hint: Option<&str>) -> String {
        if let Some(base) = &self.timezone_base {
            let url = format!("{}/api/timezone/coordinate", base.trim_end_matches('/'));
            let result = self
                .client
                .get(url)
                .query(&[("latitude", lat.to_string()), ("longitude", lon.to_string())])
                .timeout(Duration::from_secs(6))
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => match response.json::<TimezoneAnswer>().await {
                    Ok(answer) => return answer.time_zone,
                    Err(e) => warn!(error = %e, "timezone response unreadable"),
                },
                Err(e) => warn!(error = %e, "timezone service unreachable"),
            }
        }

        // Nearest gazetteer entry is a workable zone for most of the land
        // surface; otherwise take the caller's hint.
        if let Some(entry) = nearest_gazetteer_entry(lat, lon, 8.0) {
            return entry.3.to_string();
        }
        tz_hint.unwrap_or("UTC").to_string()
    }
}

/// Accepts `"51.5,-0.12"` style input.
fn parse_coordinate_pair(location: &str) -> Option<(f64, f64)> {
    let mut parts = location.split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lon: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) {
        return None;
    }
    let lon = if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    };
    Some((lat, lon))
}

type GazetteerEntry = (&'static str, f64, f64, &'static str);

/// Deterministic fallback gazetteer: substring match over major cities and
/// a few countries. Small on purpose; anything it misses degrades to
/// Greenwich with the approximate flag raised.
const GAZETTEER: [GazetteerEntry; 44] = [
    ("greenwich", 51.4769, 0.0, "Europe/London"),
    ("london", 51.5074, -0.1278, "Europe/London"),
    ("new york", 40.7128, -74.0060, "America/New_York"),
    ("los angeles", 34.0522, -118.2437, "America/Los_Angeles"),
    ("chicago", 41.8781, -87.6298, "America/Chicago"),
    ("toronto", 43.6532, -79.3832, "America/Toronto"),
    ("vancouver", 49.2827, -123.1207, "America/Vancouver"),
    ("mexico city", 19.4326, -99.1332, "America/Mexico_City"),
    ("sao paulo", -23.5505, -46.6333, "America/Sao_Paulo"),
    ("buenos aires", -34.6037, -58.3816, "America/Argentina/Buenos_Aires"),
    ("paris", 48.8566, 2.3522, "Europe/Paris"),
    ("berlin", 52.5200, 13.4050, "Europe/Berlin"),
    ("madrid", 40.4168, -3.7038, "Europe/Madrid"),
    ("rome", 41.9028, 12.4964, "Europe/Rome"),
    ("amsterdam", 52.3676, 4.9041, "Europe/Amsterdam"),
    ("stockholm", 59.3293, 18.0686, "Europe/Stockholm"),
    ("oslo", 59.9139, 10.7522, "Europe/Oslo"),
    ("copenhagen", 55.6761, 12.5683, "Europe/Copenhagen"),
    ("dublin", 53.3498, -6.2603, "Europe/Dublin"),
    ("lisbon", 38.7223, -9.1393, "Europe/Lisbon"),
    ("moscow", 55.7558, 37.6173, "Europe/Moscow"),
    ("istanbul", 41.0082, 28.9784, "Europe/Istanbul"),
    ("cairo", 30.0444, 31.2357, "Africa/Cairo"),
    ("lagos", 6.5244, 3.3792, "Africa/Lagos"),
    ("nairobi", -1.2921, 36.8219, "Africa/Nairobi"),
    ("johannesburg", -26.2041, 28.0473, "Africa/Johannesburg"),
    ("dubai", 25.2769, 55.2962, "Asia/Dubai"),
    ("mumbai", 19.0760, 72.8777, "Asia/Kolkata"),
    ("delhi", 28.6139, 77.2090, "Asia/Kolkata"),
    ("bangalore", 12.9716, 77.5946, "Asia/Kolkata"),
    ("karachi", 24.8607, 67.0011, "Asia/Karachi"),
    ("dhaka", 23.8103, 90.4125, "Asia/Dhaka"),
    ("bangkok", 13.7563, 100.5018, "Asia/Bangkok"),
    ("singapore", 1.3521, 103.8198, "Asia/Singapore"),
    ("jakarta", -6.2088, 106.8456, "Asia/Jakarta"),
    ("hong kong", 22.3193, 114.1694, "Asia/Hong_Kong"),
    ("shanghai", 31.2304, 121.4737, "Asia/Shanghai"),
    ("beijing", 39.9042, 116.4074, "Asia/Shanghai"),
    ("seoul", 37.5665, 126.9780, "Asia/Seoul"),
    ("tokyo", 35.6762, 139.6503, "Asia/Tokyo"),
    ("sydney", -33.8688, 151.2093, "Australia/Sydney"),
    ("melbourne", -37.8136, 144.9631, "Australia/Melbourne"),
    ("auckland", -36.8509, 174.7645, "Pacific/Auckland"),
    ("united kingdom", 51.5074, -0.1278, "Europe/London"),
];

fn gazetteer_lookup(location: &str) -> Option<GazetteerEntry> {
    let needle = location.trim().to_lowercase();
    GAZETTEER
        .iter()
        .find(|(name, _, _, _)| needle.contains(name))
        .copied()
}

fn nearest_gazetteer_entry(lat: f64, lon: f64, max_degrees: f64) -> Option<GazetteerEntry> {
    GAZETTEER
        .iter()
        .map(|entry| {
            let d_lat = entry.1 - lat;
            let d_lon = (entry.2 - lon + 540.0).rem_euclid(360.0) - 180.0;
            (d_lat * d_lat + d_lon * d_lon, entry)
        })
        .filter(|(d2, _)| *d2 <= max_degrees * max_degrees)
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, entry)| *entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn explicit_pair_parses_exactly() {
        let resolver = GeoResolver::offline();
        let loc = resolver.resolve("51.4769, 0.0", None).await;
        assert_relative_eq!(loc.latitude, 51.4769);
        assert!(!loc.approximate);
        assert_eq!(loc.timezone, "Europe/London"); // nearest entry is Greenwich
    }

    #[test]
    fn coordinate_pair_rejects_junk() {
        assert!(parse_coordinate_pair("hello, world").is_none());
        assert!(parse_coordinate_pair("95.0, 10.0").is_none());
        assert!(parse_coordinate_pair("51.0").is_none());
        assert_eq!(parse_coordinate_pair("10.0, 190.0"), Some((10.0, -170.0)));
    }

    #[tokio::test]
    async fn gazetteer_serves_known_cities_flagged() {
        let resolver = GeoResolver::offline();
        let loc = resolver.resolve("Tokyo, Japan", None).await;
        assert_relative_eq!(loc.latitude, 35.6762);
        assert_eq!(loc.timezone, "Asia/Tokyo");
        assert!(loc.approximate);
    }

    #[tokio::test]
    async fn unknown_location_falls_back_to_greenwich() {
        let resolver = GeoResolver::offline();
        let loc = resolver.resolve("Atlantis", Some("Europe/Paris")).await;
        assert_relative_eq!(loc.latitude, 51.4769);
        assert_relative_eq!(loc.longitude, 0.0);
        assert_eq!(loc.timezone, "Europe/Paris"); // hint wins when all else failed
        assert!(loc.approximate);
    }

    #[tokio::test]
    async fn geocoder_result_is_preferred_and_cached() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200)
                .json_body(serde_json::json!([{"lat": "48.8566", "lon": "2.3522"}]));
        });

        let resolver = GeoResolver::new(Some(server.base_url()), None);
        let loc = resolver.resolve("Paris, France", None).await;
        assert_relative_eq!(loc.latitude, 48.8566);
        assert!(!loc.approximate);

        // Second resolution comes from the memo, not the network.
        let again = resolver.resolve("Paris, France", None).await;
        assert_eq!(loc, again);
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn geocoder_outage_degrades_to_gazetteer() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(500);
        });

        let resolver = GeoResolver::new(Some(server.base_url()), None);
        let loc = resolver.resolve("Berlin", None).await;
        assert_relative_eq!(loc.latitude, 52.52);
        assert!(loc.approximate);
    }

    #[tokio::test]
    async fn timezone_service_answer_is_used() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/timezone/coordinate");
            then.status(200)
                .json_body(serde_json::json!({"timeZone": "Pacific/Chatham"}));
        });

        let resolver = GeoResolver::new(None, Some(server.base_url()));
        let loc = resolver.resolve("-43.95, -176.56", None).await;
        assert_eq!(loc.timezone, "Pacific/Chatham");
    }
}
