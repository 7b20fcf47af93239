//! High-precision tier: a compiled ephemeris module fetched once per
//! process from an ordered list of static sources.
//!
//! The module is a bincode-encoded table of daily-sampled geocentric
//! positions; lookups interpolate between samples. A failed or missing
//! load never fails a request: the tier just reports itself unavailable
//! and the chain degrades.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::ephemeris::EphemerisSource;
use crate::error::{BlueprintError, Result};
use crate::{CelestialBody, CelestialPosition, JulianDay};

/// Leading magic bytes of a valid module blob.
pub const MODULE_MAGIC: &[u8; 4] = b"BEM1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// One sampled geocentric position.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub longitude: f64,
    pub latitude: f64,
    pub distance: f64,
}

/// The decoded module: per-body sample rows on a uniform daily JD grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemerisModule {
    pub start_jd: f64,
    pub step_days: f64,
    pub samples: HashMap<u8, Vec<Sample>>,
}

impl EphemerisModule {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 || &bytes[..4] != MODULE_MAGIC {
            return Err(BlueprintError::invalid_module("bad magic"));
        }
        let module: EphemerisModule = bincode::deserialize(&bytes[4..])?;
        if module.step_days <= 0.0 || module.samples.is_empty() {
            return Err(BlueprintError::invalid_module("empty or malformed grid"));
        }
        Ok(module)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = MODULE_MAGIC.to_vec();
        out.extend(bincode::serialize(self)?);
        Ok(out)
    }

    /// Interpolated position. Declines (for fallback) when the body is not
    /// in the module or the instant falls outside the sampled range.
    pub fn position(&self, body: CelestialBody, jd: JulianDay) -> Result<CelestialPosition> {
        let longitude = self.interpolate(body, jd, |s| s.longitude, true)?;
        let latitude = self.interpolate(body, jd, |s| s.latitude, false)?;
        let distance = self.interpolate(body, jd, |s| s.distance, false)?;

        let h = 0.05;
        let before = self.interpolate(body, jd - h, |s| s.longitude, true);
        let after = self.interpolate(body, jd + h, |s| s.longitude, true);
        let speed_longitude = match (before, after) {
            (Ok(b), Ok(a)) => ((a - b + 540.0).rem_euclid(360.0) - 180.0) / (2.0 * h),
            _ => 0.0,
        };

        Ok(CelestialPosition {
            body,
            longitude: longitude.rem_euclid(360.0),
            latitude,
            distance: Some(distance),
            right_ascension: None,
            declination: None,
            speed_longitude,
        })
    }

    /// Four-point Lagrange interpolation on the sample grid, dropping to
    /// linear near the range edges. Circular quantities are unwrapped
    /// around the first bracket sample before interpolating.
    fn interpolate<F>(
        &self,
        body: CelestialBody,
        jd: JulianDay,
        select: F,
        circular: bool,
    ) -> Result<f64>
    where
        F: Fn(&Sample) -> f64,
    {
        let rows = self.samples.get(&(body as u8)).ok_or_else(|| {
            BlueprintError::EphemerisUnavailable {
                tier: EphemerisSource::HighPrecisionBinary,
                reason: format!("module has no samples for {}", body),
            }
        })?;

        let x = (jd - self.start_jd) / self.step_days;
        let i = x.floor() as i64;
        if i < 0 || (i + 1) as usize >= rows.len() {
            return Err(BlueprintError::EphemerisUnavailable {
                tier: EphemerisSource::HighPrecisionBinary,
                reason: format!("jd {} outside sampled range", jd),
            });
        }
        let i = i as usize;
        let frac = x - i as f64;

        let window: Vec<f64> = if i >= 1 && i + 2 < rows.len() {
            (i - 1..=i + 2).map(|k| select(&rows[k])).collect()
        } else {
            (i..=i + 1).map(|k| select(&rows[k])).collect()
        };

        let values = if circular {
            unwrap_circular(&window)
        } else {
            window
        };

        let y = if values.len() == 4 {
            lagrange4(&values, frac)
        } else {
            values[0] + (values[1] - values[0]) * frac
        };
        Ok(if circular { y.rem_euclid(360.0) } else { y })
    }
}

/// Removes 360-degree jumps so a wrapping series becomes monotone enough
/// to interpolate.
fn unwrap_circular(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    let mut offset = 0.0;
    out.push(prev);
    for &v in &values[1..] {
        let mut adjusted = v + offset;
        while adjusted - prev > 180.0 {
            adjusted -= 360.0;
            offset -= 360.0;
        }
        while adjusted - prev < -180.0 {
            adjusted += 360.0;
            offset += 360.0;
        }
        out.push(adjusted);
        prev = adjusted;
    }
    out
}

/// Lagrange polynomial through four equally spaced samples at grid
/// coordinates -1, 0, 1, 2; evaluated at `frac` in [0, 1).
fn lagrange4(v: &[f64], frac: f64) -> f64 {
    let x = frac;
    let l0 = -(x * (x - 1.0) * (x - 2.0)) / 6.0;
    let l1 = ((x + 1.0) * (x - 1.0) * (x - 2.0)) / 2.0;
    let l2 = -((x + 1.0) * x * (x - 2.0)) / 2.0;
    let l3 = ((x + 1.0) * x * (x - 1.0)) / 6.0;
    v[0] * l0 + v[1] * l1 + v[2] * l2 + v[3] * l3
}

// ---------------------------
// ## One-time module load
// ---------------------------

/// Owns the lazily fetched module handle. The `OnceCell` is the
/// single-flight guard: concurrent requests arriving during an in-progress
/// load all await the same future instead of fetching twice, and the
/// outcome (even a failed one) is memoized for the process lifetime.
pub struct BinaryEphemeris {
    sources: Vec<String>,
    timeout: Duration,
    client: reqwest::Client,
    module: OnceCell<Option<Arc<EphemerisModule>>>,
}

impl BinaryEphemeris {
    pub fn new(sources: Vec<String>) -> Self {
        Self::with_timeout(sources, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(sources: Vec<String>, timeout: Duration) -> Self {
        BinaryEphemeris {
            sources,
            timeout,
            client: reqwest::Client::new(),
            module: OnceCell::new(),
        }
    }

    /// The loaded module, fetching it on first use. `None` means every
    /// source failed; the chain treats that as tier-unavailable.
    pub async fn module(&self) -> Option<Arc<EphemerisModule>> {
        self.module
            .get_or_init(|| async { self.fetch_any().await })
            .await
            .clone()
    }

    async fn fetch_any(&self) -> Option<Arc<EphemerisModule>> {
        for source in &self.sources {
            match self.fetch_one(source).await {
                Ok(module) => {
                    info!(source, "ephemeris module loaded");
                    return Some(Arc::new(module));
                }
                Err(e) => {
                    warn!(source, error = %e, "ephemeris module source failed");
                }
            }
        }
        warn!("all ephemeris module sources failed; tier disabled");
        None
    }

    async fn fetch_one(&self, url: &str) -> Result<EphemerisModule> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        EphemerisModule::decode(&bytes)
    }
}

impl BlueprintError {
    fn invalid_module(reason: &str) -> Self {
        BlueprintError::EphemerisUnavailable {
            tier: EphemerisSource::HighPrecisionBinary,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A module whose Sun moves exactly one degree per day from 0.
    fn linear_module() -> EphemerisModule {
        let rows: Vec<Sample> = (0..40)
            .map(|i| Sample {
                longitude: i as f64,
                latitude: 0.1 * i as f64,
                distance: 1.0,
            })
            .collect();
        let mut samples = HashMap::new();
        samples.insert(CelestialBody::Sun as u8, rows);
        EphemerisModule {
            start_jd: 2_451_545.0,
            step_days: 1.0,
            samples,
        }
    }

    #[test]
    fn decode_rejects_bad_magic() {
        assert!(EphemerisModule::decode(b"nope").is_err());
        assert!(EphemerisModule::decode(&[]).is_err());
    }

    #[test]
    fn encode_decode_preserves_grid() {
        let blob = linear_module().encode().unwrap();
        assert_eq!(&blob[..4], MODULE_MAGIC);
        let back = EphemerisModule::decode(&blob).unwrap();
        assert_eq!(back.start_jd, 2_451_545.0);
        assert_eq!(back.samples.len(), 1);
    }

    #[test]
    fn module_survives_a_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ephe.bin");
        std::fs::write(&path, linear_module().encode().unwrap()).unwrap();
        let back = EphemerisModule::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.step_days, 1.0);
        assert_eq!(back.samples[&(CelestialBody::Sun as u8)].len(), 40);
    }

    #[test]
    fn interpolation_recovers_linear_motion() {
        let module = linear_module();
        let pos = module.position(CelestialBody::Sun, 2_451_555.25).unwrap();
        assert_relative_eq!(pos.longitude, 10.25, epsilon = 1e-9);
        assert_relative_eq!(pos.speed_longitude, 1.0, epsilon = 1e-6);
        assert_relative_eq!(pos.latitude, 1.025, epsilon = 1e-9);
    }

    #[test]
    fn wraparound_interpolation_stays_continuous() {
        let rows: Vec<Sample> = (0..10)
            .map(|i| Sample {
                longitude: (358.0 + i as f64).rem_euclid(360.0),
                latitude: 0.0,
                distance: 1.0,
            })
            .collect();
        let mut samples = HashMap::new();
        samples.insert(CelestialBody::Sun as u8, rows);
        let module = EphemerisModule {
            start_jd: 0.0,
            step_days: 1.0,
            samples,
        };
        // Halfway between 359 and 0 degrees is 359.5, not 179.5.
        let pos = module.position(CelestialBody::Sun, 1.5).unwrap();
        assert_relative_eq!(pos.longitude, 359.5, epsilon = 1e-9);
    }

    #[test]
    fn out_of_range_and_missing_body_decline() {
        let module = linear_module();
        assert!(matches!(
            module.position(CelestialBody::Sun, 2_451_500.0),
            Err(BlueprintError::EphemerisUnavailable { .. })
        ));
        assert!(matches!(
            module.position(CelestialBody::Moon, 2_451_550.0),
            Err(BlueprintError::EphemerisUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn load_failure_is_memoized_not_fatal() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/ephe.bin");
            then.status(500);
        });

        let backend = BinaryEphemeris::new(vec![server.url("/ephe.bin")]);
        assert!(backend.module().await.is_none());
        assert!(backend.module().await.is_none());
        // Single flight: the failed load was not retried per call.
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn loads_from_first_healthy_source() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/bad.bin");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/good.bin");
            then.status(200).body(linear_module().encode().unwrap());
        });

        let backend = BinaryEphemeris::new(vec![
            server.url("/bad.bin"),
            server.url("/good.bin"),
        ]);
        let module = backend.module().await.expect("module should load");
        let pos = module.position(CelestialBody::Sun, 2_451_550.0).unwrap();
        assert_relative_eq!(pos.longitude, 5.0, epsilon = 1e-9);
    }
}
