use crate::error::{ClientError, Result};
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};

pub const LATITUDE_ENV: &str = "FIELDLOG_LATITUDE";
pub const LONGITUDE_ENV: &str = "FIELDLOG_LONGITUDE";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// A platform location service. Each call resolves or fails exactly once.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<GeoFix>;
}

/// Always reports the same position.
pub struct FixedLocation(pub GeoFix);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<GeoFix> {
        Ok(self.0)
    }
}

/// Reads a position from `FIELDLOG_LATITUDE` / `FIELDLOG_LONGITUDE`.
pub struct EnvLocation;

fn read_coordinate(name: &str) -> Result<f64> {
    let raw = std::env::var(name)
        .map_err(|_| ClientError::LocationUnavailable(format!("{name} is not set")))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ClientError::LocationUnavailable(format!("{name} is not a number: {raw:?}")))
}

#[async_trait]
impl LocationProvider for EnvLocation {
    async fn current_position(&self) -> Result<GeoFix> {
        Ok(GeoFix {
            latitude: read_coordinate(LATITUDE_ENV)?,
            longitude: read_coordinate(LONGITUDE_ENV)?,
        })
    }
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-shot position requests with a loading flag that turns away a
/// second request while one is outstanding.
pub struct LocationCapture<P> {
    provider: P,
    loading: AtomicBool,
}

impl<P: LocationProvider> LocationCapture<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            loading: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn request(&self) -> Result<GeoFix> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::LocationBusy);
        }
        let _loading = LoadingGuard(&self.loading);
        let fix = self.provider.current_position().await?;
        debug!("Location fix {:.5}, {:.5}", fix.latitude, fix.longitude);
        Ok(fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    struct GatedProvider {
        gate: Notify,
    }

    #[async_trait]
    impl LocationProvider for GatedProvider {
        async fn current_position(&self) -> Result<GeoFix> {
            self.gate.notified().await;
            Ok(GeoFix {
                latitude: -33.86,
                longitude: 151.21,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LocationProvider for FailingProvider {
        async fn current_position(&self) -> Result<GeoFix> {
            Err(ClientError::LocationUnavailable("permission denied".to_string()))
        }
    }

    #[tokio::test]
    async fn test_second_request_is_busy_while_first_is_pending() {
        let capture = LocationCapture::new(GatedProvider {
            gate: Notify::new(),
        });

        let first = capture.request();
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(capture.is_loading());

        let second = capture.request().await;
        assert!(matches!(second, Err(ClientError::LocationBusy)));

        capture.provider().gate.notify_one();
        let fix = first.await.unwrap();
        assert_eq!(fix.latitude, -33.86);
        assert!(!capture.is_loading());
    }

    #[tokio::test]
    async fn test_failure_clears_loading_flag() {
        let capture = LocationCapture::new(FailingProvider);
        assert!(capture.request().await.is_err());
        assert!(!capture.is_loading());
    }

    #[tokio::test]
    async fn test_fixed_location() {
        let fix = GeoFix {
            latitude: 1.5,
            longitude: 2.5,
        };
        let capture = LocationCapture::new(FixedLocation(fix));
        assert_eq!(capture.request().await.unwrap(), fix);
    }
}
