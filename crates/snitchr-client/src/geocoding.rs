use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use snitchr_types::models::Location;

use crate::error::{ClientError, Result};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const UNKNOWN_LOCATION: &str = "Unknown location";
const USER_AGENT: &str = "Snitchr/1.0";
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A human-readable place for a pair of coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    /// Most specific settlement name found.
    pub name: String,
    pub full_address: String,
    pub country: String,
    pub state: String,
    pub city: String,
}

impl Place {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_LOCATION.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, location: Location) -> Result<Place>;
}

/// OpenStreetMap Nominatim reverse lookups at city zoom.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(NOMINATIM_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct NominatimResponse {
    display_name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
    municipality: Option<String>,
    country: Option<String>,
    state: Option<String>,
}

impl From<NominatimResponse> for Place {
    fn from(response: NominatimResponse) -> Self {
        let a = response.address;
        let city = a.city.clone().or_else(|| a.town.clone()).or_else(|| a.village.clone());
        let name = city
            .clone()
            .or(a.suburb)
            .or(a.municipality)
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        Place {
            name,
            full_address: response.display_name.unwrap_or_default(),
            country: a.country.unwrap_or_default(),
            state: a.state.unwrap_or_default(),
            city: city.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, location: Location) -> Result<Place> {
        let lat = location.latitude.to_string();
        let lon = location.longitude.to_string();
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .header(reqwest::header::ACCEPT_LANGUAGE, "en")
            .query(&[
                ("format", "json"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", "10"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Network(format!(
                "geocoder answered {}",
                response.status()
            )));
        }
        let body: NominatimResponse = response.json().await?;
        Ok(body.into())
    }
}

/// Memoises lookups by coordinates rounded to four decimals. Failed lookups
/// resolve to [`Place::unknown`] and are retried next time.
pub struct GeocodeCache<G> {
    geocoder: G,
    entries: Mutex<HashMap<String, Place>>,
}

impl<G: ReverseGeocoder> GeocodeCache<G> {
    pub fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, location: Location) -> Place {
        let key = cache_key(location);
        if let Some(place) = self.entries().get(&key) {
            return place.clone();
        }

        match self.geocoder.reverse(location).await {
            Ok(place) => {
                debug!("Geocoded {} as {}", key, place.name);
                self.entries().insert(key, place.clone());
                place
            }
            Err(e) => {
                warn!("Reverse geocoding {} failed: {}", key, e);
                Place::unknown()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Place>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn cache_key(location: Location) -> String {
    format!("{:.4},{:.4}", location.latitude, location.longitude)
}

/// Great-circle distance by the haversine formula.
pub fn distance_km(a: Location, b: Location) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// `850m` under a kilometre, `12km` otherwise.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{}m", (km * 1000.0).round())
    } else {
        format!("{}km", km.round())
    }
}
