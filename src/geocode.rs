//! Turning typed locations into coordinates and back.
//!
//! Results are best-effort. A wrong match is acceptable; a failed lookup is
//! reported to the caller, which keeps its previous filter state.

use anyhow::Result;
use rand::Rng;
use serde::Deserialize;
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{Config, GeocoderProvider};
use crate::error::ActionError;
use crate::models::Coordinates;
use crate::pipeline::haversine_km;

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub coordinates: Coordinates,
}

pub trait Geocoder {
    /// Candidate places for a free-text query, best first.
    fn search(&self, query: &str) -> Result<Vec<Place>>;

    /// A human-readable address near `coordinates`.
    fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>>;

    /// Coordinates of the best match, or `None` for a blank query.
    fn resolve(&self, query: &str) -> Result<Option<Coordinates>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        Ok(self.search(query)?.first().map(|place| place.coordinates))
    }
}

const KEYWORDS: [(&str, Coordinates); 3] = [
    (
        "downtown",
        Coordinates {
            latitude: 40.7128,
            longitude: -74.0060,
        },
    ),
    (
        "uptown",
        Coordinates {
            latitude: 40.7829,
            longitude: -73.9654,
        },
    ),
    (
        "brooklyn",
        Coordinates {
            latitude: 40.6782,
            longitude: -73.9442,
        },
    ),
];

/// Offline geocoder: a small neighbourhood table, otherwise a point
/// jittered around the configured default location.
pub struct KeywordGeocoder {
    fallback: Coordinates,
    jitter_degrees: f64,
}

impl KeywordGeocoder {
    pub fn new(fallback: Coordinates) -> Self {
        KeywordGeocoder {
            fallback,
            jitter_degrees: 0.1,
        }
    }

    /// Fallback without randomness.
    pub fn without_jitter(fallback: Coordinates) -> Self {
        KeywordGeocoder {
            fallback,
            jitter_degrees: 0.0,
        }
    }

    fn jittered_fallback(&self) -> Coordinates {
        if self.jitter_degrees == 0.0 {
            return self.fallback;
        }
        let mut rng = rand::rng();
        let jitter = self.jitter_degrees;
        Coordinates::new(
            self.fallback.latitude + rng.random_range(-jitter..jitter),
            self.fallback.longitude + rng.random_range(-jitter..jitter),
        )
    }
}

impl Geocoder for KeywordGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let lower = query.to_lowercase();
        if let Some((name, coordinates)) = KEYWORDS.iter().find(|(key, _)| lower.contains(key)) {
            return Ok(vec![Place {
                name: name.to_string(),
                coordinates: *coordinates,
            }]);
        }
        Ok(vec![Place {
            name: query.to_string(),
            coordinates: self.jittered_fallback(),
        }])
    }

    fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>> {
        let nearest = KEYWORDS
            .iter()
            .map(|(name, point)| (name, haversine_km(coordinates, *point)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        Ok(match nearest {
            Some((name, km)) if km <= 3.0 => Some(name.to_string()),
            _ => Some(format!(
                "{:.4}, {:.4}",
                coordinates.latitude, coordinates.longitude
            )),
        })
    }
}

/// Spaces consecutive lookups at least `min_interval` apart.
#[derive(Debug)]
pub struct LookupPacer {
    min_interval: Duration,
    last: Cell<Option<Instant>>,
}

impl LookupPacer {
    pub fn new(min_interval: Duration) -> Self {
        LookupPacer {
            min_interval,
            last: Cell::new(None),
        }
    }

    /// How long a lookup issued at `now` must wait.
    pub fn wait_needed(&self, now: Instant) -> Duration {
        match self.last.get() {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn mark(&self, at: Instant) {
        self.last.set(Some(at));
    }

    /// Sleeps as needed, then records the lookup.
    pub fn pace(&self) {
        let wait = self.wait_needed(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "pacing geocode lookup");
            thread::sleep(wait);
        }
        self.mark(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    #[serde(default)]
    display_name: Option<String>,
}

impl NominatimPlace {
    fn into_place(self) -> Option<Place> {
        let latitude = self.lat.parse().ok()?;
        let longitude = self.lon.parse().ok()?;
        Some(Place {
            name: self.display_name,
            coordinates: Coordinates::new(latitude, longitude),
        })
    }
}

/// OpenStreetMap Nominatim `search` / `reverse` client.
pub struct NominatimGeocoder {
    client: reqwest::blocking::Client,
    base_url: String,
    pacer: LookupPacer,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, min_interval: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ActionError::Api(format!("could not build HTTP client: {}", e)))?;
        Ok(NominatimGeocoder {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pacer: LookupPacer::new(min_interval),
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.pacer.pace();
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "nominatim request");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| ActionError::Api(format!("geocoding request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Api(format!("geocoding service returned {}", status)).into());
        }
        let body = response
            .json::<T>()
            .map_err(|e| ActionError::Api(format!("unreadable geocoding response: {}", e)))?;
        Ok(body)
    }
}

impl Geocoder for NominatimGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let places: Vec<NominatimPlace> = self.get(
            "search",
            &[
                ("q", query.to_string()),
                ("format", "json".to_string()),
                ("limit", "5".to_string()),
            ],
        )?;
        Ok(places
            .into_iter()
            .filter_map(NominatimPlace::into_place)
            .collect())
    }

    fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>> {
        let place: NominatimReverse = self.get(
            "reverse",
            &[
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
                ("format", "json".to_string()),
            ],
        )?;
        Ok(place.display_name)
    }
}

/// Builds the geocoder selected in the configuration.
pub fn from_config(config: &Config) -> Result<Box<dyn Geocoder>> {
    match config.geocoder.provider {
        GeocoderProvider::Keyword => Ok(Box::new(KeywordGeocoder::new(config.default_location))),
        GeocoderProvider::Nominatim => Ok(Box::new(NominatimGeocoder::new(
            &config.geocoder.nominatim_url,
            &config.geocoder.user_agent,
            Duration::from_millis(config.geocoder.min_interval_ms),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_york() -> Coordinates {
        Coordinates::new(40.7128, -74.0060)
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let geocoder = KeywordGeocoder::new(new_york());
        let coords = geocoder.resolve("Near UPTOWN station").unwrap().unwrap();
        assert_eq!(coords, Coordinates::new(40.7829, -73.9654));
    }

    #[test]
    fn test_blank_query_resolves_to_none() {
        let geocoder = KeywordGeocoder::new(new_york());
        assert!(geocoder.resolve("   ").unwrap().is_none());
        assert!(geocoder.search("").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_query_jitters_near_fallback() {
        let geocoder = KeywordGeocoder::new(new_york());
        for _ in 0..20 {
            let coords = geocoder.resolve("110001").unwrap().unwrap();
            assert!((coords.latitude - 40.7128).abs() <= 0.1);
            assert!((coords.longitude + 74.0060).abs() <= 0.1);
        }
    }

    #[test]
    fn test_without_jitter_is_exact() {
        let geocoder = KeywordGeocoder::without_jitter(new_york());
        assert_eq!(geocoder.resolve("somewhere").unwrap(), Some(new_york()));
    }

    #[test]
    fn test_keyword_reverse() {
        let geocoder = KeywordGeocoder::new(new_york());
        assert_eq!(
            geocoder.reverse(Coordinates::new(40.6790, -73.9450)).unwrap(),
            Some("brooklyn".to_string())
        );
        assert_eq!(
            geocoder.reverse(Coordinates::new(0.0, 0.0)).unwrap(),
            Some("0.0000, 0.0000".to_string())
        );
    }

    #[test]
    fn test_pacer_first_lookup_is_free() {
        let pacer = LookupPacer::new(Duration::from_millis(500));
        assert_eq!(pacer.wait_needed(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_pacer_waits_out_interval() {
        let pacer = LookupPacer::new(Duration::from_millis(500));
        let start = Instant::now();
        pacer.mark(start);
        assert_eq!(
            pacer.wait_needed(start + Duration::from_millis(200)),
            Duration::from_millis(300)
        );
        assert_eq!(
            pacer.wait_needed(start + Duration::from_millis(900)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_nominatim_place_parsing() {
        let json = r#"[{"lat": "48.8566", "lon": "2.3522", "display_name": "Paris"},
                       {"lat": "bad", "lon": "2.0", "display_name": "Broken"}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(json).unwrap();
        let parsed: Vec<Place> = places
            .into_iter()
            .filter_map(NominatimPlace::into_place)
            .collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "Paris");
        assert_eq!(parsed[0].coordinates, Coordinates::new(48.8566, 2.3522));
    }

    #[test]
    fn test_nominatim_reverse_error_body() {
        let body: NominatimReverse =
            serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert!(body.display_name.is_none());
    }

    #[test]
    fn test_from_config_keyword() {
        let geocoder = from_config(&Config::default()).unwrap();
        assert!(geocoder.resolve("downtown").unwrap().is_some());
    }
}
