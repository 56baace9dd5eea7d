use anyhow::Result;
use serde_json::json;

use crate::error::ActionError;
use crate::geocode::{Geocoder, Place};
use crate::models::Coordinates;

/// Forward lookup of a typed place name.
pub fn search(geocoder: &dyn Geocoder, query: &str, json: bool) -> Result<Vec<Place>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ActionError::Validation("Search text is required".to_string()).into());
    }
    let places = geocoder.search(query)?;

    if json {
        let out: Vec<_> = places
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "latitude": p.coordinates.latitude,
                    "longitude": p.coordinates.longitude,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if places.is_empty() {
        println!("No places found for \"{}\".", query);
    } else {
        for place in &places {
            println!(
                "{:>9.4} {:>10.4}  {}",
                place.coordinates.latitude, place.coordinates.longitude, place.name
            );
        }
    }
    Ok(places)
}

/// Reverse lookup for a point, the way "use my location" fills the filter.
pub fn reverse(geocoder: &dyn Geocoder, coordinates: Coordinates, json: bool) -> Result<String> {
    if !coordinates.is_valid() {
        return Err(ActionError::Validation(format!(
            "Coordinates out of range: {}, {}",
            coordinates.latitude, coordinates.longitude
        ))
        .into());
    }
    let address = geocoder.reverse(coordinates)?.unwrap_or_else(|| {
        format!("{:.4}, {:.4}", coordinates.latitude, coordinates.longitude)
    });

    if json {
        let out = json!({
            "address": address,
            "latitude": coordinates.latitude,
            "longitude": coordinates.longitude,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", address);
    }
    Ok(address)
}
