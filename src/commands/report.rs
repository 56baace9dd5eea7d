use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::Workspace;
use crate::error::ActionError;
use crate::geocode::Geocoder;
use crate::models::{Category, Coordinates, IssueId, Location, NewIssue, Priority};

pub struct ReportArgs<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub priority: &'a str,
    pub address: Option<&'a str>,
    pub coordinates: Option<Coordinates>,
    pub photos: &'a [String],
}

pub fn run(ws: &mut Workspace, args: &ReportArgs, geocoder: &dyn Geocoder) -> Result<IssueId> {
    let user = ws.require_user()?;
    let ws: &Workspace = ws;

    let category: Category = args
        .category
        .parse()
        .map_err(ActionError::Validation)?;
    let priority: Priority = args
        .priority
        .parse()
        .map_err(ActionError::Validation)?;
    let location = resolve_location(ws, args.address, args.coordinates, geocoder)?;
    let photos = args
        .photos
        .iter()
        .map(|p| resolve_photo(ws, p))
        .collect::<Result<Vec<_>>>()?;

    let issue = NewIssue {
        title: args.title.trim().to_string(),
        description: args.description.trim().to_string(),
        category,
        priority,
        location,
        photos,
    };
    let id = submit(ws, &issue, user.id)?;
    println!("Reported issue #{}: {}", id, issue.title);
    println!(
        "Location: {} ({:.4}, {:.4})",
        issue.location.address, issue.location.latitude, issue.location.longitude
    );
    Ok(id)
}

/// Validates and stores a report on behalf of `reporter`. Prints nothing;
/// callers word the confirmation.
pub(crate) fn submit(ws: &Workspace, issue: &NewIssue, reporter: i64) -> Result<IssueId> {
    issue.validate()?;
    let id = ws.db.create_issue(issue, reporter)?;
    info!(issue = id, reporter, category = %issue.category, "issue reported");
    Ok(id)
}

fn resolve_location(
    ws: &Workspace,
    address: Option<&str>,
    coordinates: Option<Coordinates>,
    geocoder: &dyn Geocoder,
) -> Result<Location> {
    let address = address.map(str::trim).filter(|a| !a.is_empty());

    match (address, coordinates) {
        (address, Some(coords)) => {
            if !coords.is_valid() {
                return Err(ActionError::Validation(format!(
                    "Coordinates out of range: {}, {}",
                    coords.latitude, coords.longitude
                ))
                .into());
            }
            let address = match address {
                Some(a) => a.to_string(),
                None => describe_point(geocoder, coords),
            };
            Ok(Location {
                address,
                latitude: coords.latitude,
                longitude: coords.longitude,
            })
        }
        (Some(address), None) => {
            let coords = geocode_address(ws, geocoder, address);
            Ok(Location {
                address: address.to_string(),
                latitude: coords.latitude,
                longitude: coords.longitude,
            })
        }
        (None, None) => Err(ActionError::Validation("Location is required".to_string()).into()),
    }
}

/// Best-effort coordinates for an address, falling back to the configured
/// default location.
pub(crate) fn geocode_address(ws: &Workspace, geocoder: &dyn Geocoder, address: &str) -> Coordinates {
    match geocoder.resolve(address) {
        Ok(Some(coords)) => coords,
        Ok(None) => {
            warn!(address, "no geocoding match, using default location");
            ws.config.default_location
        }
        Err(e) => {
            warn!(address, error = %e, "geocoding failed, using default location");
            ws.config.default_location
        }
    }
}

fn describe_point(geocoder: &dyn Geocoder, coords: Coordinates) -> String {
    match geocoder.reverse(coords) {
        Ok(Some(address)) => address,
        Ok(None) => format!("{:.4}, {:.4}", coords.latitude, coords.longitude),
        Err(e) => {
            warn!(error = %e, "reverse geocoding failed");
            format!("{:.4}, {:.4}", coords.latitude, coords.longitude)
        }
    }
}

/// Turns a photo argument into the URL that gets stored.
///
/// Absolute URLs pass through. Local files are copied into the uploads
/// directory. Upload paths are prefixed with the configured base URL, or
/// become `file://` paths when none is set.
pub(crate) fn resolve_photo(ws: &Workspace, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ActionError::Validation("Photo path is empty".to_string()).into());
    }
    if raw.starts_with("http") {
        return Ok(raw.to_string());
    }

    let source = Path::new(raw);
    if source.is_file() {
        let name = upload_name(source);
        let dest = ws.uploads_dir().join(&name);
        fs::create_dir_all(ws.uploads_dir()).context("Failed to create uploads directory")?;
        fs::copy(source, &dest)
            .with_context(|| format!("Failed to copy {} into uploads", source.display()))?;
        info!(from = %source.display(), to = %dest.display(), "photo uploaded");
        return Ok(upload_url(ws, &format!("/uploads/{}", name)));
    }

    if raw.starts_with("/uploads/") || raw.starts_with("uploads/") {
        return Ok(upload_url(ws, raw));
    }

    Err(ActionError::Validation(format!(
        "Photo '{}' is neither a URL nor a readable file",
        raw
    ))
    .into())
}

fn upload_url(ws: &Workspace, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    match &ws.config.upload_base_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), relative),
        None => format!("file://{}", ws.dir.join(relative).display()),
    }
}

fn upload_name(source: &Path) -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill(&mut bytes[..]);
    let stem: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", stem, ext.to_lowercase()),
        None => stem,
    }
}
