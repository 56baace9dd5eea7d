#![no_main]

//! Fuzz target for the dashboard pipeline and its text rendering.
//!
//! Arbitrary titles, coordinates and filter settings go through filtering,
//! proximity sorting, search and pagination, then the grid and table
//! renderers. Panics from NaN distances or byte slicing on multi-byte
//! characters are what this is looking for.

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use civic::commands::list::{render_grid, render_table};
use civic::commands::truncate;
use civic::models::{Category, Coordinates, Issue, Location, Priority, Status};
use civic::pipeline::{self, CategoryFilter, FilterState, LocationFilter, SortOrder};

#[derive(Arbitrary, Debug)]
struct FuzzIssue {
    title: String,
    description: String,
    address: String,
    category: u8,
    status: u8,
    latitude: f64,
    longitude: f64,
    upvotes: u16,
    age_secs: u32,
}

#[derive(Arbitrary, Debug)]
struct PipelineInput {
    issues: Vec<FuzzIssue>,
    category: Option<u8>,
    status: Option<u8>,
    origin: Option<(f64, f64)>,
    radius_km: Option<f64>,
    search: String,
    sort: u8,
    page: u8,
    limit: u8,
    cut: u8,
}

fn issue(id: i64, raw: &FuzzIssue) -> Issue {
    let base = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);
    let created = base + chrono::Duration::seconds(i64::from(raw.age_secs));
    Issue {
        id,
        title: raw.title.clone(),
        description: raw.description.clone(),
        category: Category::ALL[raw.category as usize % Category::ALL.len()],
        status: [Status::Open, Status::InProgress, Status::Resolved, Status::Closed]
            [raw.status as usize % 4],
        priority: Priority::Medium,
        location: Location {
            address: raw.address.clone(),
            latitude: raw.latitude,
            longitude: raw.longitude,
        },
        photos: Vec::new(),
        reported_by: 1,
        reported_by_name: "fuzz".to_string(),
        upvotes: u32::from(raw.upvotes),
        upvoted_by: Vec::new(),
        comments: Vec::new(),
        created_at: created,
        updated_at: created,
        resolved_at: None,
        distance: None,
    }
}

fuzz_target!(|input: PipelineInput| {
    let issues: Vec<Issue> = input
        .issues
        .iter()
        .take(64)
        .enumerate()
        .map(|(i, raw)| issue(i as i64 + 1, raw))
        .collect();
    let total = issues.len();

    let mut state = FilterState::with_limit(usize::from(input.limit));
    if let Some(c) = input.category {
        state.set_category(CategoryFilter::Only(
            Category::ALL[c as usize % Category::ALL.len()],
        ));
    }
    if let Some(s) = input.status {
        state.set_status(Some(
            [Status::Open, Status::InProgress, Status::Resolved, Status::Closed][s as usize % 4],
        ));
    }
    if let Some((lat, lon)) = input.origin {
        state.set_location(LocationFilter::resolved("fuzz", Coordinates::new(lat, lon)));
        state.set_radius_km(input.radius_km);
    }
    state.set_search(&input.search);
    state.set_sort([SortOrder::Newest, SortOrder::Oldest, SortOrder::Popular][input.sort as usize % 3]);
    state.set_page(usize::from(input.page));

    let page = pipeline::run(issues, &state);
    assert!(page.items.len() <= page.limit);
    assert!(page.total <= total);

    let _ = render_grid(&page.items);
    let _ = render_table(&page.items);
    for issue in &page.items {
        let _ = truncate(&issue.title, usize::from(input.cut));
    }
});
