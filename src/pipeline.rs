//! The issue list pipeline: category filter, status filter, proximity,
//! search, sort and pagination over an issue set.
//!
//! Every stage is a plain function over owned vectors so the dashboard, the
//! "my issues" listing and the admin table share the same behaviour. The
//! stages are stable: issues that compare equal keep their input order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::models::{Category, Coordinates, Issue, Status};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_RADIUS_KM: f64 = 100.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(selected) => *selected == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("All"),
            CategoryFilter::Only(category) => write!(f, "{}", category),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

/// Free-text location the user typed and the coordinates it resolved to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFilter {
    pub query: String,
    pub coordinates: Option<Coordinates>,
}

impl LocationFilter {
    pub fn resolved(query: &str, coordinates: Coordinates) -> Self {
        LocationFilter {
            query: query.trim().to_string(),
            coordinates: Some(coordinates),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty() || self.coordinates.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Popular,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "popular" => Ok(SortOrder::Popular),
            _ => Err(format!(
                "Invalid sort '{}'. Must be one of: newest, oldest, popular",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    Table,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Grid => f.write_str("grid"),
            ViewMode::Table => f.write_str("table"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(ViewMode::Grid),
            "table" => Ok(ViewMode::Table),
            _ => Err(format!("Invalid view '{}'. Must be grid or table", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Priority,
    Status,
    Title,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "created_at" | "created" | "date" => Ok(SortField::CreatedAt),
            "priority" => Ok(SortField::Priority),
            "status" => Ok(SortField::Status),
            "title" => Ok(SortField::Title),
            _ => Err(format!(
                "Invalid sort field '{}'. Must be one of: created_at, priority, status, title",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Column sort for the admin table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for AdminSort {
    fn default() -> Self {
        AdminSort {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl AdminSort {
    /// Clicking the active column flips direction; another column starts descending.
    pub fn select(self, field: SortField) -> Self {
        if self.field == field {
            let direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
            AdminSort { field, direction }
        } else {
            AdminSort {
                field,
                direction: SortDirection::Desc,
            }
        }
    }
}

/// User-adjustable dashboard filters.
///
/// Changing the category or location (or any other filter) sends the user
/// back to page 1. View mode is not part of this state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    category: CategoryFilter,
    status: Option<Status>,
    location: LocationFilter,
    radius_km: Option<f64>,
    search: String,
    sort: SortOrder,
    page: usize,
    limit: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        FilterState {
            category: CategoryFilter::All,
            status: None,
            location: LocationFilter::default(),
            radius_km: None,
            search: String::new(),
            sort: SortOrder::Newest,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FilterState {
    pub fn with_limit(limit: usize) -> Self {
        FilterState {
            limit: limit.max(1),
            ..Default::default()
        }
    }

    pub fn category(&self) -> CategoryFilter {
        self.category
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn location(&self) -> &LocationFilter {
        &self.location
    }

    pub fn radius_km(&self) -> Option<f64> {
        self.radius_km
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn has_active_filters(&self) -> bool {
        self.category != CategoryFilter::All
            || self.status.is_some()
            || self.location.is_active()
            || !self.search.is_empty()
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        if self.category != category {
            self.category = category;
            self.page = 1;
        }
    }

    pub fn set_status(&mut self, status: Option<Status>) {
        if self.status != status {
            self.status = status;
            self.page = 1;
        }
    }

    pub fn set_location(&mut self, location: LocationFilter) {
        if self.location != location {
            self.location = location;
            self.page = 1;
        }
    }

    pub fn clear_location(&mut self) {
        self.set_location(LocationFilter::default());
    }

    pub fn set_radius_km(&mut self, radius_km: Option<f64>) {
        if self.radius_km != radius_km {
            self.radius_km = radius_km;
            self.page = 1;
        }
    }

    pub fn set_search(&mut self, search: &str) {
        let search = search.trim();
        if self.search != search {
            self.search = search.to_string();
            self.page = 1;
        }
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        if self.sort != sort {
            self.sort = sort;
            self.page = 1;
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn set_limit(&mut self, limit: usize) {
        let limit = limit.max(1);
        if self.limit != limit {
            self.limit = limit;
            self.page = 1;
        }
    }

    /// Clears every filter, keeping the page size.
    pub fn reset(&mut self) {
        *self = FilterState::with_limit(self.limit);
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Slices `items` into page `page` of size `limit` (both clamped to at least 1).
/// There is always at least one page, possibly empty.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit).max(1);
    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();
    Page {
        items,
        total,
        page,
        limit,
        total_pages,
    }
}

pub fn filter_by_category(mut issues: Vec<Issue>, filter: CategoryFilter) -> Vec<Issue> {
    issues.retain(|issue| filter.matches(issue.category));
    issues
}

pub fn filter_by_status(mut issues: Vec<Issue>, status: Option<Status>) -> Vec<Issue> {
    if let Some(status) = status {
        issues.retain(|issue| issue.status == status);
    }
    issues
}

/// Attaches `distance` from `origin` to every issue and orders nearest first.
pub fn sort_by_proximity(mut issues: Vec<Issue>, origin: Coordinates) -> Vec<Issue> {
    for issue in &mut issues {
        issue.distance = Some(haversine_km(origin, issue.location.coordinates()));
    }
    issues.sort_by(|a, b| {
        let da = a.distance.unwrap_or(f64::INFINITY);
        let db = b.distance.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });
    issues
}

/// Drops issues whose attached distance exceeds `radius_km`.
/// Issues without a distance are kept.
pub fn within_radius(mut issues: Vec<Issue>, radius_km: f64) -> Vec<Issue> {
    issues.retain(|issue| !matches!(issue.distance, Some(d) if d > radius_km));
    issues
}

/// Case-insensitive substring match on title, description and address.
pub fn search(mut issues: Vec<Issue>, query: &str) -> Vec<Issue> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return issues;
    }
    issues.retain(|issue| {
        issue.title.to_lowercase().contains(&needle)
            || issue.description.to_lowercase().contains(&needle)
            || issue.location.address.to_lowercase().contains(&needle)
    });
    issues
}

pub fn sort_issues(issues: &mut [Issue], order: SortOrder) {
    match order {
        SortOrder::Newest => issues.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => issues.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::Popular => issues.sort_by(|a, b| b.upvotes.cmp(&a.upvotes)),
    }
}

pub fn sort_for_admin(issues: &mut [Issue], sort: AdminSort) {
    let compare = |a: &Issue, b: &Issue| -> Ordering {
        match sort.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
            SortField::Status => a.status.rank().cmp(&b.status.rank()),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        }
    };
    match sort.direction {
        SortDirection::Asc => issues.sort_by(compare),
        SortDirection::Desc => issues.sort_by(|a, b| compare(b, a)),
    }
}

/// Filtered and ordered issues before pagination.
pub fn apply_filters(issues: Vec<Issue>, state: &FilterState) -> Vec<Issue> {
    let issues = filter_by_category(issues, state.category);
    let issues = filter_by_status(issues, state.status);

    let mut issues = match state.location.coordinates {
        Some(origin) => {
            let near = sort_by_proximity(issues, origin);
            match state.radius_km {
                Some(radius) => within_radius(near, radius),
                None => near,
            }
        }
        None => issues,
    };

    issues = search(issues, &state.search);

    if state.location.coordinates.is_none() {
        sort_issues(&mut issues, state.sort);
    }
    issues
}

/// Runs the whole pipeline and returns the page to render.
pub fn run(issues: Vec<Issue>, state: &FilterState) -> Page<Issue> {
    let filtered = apply_filters(issues, state);
    paginate(filtered, state.page, state.limit)
}
