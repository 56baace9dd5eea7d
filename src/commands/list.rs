use anyhow::Result;
use tracing::debug;

use super::{truncate, Workspace};
use crate::db::IssueQuery;
use crate::error::ActionError;
use crate::geocode::Geocoder;
use crate::models::{Issue, Status};
use crate::pipeline::{
    self, AdminSort, CategoryFilter, FilterState, LocationFilter, Page, SortDirection, SortField,
    SortOrder, ViewMode,
};
use crate::store::{self, Generation, Ticket, UiPreferences};

#[derive(Debug, Default)]
pub struct ListArgs<'a> {
    pub category: Option<&'a str>,
    pub status: Option<&'a str>,
    /// Location to sort by distance from; blank clears it.
    pub near: Option<&'a str>,
    pub radius_km: Option<f64>,
    pub search: Option<&'a str>,
    pub sort: Option<&'a str>,
    /// Admin table column.
    pub sort_by: Option<&'a str>,
    pub ascending: bool,
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub view: Option<&'a str>,
    pub mine: bool,
    pub reset: bool,
    pub json: bool,
}

/// Filter state plus the guard that keeps late fetches from overwriting
/// newer ones. A one-shot listing calls [`Dashboard::render`] directly; the
/// `request`/`receive` pair is for front ends with several fetches in flight.
pub struct Dashboard {
    filters: FilterState,
    admin_sort: Option<AdminSort>,
    generation: Generation,
}

impl Dashboard {
    pub fn new(filters: FilterState) -> Self {
        Dashboard {
            filters,
            admin_sort: None,
            generation: Generation::new(),
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn set_admin_sort(&mut self, sort: AdminSort) {
        self.admin_sort = Some(sort);
    }

    /// Marks the start of a fetch. Earlier fetches become stale.
    pub fn request(&mut self) -> Ticket {
        self.generation.next()
    }

    /// Runs the pipeline over a fetch result, or `None` if a newer fetch
    /// has started since `ticket` was issued.
    pub fn receive(&self, ticket: Ticket, issues: Vec<Issue>) -> Option<Page<Issue>> {
        let issues = self.generation.accept(ticket, issues)?;
        Some(self.render(issues))
    }

    /// The page to show for `issues` under the current filters.
    pub fn render(&self, issues: Vec<Issue>) -> Page<Issue> {
        let mut filtered = pipeline::apply_filters(issues, &self.filters);
        if let Some(sort) = self.admin_sort {
            pipeline::sort_for_admin(&mut filtered, sort);
        }
        pipeline::paginate(filtered, self.filters.page(), self.filters.limit())
    }
}

fn apply_args(
    ws: &Workspace,
    filters: &mut FilterState,
    args: &ListArgs,
    geocoder: &dyn Geocoder,
) -> Result<()> {
    if args.reset {
        filters.reset();
    }
    if let Some(category) = args.category {
        let category: CategoryFilter = category.parse().map_err(ActionError::Validation)?;
        filters.set_category(category);
    }
    if let Some(status) = args.status {
        let status = if status.trim().eq_ignore_ascii_case("all") {
            None
        } else {
            Some(status.parse::<Status>().map_err(ActionError::Validation)?)
        };
        filters.set_status(status);
    }
    if let Some(search) = args.search {
        filters.set_search(search);
    }
    if let Some(sort) = args.sort {
        let sort: SortOrder = sort.parse().map_err(ActionError::Validation)?;
        filters.set_sort(sort);
    }
    if let Some(limit) = args.limit {
        filters.set_limit(limit);
    }
    if let Some(radius) = args.radius_km {
        if radius.is_nan() || radius <= 0.0 {
            return Err(ActionError::Validation("Radius must be positive".to_string()).into());
        }
        filters.set_radius_km(Some(radius));
    }
    if let Some(near) = args.near {
        match geocoder.resolve(near)? {
            Some(coordinates) => {
                debug!(query = near, ?coordinates, "location filter resolved");
                filters.set_location(LocationFilter::resolved(near, coordinates));
                if filters.radius_km().is_none() {
                    filters.set_radius_km(Some(ws.config.search_radius_km));
                }
            }
            None => filters.clear_location(),
        }
    }
    if let Some(page) = args.page {
        filters.set_page(page);
    }
    Ok(())
}

pub fn run(ws: &mut Workspace, args: &ListArgs, geocoder: &dyn Geocoder) -> Result<()> {
    let mut filters = store::load_filters(&ws.storage, ws.config.page_size);
    apply_args(ws, &mut filters, args, geocoder)?;

    let mut prefs = UiPreferences::load(&ws.storage);
    if let Some(view) = args.view {
        prefs.view_mode = view.parse().map_err(ActionError::Validation)?;
    }

    let mut query = IssueQuery::default();
    if args.mine {
        query.reported_by = Some(ws.require_user()?.id);
    }

    let mut dashboard = Dashboard::new(filters);
    if let Some(field) = args.sort_by {
        ws.require_admin()?;
        let field: SortField = field.parse().map_err(ActionError::Validation)?;
        let direction = if args.ascending {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        dashboard.set_admin_sort(AdminSort { field, direction });
    }

    // Nothing is saved unless every argument applies cleanly.
    store::save_filters(&mut ws.storage, dashboard.filters())?;
    if args.view.is_some() {
        prefs.save(&mut ws.storage)?;
    }

    let page = dashboard.render(ws.db.list_issues(&query)?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if dashboard.filters().has_active_filters() {
        println!("Filters: {}", describe_filters(dashboard.filters()));
    }
    if page.items.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    let body = match prefs.view_mode {
        ViewMode::Grid => render_grid(&page.items),
        ViewMode::Table => render_table(&page.items),
    };
    print!("{}", body);
    println!("{}", page_footer(&page));
    Ok(())
}

fn describe_filters(filters: &FilterState) -> String {
    let mut parts = Vec::new();
    if filters.category() != CategoryFilter::All {
        parts.push(format!("category={}", filters.category()));
    }
    if let Some(status) = filters.status() {
        parts.push(format!("status={}", status.label()));
    }
    let location = filters.location();
    if location.is_active() {
        match filters.radius_km() {
            Some(radius) => parts.push(format!("near '{}' within {} km", location.query, radius)),
            None => parts.push(format!("near '{}'", location.query)),
        }
    }
    if !filters.search().is_empty() {
        parts.push(format!("search='{}'", filters.search()));
    }
    parts.join(", ")
}

pub fn render_grid(issues: &[Issue]) -> String {
    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!(
            "#{} [{}] {} · {}\n",
            issue.id,
            issue.status.label(),
            issue.category,
            issue.priority
        ));
        out.push_str(&format!("  {}\n", truncate(&issue.title, 60)));
        let mut meta = vec![truncate(&issue.location.address, 40)];
        if let Some(distance) = issue.distance {
            meta.push(format!("{:.1} km", distance));
        }
        meta.push(format!("▲ {}", issue.upvotes));
        meta.push(issue.created_at.format("%Y-%m-%d").to_string());
        out.push_str(&format!("  {}\n\n", meta.join(" · ")));
    }
    out
}

pub fn render_table(issues: &[Issue]) -> String {
    let mut out = format!(
        "{:<5} {:<12} {:<40} {:<13} {:<8} {:>5} {}\n",
        "ID", "STATUS", "TITLE", "CATEGORY", "PRIORITY", "VOTES", "CREATED"
    );
    for issue in issues {
        out.push_str(&format!(
            "#{:<4} {:<12} {:<40} {:<13} {:<8} {:>5} {}\n",
            issue.id,
            issue.status.label(),
            truncate(&issue.title, 40),
            issue.category.as_str(),
            issue.priority.as_str(),
            issue.upvotes,
            issue.created_at.format("%Y-%m-%d")
        ));
    }
    out
}

fn page_footer(page: &Page<Issue>) -> String {
    let first = (page.page - 1) * page.limit + 1;
    let last = first + page.items.len() - 1;
    let mut footer = format!(
        "Showing {}-{} of {} issues (page {} of {})",
        first, last, page.total, page.page, page.total_pages
    );
    if page.has_next() {
        footer.push_str(&format!(". Next: --page {}", page.page + 1));
    }
    footer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{login_as, setup_workspace};
    use crate::db::tests::sample_issue;
    use crate::geocode::KeywordGeocoder;
    use crate::models::{Category, Coordinates};
    use crate::pipeline::tests::issue_at;

    fn geocoder() -> KeywordGeocoder {
        KeywordGeocoder::without_jitter(Coordinates::new(40.7128, -74.0060))
    }

    fn seed(ws: &mut Workspace) {
        let user = login_as(ws, "Ada", false);
        for i in 0..3 {
            ws.db
                .create_issue(&sample_issue(&format!("Pothole {}", i), Category::Pothole), user.id)
                .unwrap();
        }
        for i in 0..2 {
            ws.db
                .create_issue(&sample_issue(&format!("Trash {}", i), Category::Garbage), user.id)
                .unwrap();
        }
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_category_filter_persists_and_resets_page() {
        let (mut ws, _dir) = setup_workspace();
        seed(&mut ws);

        let args = ListArgs {
            page: Some(3),
            ..Default::default()
        };
        run(&mut ws, &args, &geocoder()).unwrap();
        assert_eq!(store::load_filters(&ws.storage, 12).page(), 3);

        let args = ListArgs {
            category: Some("pothole"),
            ..Default::default()
        };
        run(&mut ws, &args, &geocoder()).unwrap();
        let saved = store::load_filters(&ws.storage, 12);
        assert_eq!(saved.category(), CategoryFilter::Only(Category::Pothole));
        assert_eq!(saved.page(), 1);
    }

    #[test]
    fn test_near_sets_location_and_default_radius() {
        let (mut ws, _dir) = setup_workspace();
        seed(&mut ws);
        let args = ListArgs {
            near: Some("brooklyn"),
            ..Default::default()
        };
        run(&mut ws, &args, &geocoder()).unwrap();
        let saved = store::load_filters(&ws.storage, 12);
        assert_eq!(
            saved.location().coordinates,
            Some(Coordinates::new(40.6782, -73.9442))
        );
        assert_eq!(saved.radius_km(), Some(100.0));

        let clear = ListArgs {
            near: Some(""),
            ..Default::default()
        };
        run(&mut ws, &clear, &geocoder()).unwrap();
        assert!(!store::load_filters(&ws.storage, 12).location().is_active());
    }

    #[test]
    fn test_invalid_argument_leaves_saved_state() {
        let (mut ws, _dir) = setup_workspace();
        let args = ListArgs {
            category: Some("garbage"),
            ..Default::default()
        };
        run(&mut ws, &args, &geocoder()).unwrap();

        let bad = ListArgs {
            category: Some("pothole"),
            sort: Some("sideways"),
            ..Default::default()
        };
        assert!(run(&mut ws, &bad, &geocoder()).is_err());
        assert_eq!(
            store::load_filters(&ws.storage, 12).category(),
            CategoryFilter::Only(Category::Garbage)
        );
    }

    #[test]
    fn test_rejected_admin_sort_saves_nothing() {
        let (mut ws, _dir) = setup_workspace();
        login_as(&mut ws, "Ada", false);
        let args = ListArgs {
            view: Some("table"),
            category: Some("parks"),
            sort_by: Some("title"),
            ..Default::default()
        };
        assert!(run(&mut ws, &args, &geocoder()).is_err());
        assert_eq!(UiPreferences::load(&ws.storage).view_mode, ViewMode::Grid);
        assert_eq!(
            store::load_filters(&ws.storage, 12).category(),
            CategoryFilter::All
        );

        let bad_field = ListArgs {
            view: Some("table"),
            sort_by: Some("colour"),
            ..Default::default()
        };
        login_as(&mut ws, "Clerk", true);
        assert!(run(&mut ws, &bad_field, &geocoder()).is_err());
        assert_eq!(UiPreferences::load(&ws.storage).view_mode, ViewMode::Grid);
    }

    #[test]
    fn test_view_toggle_keeps_page() {
        let (mut ws, _dir) = setup_workspace();
        seed(&mut ws);
        let args = ListArgs {
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        run(&mut ws, &args, &geocoder()).unwrap();

        let toggle = ListArgs {
            view: Some("table"),
            ..Default::default()
        };
        run(&mut ws, &toggle, &geocoder()).unwrap();
        assert_eq!(UiPreferences::load(&ws.storage).view_mode, ViewMode::Table);
        assert_eq!(store::load_filters(&ws.storage, 12).page(), 2);
    }

    #[test]
    fn test_mine_requires_login() {
        let (mut ws, _dir) = setup_workspace();
        let args = ListArgs {
            mine: true,
            ..Default::default()
        };
        assert!(run(&mut ws, &args, &geocoder()).is_err());
    }

    #[test]
    fn test_admin_sort_requires_admin() {
        let (mut ws, _dir) = setup_workspace();
        seed(&mut ws);
        let args = ListArgs {
            sort_by: Some("priority"),
            ..Default::default()
        };
        assert!(run(&mut ws, &args, &geocoder()).is_err());

        login_as(&mut ws, "Clerk", true);
        assert!(run(&mut ws, &args, &geocoder()).is_ok());
    }

    #[test]
    fn test_dashboard_pipeline_scenario() {
        let issues: Vec<Issue> = (1..=3)
            .map(|i| issue_at(i, Category::Pothole, 40.7, -74.0))
            .chain((4..=5).map(|i| issue_at(i, Category::Garbage, 40.7, -74.0)))
            .collect();
        let mut filters = FilterState::default();
        filters.set_category(CategoryFilter::Only(Category::Pothole));
        let mut dashboard = Dashboard::new(filters);
        let ticket = dashboard.request();
        let page = dashboard.receive(ticket, issues).unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_dashboard_drops_stale_fetch() {
        let mut dashboard = Dashboard::new(FilterState::default());
        let stale = dashboard.request();
        let fresh = dashboard.request();
        let old = vec![issue_at(1, Category::Parks, 40.7, -74.0)];
        assert!(dashboard.receive(stale, old).is_none());
        assert!(dashboard.receive(fresh, Vec::new()).is_some());
    }

    #[test]
    fn test_dashboard_admin_sort() {
        let mut dashboard = Dashboard::new(FilterState::default());
        dashboard.set_admin_sort(AdminSort {
            field: SortField::CreatedAt,
            direction: SortDirection::Asc,
        });
        let ticket = dashboard.request();
        let issues = vec![
            issue_at(2, Category::Parks, 40.7, -74.0),
            issue_at(1, Category::Parks, 40.7, -74.0),
        ];
        let page = dashboard.receive(ticket, issues).unwrap();
        let ids: Vec<i64> = page.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_render_table_and_grid() {
        let mut issue = issue_at(7, Category::RoadDamage, 40.7, -74.0);
        issue.title = "A very long title that will certainly not fit in the column".to_string();
        issue.distance = Some(1.234);

        let table = render_table(std::slice::from_ref(&issue));
        assert!(table.starts_with("ID"));
        assert!(table.contains("#7"));
        assert!(table.contains("Road Damage"));
        assert!(table.contains("..."));

        let grid = render_grid(&[issue]);
        assert!(grid.contains("[Pending]"));
        assert!(grid.contains("1.2 km"));
    }

    #[test]
    fn test_page_footer() {
        let page = pipeline::paginate(
            (1..=5).map(|i| issue_at(i, Category::Other, 0.0, 0.0)).collect(),
            2,
            2,
        );
        assert_eq!(
            page_footer(&page),
            "Showing 3-4 of 5 issues (page 2 of 3). Next: --page 3"
        );
    }
}
