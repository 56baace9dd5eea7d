use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use civic::commands::{self, Workspace, DATA_DIR};
use civic::geocode;
use civic::models::Coordinates;

#[derive(Parser)]
#[command(name = "civic")]
#[command(about = "Report, track and resolve civic issues in your city")]
#[command(version)]
struct Cli {
    /// Project directory containing .civic (defaults to searching upward)
    #[arg(long, global = true, env = "CIVIC_DIR")]
    dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize civic in the current directory
    Init {
        /// Restore the default configuration
        #[arg(short, long)]
        force: bool,
        /// Create the first administrator with this email
        #[arg(long, requires = "admin_password")]
        admin_email: Option<String>,
        /// Password for the first administrator
        #[arg(long, requires = "admin_email")]
        admin_password: Option<String>,
        /// Display name for the first administrator
        #[arg(long, default_value = "City Admin")]
        admin_name: String,
    },

    /// Create a citizen account and log in
    Register {
        name: String,
        email: String,
        password: String,
    },

    /// Log in with email and password
    Login { email: String, password: String },

    /// Log out
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Report a new issue
    Report {
        /// Short title
        title: String,
        /// What is wrong
        #[arg(short, long)]
        description: String,
        /// Category (Pothole, Garbage, Streetlight, Water Supply, Drainage, Road Damage, Parks, Other)
        #[arg(short, long)]
        category: String,
        /// Priority (low, medium, high)
        #[arg(short, long, default_value = "medium")]
        priority: String,
        /// Address or landmark
        #[arg(short, long)]
        address: Option<String>,
        /// Coordinates as "lat,lon"
        #[arg(long, value_parser = parse_coordinates, allow_hyphen_values = true)]
        at: Option<Coordinates>,
        /// Photo URL or local image path (repeatable)
        #[arg(long = "photo")]
        photos: Vec<String>,
    },

    /// List issues on the dashboard
    List {
        /// Category filter (or "All")
        #[arg(short, long)]
        category: Option<String>,
        /// Status filter (open, in_progress, resolved, closed)
        #[arg(short, long)]
        status: Option<String>,
        /// Place to search around
        #[arg(short, long)]
        near: Option<String>,
        /// Search radius in kilometres
        #[arg(short, long)]
        radius: Option<f64>,
        /// Text search over title, description and address
        #[arg(short = 'q', long)]
        search: Option<String>,
        /// Sort order (newest, oldest, popular)
        #[arg(long)]
        sort: Option<String>,
        /// Admin table sort column (created_at, priority, status, title)
        #[arg(long)]
        sort_by: Option<String>,
        /// Ascending admin sort
        #[arg(long)]
        asc: bool,
        /// Page number, starting at 1
        #[arg(long)]
        page: Option<usize>,
        /// Issues per page
        #[arg(long)]
        limit: Option<usize>,
        /// View mode (grid, table)
        #[arg(long)]
        view: Option<String>,
        /// Only my issues
        #[arg(long)]
        mine: bool,
        /// Clear saved filters first
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show issue details and comments
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },

    /// Comment on an issue
    Comment {
        id: i64,
        text: String,
        /// Photo URL or local image path (repeatable)
        #[arg(long = "photo")]
        photos: Vec<String>,
    },

    /// Change an issue's status (admin)
    Status {
        id: i64,
        /// New status (open, in_progress, resolved, closed)
        status: String,
        /// Resolution or progress note
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Delete one of your pending issues
    Delete {
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Toggle your upvote on an issue
    Upvote { id: i64 },

    /// Community statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Top contributors
    Leaderboard {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// Look up a place, or the address at coordinates
    Locate {
        /// Place name to search for
        query: Option<String>,
        /// Coordinates as "lat,lon" for a reverse lookup
        #[arg(long, value_parser = parse_coordinates, allow_hyphen_values = true)]
        at: Option<Coordinates>,
        #[arg(long)]
        json: bool,
    },

    /// Talk to the city assistant
    Chat {
        /// Single message; omit for an interactive session
        message: Option<String>,
    },
}

fn parse_coordinates(raw: &str) -> std::result::Result<Coordinates, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got \"{}\"", raw))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude \"{}\"", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude \"{}\"", lon.trim()))?;
    Ok(Coordinates::new(lat, lon))
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "warn,civic=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn find_civic_dir(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(DATA_DIR);
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a civic project (or any parent). Run 'civic init' first.");
        }
    }
}

fn open_workspace(dir: Option<&Path>) -> Result<Workspace> {
    let civic_dir = match dir {
        Some(dir) => {
            let candidate = dir.join(DATA_DIR);
            if !candidate.is_dir() {
                bail!("No {} in {}. Run 'civic init' first.", DATA_DIR, dir.display());
            }
            candidate
        }
        None => find_civic_dir(&env::current_dir()?)?,
    };
    Workspace::open(&civic_dir)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Commands::Init {
        force,
        admin_email,
        admin_password,
        admin_name,
    } = cli.command
    {
        let root = match cli.dir {
            Some(dir) => dir,
            None => env::current_dir()?,
        };
        let admin = match (admin_email.as_deref(), admin_password.as_deref()) {
            (Some(email), Some(password)) => Some(commands::init::AdminAccount {
                name: &admin_name,
                email,
                password,
            }),
            _ => None,
        };
        return commands::init::run(&root, force, admin.as_ref());
    }

    let mut ws = open_workspace(cli.dir.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Register {
            name,
            email,
            password,
        } => commands::auth::register(&mut ws, &name, &email, &password),

        Commands::Login { email, password } => commands::auth::login(&mut ws, &email, &password),

        Commands::Logout => commands::auth::logout(&mut ws),

        Commands::Whoami => commands::auth::whoami(&mut ws),

        Commands::Report {
            title,
            description,
            category,
            priority,
            address,
            at,
            photos,
        } => {
            let geocoder = geocode::from_config(&ws.config)?;
            let args = commands::report::ReportArgs {
                title: &title,
                description: &description,
                category: &category,
                priority: &priority,
                address: address.as_deref(),
                coordinates: at,
                photos: &photos,
            };
            commands::report::run(&mut ws, &args, geocoder.as_ref()).map(|_| ())
        }

        Commands::List {
            category,
            status,
            near,
            radius,
            search,
            sort,
            sort_by,
            asc,
            page,
            limit,
            view,
            mine,
            reset,
            json,
        } => {
            let geocoder = geocode::from_config(&ws.config)?;
            let args = commands::list::ListArgs {
                category: category.as_deref(),
                status: status.as_deref(),
                near: near.as_deref(),
                radius_km: radius,
                search: search.as_deref(),
                sort: sort.as_deref(),
                sort_by: sort_by.as_deref(),
                ascending: asc,
                page,
                limit,
                view: view.as_deref(),
                mine,
                reset,
                json,
            };
            commands::list::run(&mut ws, &args, geocoder.as_ref())
        }

        Commands::Show { id, json } => commands::show::run(&ws, id, json),

        Commands::Comment { id, text, photos } => {
            commands::comment::run(&mut ws, id, &text, &photos)
        }

        Commands::Status {
            id,
            status,
            message,
        } => commands::status::run(&mut ws, id, &status, message.as_deref()),

        Commands::Delete { id, force } => commands::delete::run(&mut ws, id, force),

        Commands::Upvote { id } => commands::upvote::run(&mut ws, id).map(|_| ()),

        Commands::Stats { json } => commands::stats::run(&ws, json).map(|_| ()),

        Commands::Leaderboard { limit, json } => commands::leaderboard::run(&ws, limit, json),

        Commands::Locate { query, at, json } => {
            let geocoder = geocode::from_config(&ws.config)?;
            match (query, at) {
                (_, Some(at)) => commands::locate::reverse(geocoder.as_ref(), at, json).map(|_| ()),
                (Some(query), None) => {
                    commands::locate::search(geocoder.as_ref(), &query, json).map(|_| ())
                }
                (None, None) => bail!("Give a place name or --at \"lat,lon\""),
            }
        }

        Commands::Chat { message } => {
            let geocoder = geocode::from_config(&ws.config)?;
            commands::chat::run(&mut ws, message.as_deref(), geocoder.as_ref())
        }
    }
}
