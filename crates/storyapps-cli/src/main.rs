//! Terminal host for the StoryApps core.

mod pages;
mod terminal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use storyapps_core::api::{StoryApi, UreqStoryApi};
use storyapps_core::cache::{CacheRouter, CacheStorage, Fetcher, UreqFetcher};
use storyapps_core::config::AppConfig;
use storyapps_core::durable::DurableStore;
use storyapps_core::models::{CoreError, CoreErrorKind, NewStory};
use storyapps_core::navigation::Navigator;
use storyapps_core::push::PushDeliveryHandler;
use storyapps_core::subscription::SubscriptionManager;
use storyapps_core::sync::StorySync;

#[derive(Parser)]
#[command(name = "storyapps")]
#[command(version, about = "Browse and share StoryApps stories, online or offline", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the session and the cached stories
    Logout,

    /// Render the page for a route, e.g. `#/detail/story-1`
    Open {
        #[arg(default_value = "#/")]
        hash: String,
    },

    /// Publish a story, as a guest when not logged in
    Post {
        #[arg(long)]
        photo: PathBuf,
        #[arg(long)]
        description: String,
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lon: Option<f64>,
    },

    /// Manage saved stories
    Favorite {
        #[command(subcommand)]
        action: FavoriteCommand,
    },

    /// Show the notification a push payload would produce
    PushPreview {
        /// Raw payload; omit for an empty push
        payload: Option<String>,
    },
}

#[derive(Subcommand)]
enum FavoriteCommand {
    /// Save a story for offline reading
    Add { id: String },
    /// Remove a saved story
    Remove { id: String },
    /// Print saved stories as JSON
    List,
}

struct App {
    config: AppConfig,
    store: DurableStore,
    router: Arc<CacheRouter>,
    sync: StorySync,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create Tokio runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(kind = ?error.kind, operation = ?error.operation, "{}", error.message);
            eprintln!("error: {}", error.message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let app = App::open(cli.config.as_deref()).await?;
    let outcome = app.execute(cli.command).await;
    app.router.wait_until_idle().await;
    outcome
}

impl App {
    async fn execute(&self, command: Commands) -> Result<(), CoreError> {
        match command {
            Commands::Login { email, password } => {
                let session = self.sync.login(&email, &password).await?;
                println!("Welcome back, {}!", session.name);
            }
            Commands::Register {
                name,
                email,
                password,
            } => {
                self.sync.register(&name, &email, &password).await?;
                println!("Account created. Log in with `storyapps login`.");
            }
            Commands::Logout => {
                self.sync.logout().await?;
                println!("Logged out.");
            }
            Commands::Open { hash } => {
                let mut navigator = Navigator::new(pages::route_table(self.sync.clone()));
                let page = navigator.navigate(&hash).await?;
                print!("{}", page.content);
                navigator.unload();
            }
            Commands::Post {
                photo,
                description,
                lat,
                lon,
            } => {
                let story = new_story(&photo, description, lat, lon)?;
                self.sync.create_story(story).await?;
                println!("Story published.");
            }
            Commands::Favorite { action } => self.favorite(action).await?,
            Commands::PushPreview { payload } => {
                let handler = PushDeliveryHandler::new(
                    Arc::new(terminal::TerminalNotifications),
                    Arc::new(terminal::NoWindows),
                    self.config.push.clone(),
                );
                handler.on_push(payload.as_deref().map(str::as_bytes));
            }
        }
        Ok(())
    }

    async fn open(config_path: Option<&Path>) -> Result<Self, CoreError> {
        let config = AppConfig::load(config_path)?;
        let store = DurableStore::open(config.database_path.clone()).await?;

        let api_base = Url::parse(&config.api_base_url).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid api_base_url '{}': {error}", config.api_base_url),
            )
        })?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(UreqFetcher::new(config.request_timeout()));
        let router = Arc::new(CacheRouter::from_config(
            &config.cache,
            &api_base,
            Arc::new(CacheStorage::new()),
            fetcher,
        )?);
        if let Err(error) = router.install().await {
            tracing::info!(message = %error.message, "app shell not precached; continuing");
        }
        router.activate();

        let api: Arc<dyn StoryApi> = Arc::new(UreqStoryApi::routed(
            config.api_base_url.clone(),
            router.clone(),
            tokio::runtime::Handle::current(),
        ));
        let subscriptions = SubscriptionManager::new(
            Arc::new(terminal::NoPushService),
            Arc::new(terminal::NoPushService),
            api.clone(),
            store.clone(),
        );
        let sync =
            StorySync::new(api, store.clone()).with_subscriptions(Arc::new(subscriptions));

        tracing::debug!(
            database = %store.database_path().display(),
            api = %config.api_base_url,
            cache_generation = %router.names().generation(),
            "storyapps initialised"
        );

        Ok(Self {
            config,
            store,
            router,
            sync,
        })
    }

    async fn favorite(&self, action: FavoriteCommand) -> Result<(), CoreError> {
        match action {
            FavoriteCommand::Add { id } => {
                let story = match self.store.get_story_by_id(id.clone()).await? {
                    Some(story) => story,
                    None => self.sync.story_detail(&id).await?,
                };
                self.store.add_to_favorites(story).await?;
                println!("Saved story {id}.");
            }
            FavoriteCommand::Remove { id } => {
                self.store.remove_from_favorites(id.clone()).await?;
                println!("Removed story {id} from saved stories.");
            }
            FavoriteCommand::List => {
                let favorites = self.store.get_favorites().await?;
                let json = serde_json::to_string_pretty(&favorites).map_err(|error| {
                    CoreError::new(
                        CoreErrorKind::Internal,
                        format!("cannot encode saved stories: {error}"),
                    )
                })?;
                println!("{json}");
            }
        }
        Ok(())
    }
}

fn new_story(
    photo: &Path,
    description: String,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<NewStory, CoreError> {
    let bytes = std::fs::read(photo).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("cannot read photo '{}': {error}", photo.display()),
        )
    })?;

    let file_name = photo
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string());
    let extension = photo
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
    let content_type = match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };

    Ok(NewStory {
        description,
        photo: bytes,
        photo_file_name: file_name,
        photo_content_type: content_type.to_string(),
        lat,
        lon,
    })
}
