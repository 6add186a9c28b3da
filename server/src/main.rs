mod config;
mod graphql;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crm::listing::Section;
use crm::{SeaOrmStore, snapshot::Dashboard};
use migration::{Migrator, MigratorTrait};
use platform_db::{DbPool, connect};
use platform_obs::{ObsConfig, init_tracing};
use tracing::info;

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "pipeline-server", version, about = "Sales pipeline CRM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert the demo managers, pipelines and actions.
    Seed,
    /// Print the GraphQL schema SDL.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
    /// Print the sales board as JSON.
    Board {
        #[arg(long, value_name = "YYYY-MM-DD", help = "Reference day, defaults to today")]
        today: Option<NaiveDate>,
    },
    /// Print one pipeline section as JSON.
    List {
        #[arg(long, value_enum, default_value_t = SectionArg::Active)]
        section: SectionArg,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
    /// Rollback every migration.
    Reset,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SectionArg {
    Board,
    Active,
    Pipe,
}

impl From<SectionArg> for Section {
    fn from(value: SectionArg) -> Self {
        match value {
            SectionArg::Board => Section::Board,
            SectionArg::Active => Section::Active,
            SectionArg::Pipe => Section::Pipe,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    init_tracing(ObsConfig::from_env())?;
    if let Some(path) = dotenv {
        info!(path = %path.display(), "loaded .env");
    }
    let cli = Cli::parse();
    match cli.command {
        Command::SchemaPrint { output } => schema_print(output),
        command => {
            let app_config = Arc::new(AppConfig::load()?);
            run(command, app_config).await
        }
    }
}

async fn run(command: Command, config: Arc<AppConfig>) -> Result<()> {
    match command {
        Command::Serve(cmd) => run_server(cmd, config).await,
        Command::Migrate(action) => run_migrate(action, &config).await,
        Command::Seed => run_seed(&config).await,
        Command::Board { today } => print_board(today, &config).await,
        Command::List { section } => print_list(section, &config).await,
        Command::SchemaPrint { output } => schema_print(output),
    }
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let sdl = graphql::schema_sdl();
    match path {
        Some(target) => {
            std::fs::write(&target, sdl)
                .with_context(|| format!("failed to write {}", target.display()))?;
            info!(path = %target.display(), "schema written");
        }
        None => println!("{sdl}"),
    }
    Ok(())
}

async fn setup_pool(config: &AppConfig) -> Result<DbPool> {
    connect(&config.database).await.map_err(Into::into)
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let pool = Arc::new(setup_pool(&config).await?);
    ensure_migrations(&pool, cmd.allow_dirty).await?;
    let schema = graphql::build_schema(pool.clone(), config.crm.clone());
    let state = AppState {
        pool,
        schema,
        config,
    };
    http::serve((&cmd).into(), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `pipeline-server migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn run_migrate(action: MigrateCommand, config: &AppConfig) -> Result<()> {
    let pool = setup_pool(config).await?;
    match action {
        MigrateCommand::Up => {
            Migrator::up(&pool, None).await?;
            info!("database migrations applied");
        }
        MigrateCommand::Down => {
            Migrator::down(&pool, Some(1)).await?;
            info!("most recent migration rolled back");
        }
        MigrateCommand::Reset => {
            Migrator::reset(&pool).await?;
            info!("all migrations rolled back");
        }
    }
    Ok(())
}

async fn run_seed(config: &AppConfig) -> Result<()> {
    let pool = setup_pool(config).await?;
    ensure_migrations(&pool, false).await?;
    let seeded = crm::seed::seed_demo(&pool).await?;
    info!(
        managers = seeded.managers.len(),
        pipelines = seeded.pipelines.len(),
        actions = seeded.actions.len(),
        "demo data inserted"
    );
    Ok(())
}

async fn load_dashboard(config: &AppConfig) -> Result<Dashboard> {
    let pool = setup_pool(config).await?;
    let mut dashboard = Dashboard::new(config.crm.board_months);
    dashboard.reload(&SeaOrmStore::new(&pool)).await?;
    Ok(dashboard)
}

async fn print_board(today: Option<NaiveDate>, config: &AppConfig) -> Result<()> {
    let dashboard = load_dashboard(config).await?;
    let today = today.unwrap_or_else(|| config.crm.clock.today());
    let board = dashboard.board(today);
    println!("{}", serde_json::to_string_pretty(&board)?);
    Ok(())
}

async fn print_list(section: SectionArg, config: &AppConfig) -> Result<()> {
    let mut dashboard = load_dashboard(config).await?;
    dashboard.set_section(section.into());
    println!("{}", serde_json::to_string_pretty(&dashboard.rows())?);
    Ok(())
}
