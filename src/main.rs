use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use skillhub::{
    app::AppType,
    commands::{self, Hub, UniversalAddArgs},
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "skillhub")]
#[command(about = "Skills Hub - switch AI tool providers safely and roll back file changes")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage stored provider configurations
    #[command(subcommand)]
    Provider(ProviderCommand),

    /// Manage providers shared across every app
    #[command(subcommand)]
    Universal(UniversalCommand),

    /// Capture and roll back filesystem snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Show or change hub configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Run diagnostics on the hub setup
    Doctor,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProviderCommand {
    /// List providers
    List {
        /// Only this app
        #[arg(long)]
        app: Option<AppType>,
    },

    /// Show the current provider of an app
    Current { app: AppType },

    /// Show one provider (secrets masked)
    Show {
        id: String,

        /// Print secrets unmasked
        #[arg(long)]
        raw: bool,
    },

    /// Add a provider
    Add {
        app: AppType,

        /// Config as inline JSON, or @path to a JSON file
        #[arg(long)]
        config: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Change a provider's name or config
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        /// Config as inline JSON, or @path to a JSON file
        #[arg(long)]
        config: Option<String>,
    },

    /// Delete a provider (live files are not touched)
    Delete { id: String },

    /// Store the live config of an app as a new provider
    Capture {
        app: AppType,

        #[arg(long)]
        name: Option<String>,
    },

    /// Make a provider live
    Switch { app: AppType, id: String },

    /// Write a backup back to the live files
    Restore {
        app: AppType,

        /// Backup to restore (default: latest for the app)
        #[arg(long)]
        backup_id: Option<i64>,
    },

    /// List live config backups, newest first
    Backups {
        app: AppType,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum UniversalCommand {
    /// List universal providers (keys masked)
    List,

    /// Add a universal provider
    Add {
        name: String,

        #[arg(long)]
        base_url: String,

        #[arg(long)]
        api_key: String,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Apps to enable, comma-separated (default: all)
        #[arg(long, value_delimiter = ',')]
        apps: Vec<AppType>,

        #[arg(long)]
        claude_model: Option<String>,

        #[arg(long)]
        codex_model: Option<String>,

        #[arg(long)]
        gemini_model: Option<String>,
    },

    /// Create or update one provider per enabled app and switch to each
    Apply { id: String },

    /// Delete a universal provider
    Delete { id: String },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// List snapshots, newest first
    List,

    /// Show one snapshot's entries
    Show { id: String },

    /// Capture paths before changing them
    Create {
        /// sync or kit-apply
        #[arg(long)]
        operation: String,

        /// Label for what is being changed
        #[arg(long)]
        target: String,

        /// copy or link
        #[arg(long)]
        mode: Option<String>,

        /// Snapshots to keep (SKILLS_HUB_SNAPSHOT_RETENTION overrides)
        #[arg(long)]
        retention: Option<usize>,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Restore every path captured by a snapshot
    Rollback {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Delete snapshots beyond the retention count
    Prune {
        #[arg(long)]
        retention: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show configuration and effective values
    Show,

    /// Set the number of snapshots to keep
    SetRetention { retention: usize },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "skillhub", &mut std::io::stdout());
        return Ok(());
    }

    let ui = Ui::new(cli.color, cli.no_color);
    let hub = Hub::new(Paths::new()?);

    match cli.command {
        Commands::Provider(cmd) => match cmd {
            ProviderCommand::List { app } => commands::provider_list(&hub, app, &ui),
            ProviderCommand::Current { app } => commands::provider_current(&hub, app, &ui),
            ProviderCommand::Show { id, raw } => commands::provider_show(&hub, &id, raw, &ui),
            ProviderCommand::Add { app, config, name } => {
                commands::provider_add(&hub, app, name.as_deref(), &config, &ui)
            }
            ProviderCommand::Update { id, name, config } => {
                commands::provider_update(&hub, &id, name.as_deref(), config.as_deref(), &ui)
            }
            ProviderCommand::Delete { id } => commands::provider_delete(&hub, &id, &ui),
            ProviderCommand::Capture { app, name } => {
                commands::provider_capture(&hub, app, name.as_deref(), &ui)
            }
            ProviderCommand::Switch { app, id } => commands::provider_switch(&hub, app, &id, &ui),
            ProviderCommand::Restore { app, backup_id } => {
                commands::provider_restore(&hub, app, backup_id, &ui)
            }
            ProviderCommand::Backups { app, limit } => {
                commands::provider_backups(&hub, app, limit, &ui)
            }
        },
        Commands::Universal(cmd) => match cmd {
            UniversalCommand::List => commands::universal_list(&hub, &ui),
            UniversalCommand::Add {
                name,
                base_url,
                api_key,
                website,
                notes,
                apps,
                claude_model,
                codex_model,
                gemini_model,
            } => commands::universal_add(
                &hub,
                UniversalAddArgs {
                    name,
                    base_url,
                    api_key,
                    website,
                    notes,
                    apps,
                    claude_model,
                    codex_model,
                    gemini_model,
                },
                &ui,
            ),
            UniversalCommand::Apply { id } => commands::universal_apply(&hub, &id, &ui),
            UniversalCommand::Delete { id } => commands::universal_delete(&hub, &id, &ui),
        },
        Commands::Snapshot(cmd) => match cmd {
            SnapshotCommand::List => commands::snapshot_list(&hub, &ui),
            SnapshotCommand::Show { id } => commands::snapshot_show(&hub, &id, &ui),
            SnapshotCommand::Create {
                operation,
                target,
                mode,
                retention,
                paths,
            } => commands::snapshot_create(
                &hub,
                &operation,
                &target,
                mode.as_deref(),
                retention,
                paths,
                &ui,
            ),
            SnapshotCommand::Rollback { id, yes } => {
                commands::snapshot_rollback(&hub, &id, yes, &ui)
            }
            SnapshotCommand::Prune { retention } => {
                commands::snapshot_prune(&hub, retention, &ui)
            }
        },
        Commands::Config(cmd) => match cmd {
            ConfigCommand::Show => commands::config_show(&hub, &ui),
            ConfigCommand::SetRetention { retention } => {
                commands::config_set_retention(&hub, retention, &ui)
            }
        },
        Commands::Doctor => commands::doctor(&hub, &ui),
        Commands::Completions { .. } => Ok(()),
    }
}
