// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vibepilot::config::Config;
use vibepilot::project::ProjectStore;

#[derive(Parser)]
#[command(
    name = "vibepilot",
    version,
    about = "Host-side agent bridging this workstation to remote browser clients."
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the agent (the default when no subcommand is given).
    Serve,
    /// Manage the persistent project list.
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(clap::Subcommand)]
enum ProjectCommand {
    /// Register a project root.
    Add { name: String, path: String },
    /// Print the registered projects.
    List,
    /// Remove a project by id.
    Remove { project_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.config);

    match cli.subcommand {
        Some(Commands::Project(command)) => {
            std::process::exit(run_project_command(command));
        }
        Some(Commands::Serve) | None => {
            if let Err(e) = cli.config.validate() {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
            match vibepilot::run(cli.config).await {
                Ok(()) => std::process::exit(0),
                Err(e) => {
                    error!("fatal: {e:#}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn run_project_command(command: ProjectCommand) -> i32 {
    let store = ProjectStore::load(Config::state_dir().join("projects.json"));
    match command {
        ProjectCommand::Add { name, path } => match store.add(&name, &path) {
            Ok(project) => {
                println!("{}\t{}\t{}", project.id, project.name, project.path);
                0
            }
            Err(code) => {
                eprintln!("error: {code}");
                1
            }
        },
        ProjectCommand::List => {
            let (projects, current) = store.list();
            for project in projects {
                let marker =
                    if current.as_deref() == Some(project.id.as_str()) { "*" } else { " " };
                println!("{marker} {}\t{}\t{}", project.id, project.name, project.path);
            }
            0
        }
        ProjectCommand::Remove { project_id } => match store.remove(&project_id) {
            Ok(()) => 0,
            Err(code) => {
                eprintln!("error: {code}");
                1
            }
        },
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vibepilot={}", config.log_level)));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
