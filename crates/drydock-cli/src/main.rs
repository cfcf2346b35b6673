//! drydock - operator CLI for the build controller
//!
//! ## Commands
//!
//! - `run`: build one project at a commit, branch tip or current checkout
//! - `tick`: run a single poll pass over every catalog project
//! - `builds`: show a project's build history
//! - `projects`: list the catalog

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use drydock_core::git::parse_sha;
use drydock_core::github::{DEFAULT_API_URL, DEFAULT_STATUS_CONTEXT};
use drydock_core::{
    init_tracing, Build, BuildStatus, BuildStore, Controller, ControllerConfig,
    ProjectId, RepoWorkspace, TickReport, WorkspaceProvider,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "drydock")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Poll-driven CI build controller", long_about = None)]
struct Cli {
    /// Project catalog (TOML)
    #[arg(long, global = true, env = "DRYDOCK_CATALOG", default_value = "drydock.toml")]
    catalog: PathBuf,

    /// Build records and workspaces live here
    #[arg(long, global = true, env = "DRYDOCK_DATA_DIR", default_value = ".drydock")]
    data_dir: PathBuf,

    /// Token used for commit statuses and access checks
    #[arg(
        long,
        global = true,
        env = "DRYDOCK_GITHUB_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    github_token: String,

    #[arg(long, global = true, env = "DRYDOCK_GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,

    /// Context name shown next to commit statuses
    #[arg(long, global = true, env = "DRYDOCK_STATUS_CONTEXT", default_value = DEFAULT_STATUS_CONTEXT)]
    status_context: String,

    /// Base URL that commit statuses link to
    #[arg(long, global = true, env = "DRYDOCK_DASHBOARD_URL")]
    dashboard_url: Option<String>,

    /// Push the build record repository after every commit
    #[arg(long, global = true, env = "DRYDOCK_PUSH_BUILD_RECORDS")]
    push_build_records: bool,

    /// User the session runs as
    #[arg(long, global = true, env = "DRYDOCK_USER", default_value = "drydock")]
    user: String,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one project now
    Run {
        /// Project id from the catalog
        project: String,

        /// Full commit id to build
        #[arg(long, conflicts_with = "branch")]
        sha: Option<String>,

        /// Remote branch whose tip to build, e.g. origin/main
        #[arg(long)]
        branch: Option<String>,
    },

    /// Run a single poll tick
    Tick,

    /// Show build history for a project (newest first)
    Builds {
        /// Project id from the catalog
        project: String,

        /// Maximum number of builds to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List catalog projects
    Projects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            catalog_path: self.catalog.clone(),
            data_dir: self.data_dir.clone(),
            github_api_url: self.github_api_url.clone(),
            github_token: self.github_token.clone(),
            status_context: self.status_context.clone(),
            dashboard_url: self.dashboard_url.clone(),
            push_build_records: self.push_build_records,
            user: self.user.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    let config = cli.controller_config();
    let controller = Controller::open(&config)
        .with_context(|| format!("failed to open catalog {}", config.catalog_path.display()))?;

    match cli.command {
        Commands::Run {
            project,
            sha,
            branch,
        } => cmd_run(&controller, &project, sha, branch).await,
        Commands::Tick => cmd_tick(&controller, &config).await,
        Commands::Builds {
            project,
            limit,
            format,
        } => cmd_builds(controller.store.as_ref(), &project, limit, format).await,
        Commands::Projects => cmd_projects(&controller),
    }
}

async fn cmd_run(
    controller: &Controller,
    project_id: &str,
    sha: Option<String>,
    branch: Option<String>,
) -> Result<()> {
    let project = controller
        .catalog
        .get(&ProjectId::new(project_id))
        .with_context(|| format!("unknown project {project_id}"))?;
    let sha = sha.map(|s| parse_sha(&s)).transpose()?;

    let workspace = controller.workspaces.workspace(project);
    workspace
        .fetch()
        .await
        .with_context(|| format!("failed to fetch {}", project.repo_url))?;

    let sha = match (sha, branch) {
        (Some(sha), _) => sha,
        (None, Some(branch)) => {
            workspace
                .checkout(&branch)
                .await
                .with_context(|| format!("failed to check out {branch}"))?;
            workspace.current_head().await?
        }
        (None, None) => workspace.current_head().await?,
    };

    println!("Building {} at {}", project.id, sha.short());
    let build = controller
        .runner
        .run(project, &sha)
        .await
        .context("build could not be recorded")?;

    println!("{}", render_build_line(&build));
    if build.status == BuildStatus::Failure {
        bail!("build #{} of {} failed", build.number, build.project_id);
    }
    Ok(())
}

async fn cmd_tick(controller: &Controller, config: &ControllerConfig) -> Result<()> {
    let report = controller.poller.tick(&config.session()).await;
    print!("{}", render_tick_report(&report));
    if report.failed_projects > 0 || report.branch_errors > 0 {
        bail!("tick finished with errors");
    }
    Ok(())
}

async fn cmd_builds(
    store: &dyn BuildStore,
    project_id: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let builds = store
        .list_builds(&ProjectId::new(project_id))
        .await
        .with_context(|| format!("failed to read builds of {project_id}"))?;
    print!("{}", render_builds(builds, limit, format)?);
    Ok(())
}

fn cmd_projects(controller: &Controller) -> Result<()> {
    if controller.catalog.is_empty() {
        println!("No projects in catalog");
        return Ok(());
    }
    for project in controller.catalog.projects() {
        println!(
            "{:<20} {:<40} {}",
            project.id.as_str(),
            project.repo_url,
            project.build.display()
        );
    }
    Ok(())
}

fn render_build_line(build: &Build) -> String {
    let icon = match build.status {
        BuildStatus::Success => "✓",
        BuildStatus::Failure => "✗",
        BuildStatus::Pending => "…",
    };
    let duration = build
        .measured_duration()
        .map(|d| format!("{:.1}s", d.as_secs_f64()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<5} {} {:<8} {}  {}  {}",
        build.number,
        icon,
        build.status.as_str(),
        build.sha.short(),
        build.timestamp.format("%Y-%m-%d %H:%M:%S"),
        duration
    )
}

fn render_builds(mut builds: Vec<Build>, limit: usize, format: OutputFormat) -> Result<String> {
    builds.sort_by(|a, b| b.number.cmp(&a.number));
    builds.truncate(limit);

    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(&builds)?)),
        OutputFormat::Text if builds.is_empty() => Ok("No builds\n".to_string()),
        OutputFormat::Text => Ok(builds
            .iter()
            .map(|b| format!("{}\n", render_build_line(b)))
            .collect()),
    }
}

fn render_tick_report(report: &TickReport) -> String {
    format!(
        "Projects: {}\n\
         Builds triggered: {}\n\
         Already built: {}\n\
         No access: {}\n\
         Failed projects: {}\n\
         Branch errors: {}\n",
        report.projects_seen,
        report.builds_triggered,
        report.skipped_already_built,
        report.skipped_no_access,
        report.failed_projects,
        report.branch_errors
    )
}
