use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use shoe_launcher::{
    assets::AssetBootstrapper,
    paths, projects, runner, state,
    updater::{CheckOutcome, InstallSettings, StatusReport, UpdateOrchestrator},
    Downloader, HttpTransport, LauncherConfig, ProjectRegistry, RetryPolicy, RuntimeVariant,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shoe-launcher", version, about = "Installs, updates and launches the SHOE engine")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List release channels.
    Channels,
    /// Remember where engine builds are installed.
    SetInstallRoot { path: PathBuf },
    /// Check the channel for a new build and install it.
    Check {
        #[arg(long)]
        channel: Option<String>,
        /// Print each status change as a JSON line.
        #[arg(long)]
        json: bool,
    },
    /// Manage the project list.
    #[command(subcommand)]
    Projects(ProjectsCmd),
    /// Open a project in the installed engine.
    Launch {
        project: String,
        #[arg(long)]
        channel: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectsCmd {
    List,
    Create {
        name: String,
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        dx12: bool,
        #[arg(long)]
        starter_assets: bool,
    },
}

struct App {
    root: PathBuf,
    config: LauncherConfig,
}

impl App {
    fn downloader(&self) -> Result<Downloader<HttpTransport>> {
        Ok(Downloader::new(
            HttpTransport::new()?,
            RetryPolicy::from(&self.config.retry),
            self.config.timeouts.version(),
        ))
    }

    fn install_root(&self) -> Result<Option<PathBuf>> {
        Ok(state::read_install_root(&self.root)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = paths::root_dir()?;
    let log_path = logging_init(&root)?;
    let config = LauncherConfig::load(&root)
        .with_context(|| format!("load launcher config (log: {})", log_path.display()))?;
    let app = App { root, config };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    rt.block_on(run(app, cli.command))
}

fn logging_init(root: &Path) -> Result<PathBuf> {
    shoe_launcher::logging::init(root).context("init logging")
}

async fn run(app: App, command: Cmd) -> Result<()> {
    match command {
        Cmd::Channels => {
            let registry = app.config.channel_registry()?;
            for channel in registry.list() {
                println!("{}\t{}\t{}", channel.name, channel.local_subpath, channel.remote_base);
            }
            Ok(())
        }
        Cmd::SetInstallRoot { path } => {
            state::write_install_root(&app.root, &path)?;
            println!("install root set to {}", path.display());
            Ok(())
        }
        Cmd::Check { channel, json } => check(&app, channel.as_deref(), json).await,
        Cmd::Projects(ProjectsCmd::List) => {
            let registry = ProjectRegistry::new(paths::projects_path(&app.root));
            let list = registry.load()?;
            for p in &list.projects {
                println!(
                    "{}\t{}\t{}\t{}",
                    p.name,
                    p.path.display(),
                    p.runtime_variant,
                    p.bootstrap_assets
                );
            }
            for skipped in &list.skipped {
                eprintln!("warning: {skipped}");
            }
            Ok(())
        }
        Cmd::Projects(ProjectsCmd::Create {
            name,
            base,
            dx12,
            starter_assets,
        }) => {
            let variant = if dx12 {
                RuntimeVariant::Dx12
            } else {
                RuntimeVariant::Dx11
            };
            let registry = ProjectRegistry::new(paths::projects_path(&app.root));
            let project = registry.create_project(&base, &name, variant, starter_assets)?;
            println!("created {} at {}", project.name, project.path.display());

            let boot = AssetBootstrapper::new(
                app.downloader()?,
                app.config.starter_assets_url(),
                app.config.timeouts.assets(),
            );
            let cancel = cancel_on_ctrl_c();
            if let Some(dir) = boot.maybe_bootstrap(&project, &cancel).await? {
                println!("starter assets in {}", dir.display());
            }
            Ok(())
        }
        Cmd::Launch { project, channel } => launch(&app, &project, channel.as_deref()),
    }
}

async fn check(app: &App, channel: Option<&str>, json: bool) -> Result<()> {
    let mut registry = app.config.channel_registry()?;
    if let Some(name) = channel {
        registry.select(name)?;
    }
    let channel = registry.selected().clone();

    let orch = UpdateOrchestrator::new(app.downloader()?, InstallSettings::from(&app.config));
    let mut rx = orch.subscribe_transitions();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(report) => print_report(&report, json),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("warning: {missed} status updates dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let install_root = app.install_root()?;
    orch.initialize(install_root.as_deref())?;
    let Some(install_root) = install_root else {
        bail!("no install root configured");
    };

    let cancel = cancel_on_ctrl_c();
    let outcome = orch
        .check_for_updates(&install_root, &channel, &cancel)
        .await;
    drop(orch);
    let _ = printer.await;

    match outcome? {
        CheckOutcome::UpToDate { .. } => {}
        CheckOutcome::Installed(done) if !json => {
            println!("{} {} at {}", done.channel, done.version, done.executable.display());
        }
        CheckOutcome::Installed(_) => {}
    }
    Ok(())
}

fn print_report(report: &StatusReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("warning: encode status: {e}"),
        }
        return;
    }
    match &report.message {
        Some(msg) => println!("{}: {msg}", report.status),
        None => println!("{}", report.status),
    }
}

fn launch(app: &App, project_name: &str, channel: Option<&str>) -> Result<()> {
    let mut registry = app.config.channel_registry()?;
    if let Some(name) = channel {
        registry.select(name)?;
    }
    let channel = registry.selected();

    let Some(install_root) = app.install_root()? else {
        bail!("no install root configured; run `shoe-launcher set-install-root <PATH>`");
    };
    let list = ProjectRegistry::new(paths::projects_path(&app.root)).load()?;
    let project = find_project(&list.projects, project_name)
        .with_context(|| format!("no project named {project_name:?}"))?;

    let plan = runner::LaunchPlan::new(&install_root, channel, project, &app.config.entrypoint);
    let report = runner::launch(&plan)?;
    if !report.success {
        eprintln!("engine exited with {:?}", report.exit_code);
    }
    Ok(())
}

/// Latest record wins when a name was registered more than once.
fn find_project<'a>(list: &'a [projects::Project], name: &str) -> Option<&'a projects::Project> {
    list.iter().rev().find(|p| p.name == name)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}
