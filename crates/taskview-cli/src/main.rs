mod cli_args;
mod config;
mod task_root;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use taskview_gateway::{run_server, GatewayConfig};
use taskview_supervisor::Supervisor;

use crate::cli_args::Cli;
use crate::config::{
    find_config_file, load_config, resolve_exec_user, resolve_html_dir, resolve_task_root,
};
use crate::task_root::{ensure_exec_user, validate_task_root};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let config_path = find_config_file(cli.config.as_deref())?;
    info!(path = %config_path.display(), "using config file");
    let app_config = load_config(&config_path)?;

    let html_dir = resolve_html_dir(cli.templates.as_deref(), &app_config)?;
    let task_root = resolve_task_root(cli.task_dir.as_deref(), &app_config)?;
    let exec_user = resolve_exec_user(cli.exec_user.as_deref(), &app_config);
    info!(
        html_dir = %html_dir.display(),
        task_root = %task_root.display(),
        exec_user,
        "resolved runtime paths"
    );

    ensure_exec_user(&exec_user)?;
    validate_task_root(&task_root)?;

    let port = if app_config.server.port > 0 {
        app_config.server.port
    } else {
        cli.port
    };

    let supervisor = Arc::new(Supervisor::new(task_root, app_config.tasks.clone()));
    let gateway_config = GatewayConfig {
        bind: format!("0.0.0.0:{port}"),
        secret: app_config.auth.secret.clone(),
        html_dir,
        allowed_origins: app_config.server.allowed_origins.clone(),
        rate_limit_rpm: app_config.server.rate_limit_rpm,
    };

    run_server(gateway_config, supervisor).await
}
