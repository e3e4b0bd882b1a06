use std::path::PathBuf;

use clap::Parser;

/// Task execution viewer with live WebSocket output.
#[derive(Debug, Parser)]
#[command(name = "taskview", version, about)]
pub struct Cli {
    /// Path to the configuration file. Searched next to the binary and
    /// under /etc/taskview when omitted.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the templates/HTML directory.
    #[arg(short = 't', long = "templates", value_name = "DIR")]
    pub templates: Option<PathBuf>,

    /// Path to the task output root.
    #[arg(short = 'd', long = "task-dir", value_name = "DIR")]
    pub task_dir: Option<PathBuf>,

    /// Identity the service must run under.
    #[arg(short = 'u', long = "exec-user", value_name = "USER")]
    pub exec_user: Option<String>,

    /// Port to listen on. A port set in the config file takes precedence.
    #[arg(short = 'p', long = "port", value_name = "PORT", default_value_t = 8080)]
    pub port: u16,
}
