//! TOML configuration: loading, validation, and search-path resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use taskview_supervisor::TaskDefinition;

const CONFIG_FILE_NAME: &str = "taskview.toml";
const SYSTEM_CONFIG_DIR: &str = "/etc/taskview";
const DEFAULT_TASK_ROOT: &str = "/var/taskview";
const DEFAULT_EXEC_USER: &str = "www-data";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub html_dir: Option<PathBuf>,
    #[serde(default)]
    pub task_dir: Option<PathBuf>,
    #[serde(default)]
    pub exec_user: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub rate_limit_rpm: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    pub secret: String,
}

/// Locates the configuration file: explicit flag, then next to the binary,
/// then the system directory.
pub fn find_config_file(flag_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        bail!("config file specified with -c not found: {}", path.display());
    }

    if let Ok(binary_dir) = binary_dir() {
        let local = binary_dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(local);
        }
    }

    let system = Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME);
    if system.exists() {
        return Ok(system);
    }

    bail!(
        "config file not found: pass -c, or place {CONFIG_FILE_NAME} next to the binary \
         or under {SYSTEM_CONFIG_DIR}/"
    )
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: AppConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to decode config file {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    if config.auth.secret.trim().is_empty() {
        bail!("auth.secret must be set in config");
    }
    if config.tasks.is_empty() {
        bail!("at least one task must be defined in config");
    }
    let mut task_names = HashSet::new();
    for (index, task) in config.tasks.iter().enumerate() {
        if task.name.is_empty() {
            bail!("task at index {index} has no name");
        }
        if task.command.is_empty() {
            bail!("task '{}' has no command", task.name);
        }
        if !task_names.insert(task.name.as_str()) {
            bail!("duplicate task name '{}'", task.name);
        }
        let mut parameter_names = HashSet::new();
        for parameter in &task.parameters {
            if parameter.name.is_empty() {
                bail!("task '{}' has a parameter with no name", task.name);
            }
            if !parameter_names.insert(parameter.name.as_str()) {
                bail!(
                    "task '{}' has duplicate parameter name '{}'",
                    task.name,
                    parameter.name
                );
            }
        }
    }
    Ok(())
}

/// HTML directory: flag, then config, then binary-adjacent `html/`, then the
/// system directory. The resolved directory must exist.
pub fn resolve_html_dir(flag: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    let candidate = if let Some(path) = flag {
        absolute(path)?
    } else if let Some(path) = &config.server.html_dir {
        absolute(path)?
    } else {
        let local = binary_dir().map(|dir| dir.join("html"));
        match local {
            Ok(local) if local.exists() => local,
            _ => Path::new(SYSTEM_CONFIG_DIR).join("html"),
        }
    };
    if !candidate.is_dir() {
        bail!("HTML directory does not exist: {}", candidate.display());
    }
    Ok(candidate)
}

/// Task output root: flag, then config, then the system default. The root
/// may not exist yet; validation creates it.
pub fn resolve_task_root(flag: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = flag {
        return absolute(path);
    }
    if let Some(path) = &config.server.task_dir {
        return absolute(path);
    }
    Ok(PathBuf::from(DEFAULT_TASK_ROOT))
}

pub fn resolve_exec_user(flag: Option<&str>, config: &AppConfig) -> String {
    flag.map(str::to_string)
        .or_else(|| config.server.exec_user.clone())
        .unwrap_or_else(|| DEFAULT_EXEC_USER.to_string())
}

fn binary_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to resolve executable path")?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable has no parent directory")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [auth]
        secret = "s3cret"

        [[tasks]]
        name = "echo"
        command = "echo hello"
    "#;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("taskview.toml");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn functional_load_config_accepts_minimal_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(dir.path(), MINIMAL);
        let config = load_config(&path).expect("load");
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.server.port, 0);
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn unit_load_config_requires_secret_and_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"
            [auth]
            secret = ""

            [[tasks]]
            name = "echo"
            command = "echo hello"
            "#,
        );
        let error = load_config(&path).expect_err("empty secret");
        assert!(error.to_string().contains("auth.secret"));

        let path = write_config(
            dir.path(),
            r#"
            [auth]
            secret = "s3cret"
            "#,
        );
        let error = load_config(&path).expect_err("no tasks");
        assert!(error.to_string().contains("at least one task"));
    }

    #[test]
    fn unit_load_config_rejects_duplicate_parameter_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"
            [auth]
            secret = "s3cret"

            [[tasks]]
            name = "greet"
            command = "echo {{msg}}"

            [[tasks.parameters]]
            name = "msg"
            type = "string"

            [[tasks.parameters]]
            name = "msg"
            type = "int"
            "#,
        );
        let error = load_config(&path).expect_err("duplicate parameter");
        assert!(error.to_string().contains("duplicate parameter name 'msg'"));
    }

    #[test]
    fn unit_load_config_rejects_unknown_parameter_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"
            [auth]
            secret = "s3cret"

            [[tasks]]
            name = "greet"
            command = "echo {{msg}}"

            [[tasks.parameters]]
            name = "msg"
            type = "float"
            "#,
        );
        let error = load_config(&path).expect_err("unknown parameter type");
        assert!(error.to_string().contains("failed to decode config file"));
    }

    #[test]
    fn unit_find_config_file_honors_explicit_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(dir.path(), MINIMAL);
        assert_eq!(find_config_file(Some(&path)).expect("found"), path);

        let missing = dir.path().join("absent.toml");
        let error = find_config_file(Some(&missing)).expect_err("missing flag path");
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn unit_resolution_precedence_flag_then_config_then_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let html = dir.path().join("html");
        std::fs::create_dir_all(&html).expect("create html dir");
        let config: AppConfig = toml::from_str(&format!(
            r#"
            [server]
            html_dir = "{}"
            task_dir = "/srv/tasks"
            exec_user = "cfg-user"

            [auth]
            secret = "s3cret"

            [[tasks]]
            name = "echo"
            command = "echo hello"
            "#,
            html.display()
        ))
        .expect("parse config");

        assert_eq!(resolve_html_dir(None, &config).expect("html dir"), html);
        assert_eq!(
            resolve_task_root(None, &config).expect("task root"),
            PathBuf::from("/srv/tasks")
        );
        assert_eq!(
            resolve_task_root(Some(Path::new("/flag/tasks")), &config).expect("task root"),
            PathBuf::from("/flag/tasks")
        );
        assert_eq!(resolve_exec_user(None, &config), "cfg-user");
        assert_eq!(resolve_exec_user(Some("flag-user"), &config), "flag-user");

        let bare: AppConfig = toml::from_str(MINIMAL).expect("parse minimal");
        assert_eq!(
            resolve_task_root(None, &bare).expect("task root"),
            PathBuf::from(DEFAULT_TASK_ROOT)
        );
        assert_eq!(resolve_exec_user(None, &bare), DEFAULT_EXEC_USER);
    }
}
