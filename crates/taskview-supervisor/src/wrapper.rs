use std::path::Path;

use taskview_core::shell_escape;

/// Renders the wrapper script that runs one task.
///
/// The script is the on-disk contract with external observers: it records
/// its own pid, moves into the output directory, redirects both output
/// streams to their files, runs the templated command through a fresh
/// shell, records the command's exit status, and propagates it.
pub fn render_wrapper_script(output_dir: &Path, command: &str) -> String {
    let pid_path = shell_escape(&output_dir.join("pid").display().to_string());
    let stdout_path = shell_escape(&output_dir.join("stdout").display().to_string());
    let stderr_path = shell_escape(&output_dir.join("stderr").display().to_string());
    let exit_code_path = shell_escape(&output_dir.join("exitcode").display().to_string());
    let escaped_dir = shell_escape(&output_dir.display().to_string());
    let escaped_command = shell_escape(command);

    format!(
        "#!/bin/bash\n\
         set +e\n\
         echo $$ > {pid_path}\n\
         cd {escaped_dir}\n\
         exec > {stdout_path} 2> {stderr_path}\n\
         bash -c {escaped_command}\n\
         EXIT_CODE=$?\n\
         echo $EXIT_CODE > {exit_code_path}\n\
         exit $EXIT_CODE\n"
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn unit_wrapper_script_contains_full_contract() {
        let dir = PathBuf::from("/var/taskview/0a1b");
        let script = render_wrapper_script(&dir, "echo hello");

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("echo $$ > '/var/taskview/0a1b/pid'"));
        assert!(script.contains("cd '/var/taskview/0a1b'"));
        assert!(script
            .contains("exec > '/var/taskview/0a1b/stdout' 2> '/var/taskview/0a1b/stderr'"));
        assert!(script.contains("bash -c 'echo hello'"));
        assert!(script.contains("echo $EXIT_CODE > '/var/taskview/0a1b/exitcode'"));
        assert!(script.ends_with("exit $EXIT_CODE\n"));
    }

    #[test]
    fn regression_wrapper_script_escapes_embedded_quotes() {
        let dir = PathBuf::from("/var/taskview/0a1b");
        let script = render_wrapper_script(&dir, "echo 'quoted'; rm -rf /");
        assert!(script.contains(r"bash -c 'echo '\''quoted'\''; rm -rf /'"));
    }
}
