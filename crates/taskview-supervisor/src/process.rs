//! Pid-file readers and POSIX process probing/signalling.

use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Reads a decimal pid from `path`. Returns `None` while the file is absent,
/// empty, or not yet a positive number.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(path).ok()?;
    let pid: i64 = raw.trim().parse().ok()?;
    u32::try_from(pid).ok().filter(|pid| *pid > 0)
}

/// Reads the recorded exit status, `-1` when the file is absent or unreadable.
pub fn read_exit_code(path: &Path) -> i32 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(-1)
}

/// Signal-0 probe: true while a process with this pid exists.
pub fn is_process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn send_sigterm(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
}

pub fn send_sigkill(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok()
}
