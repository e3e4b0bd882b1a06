//! Supervised execution of predefined shell tasks.
//!
//! A [`Supervisor`] launches one wrapper script per accepted submission as a
//! detached child in its own session, records pid and exit code on disk
//! through the wrapper, and tracks every live task in a reader-writer-locked
//! registry until the attach side observes completion and asks for removal.

pub mod definition;
pub mod process;
pub mod supervisor;
pub mod wrapper;

pub use definition::TaskDefinition;
pub use process::{is_process_alive, read_exit_code, read_pid_file, send_sigkill, send_sigterm};
pub use supervisor::{
    LaunchError, Supervisor, SupervisorError, TaskSnapshot, TimeoutStage,
};
pub use wrapper::render_wrapper_script;
