//! Child process construction for the media tools.
//!
//! Every ffmpeg/ffprobe/locator invocation is built here so stdio handling
//! stays the same everywhere. On Windows the console window a console binary
//! would otherwise open is suppressed.

use std::ffi::OsStr;
use std::process::Stdio;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Blocking command for short queries such as `ffmpeg -version` or `which`.
///
/// `output()` captures stdout and stderr; stdin is closed.
pub fn query_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.stdin(Stdio::null());
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Async command with stdout and stderr piped and stdin closed.
///
/// The child is killed when its handle is dropped, so a timed-out or
/// cancelled caller never leaves a tool running.
pub fn piped_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}
