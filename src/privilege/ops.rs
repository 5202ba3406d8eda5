//! Real syscalls for the session child

use super::ChildOps;
use nix::unistd::{self, Gid, Uid};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Write one line straight to fd 2
///
/// Bypasses the stdio and tracing locks, which a thread that did not
/// survive the fork may still hold.
pub fn write_stderr(message: &str) {
    let line = format!("lamco-session-broker: {}\n", message);
    let _ = unistd::write(std::io::stderr(), line.as_bytes());
}

/// [`ChildOps`] backed by the kernel
///
/// Only meaningful in a freshly forked child.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOps;

impl ChildOps for SystemOps {
    fn redirect_stdin_to_null(&mut self) -> std::io::Result<()> {
        let null = File::open("/dev/null")?;
        unistd::dup2(null.as_raw_fd(), libc::STDIN_FILENO)?;
        Ok(())
    }

    fn redirect_output(&mut self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;

        unistd::dup2(file.as_raw_fd(), libc::STDOUT_FILENO)?;
        unistd::dup2(file.as_raw_fd(), libc::STDERR_FILENO)?;
        Ok(())
    }

    fn new_session(&mut self) -> nix::Result<()> {
        unistd::setsid().map(drop)
    }

    fn change_directory(&mut self, path: &Path) -> nix::Result<()> {
        unistd::chdir(path)
    }

    fn init_groups(&mut self, user: &str, gid: u32) -> nix::Result<()> {
        let user = CString::new(user).map_err(|_| nix::Error::EINVAL)?;
        unistd::initgroups(&user, Gid::from_raw(gid))
    }

    fn set_gid(&mut self, gid: u32) -> nix::Result<()> {
        unistd::setgid(Gid::from_raw(gid))
    }

    fn set_uid(&mut self, uid: u32) -> nix::Result<()> {
        unistd::setuid(Uid::from_raw(uid))
    }

    fn report(&mut self, message: &str) {
        write_stderr(message);
    }
}
