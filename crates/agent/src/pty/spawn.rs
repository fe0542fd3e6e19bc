// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use anyhow::Context;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;

/// How a shell child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Collapse to the single integer carried in `terminal:destroyed`.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => -1,
        }
    }
}

/// Newtype wrapper around the PTY master fd for use with `AsyncFd`.
#[derive(Debug)]
pub struct PtyFd(OwnedFd);

impl AsRawFd for PtyFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

/// A shell child running on a fresh pseudo-terminal.
pub struct NativePty {
    master: AsyncFd<PtyFd>,
    child_pid: Pid,
}

impl NativePty {
    /// Fork a shell onto a new PTY.
    // forkpty requires unsafe: post-fork child is partially initialized
    #[allow(unsafe_code)]
    pub fn spawn(shell: &str, cwd: Option<&Path>, cols: u16, rows: u16) -> anyhow::Result<Self> {
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty is unsafe because the child is in a
        // partially-initialized state after fork. We chdir, set the
        // environment, and immediately exec.
        let result = unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

        match result {
            ForkptyResult::Child => {
                if let Some(dir) = cwd {
                    let _ = std::env::set_current_dir(dir);
                }
                std::env::set_var("TERM", "xterm-256color");
                std::env::set_var("VIBEPILOT", "1");

                let prog = CString::new(shell.as_bytes()).context("invalid shell path")?;
                execvp(&prog, &[prog.clone()]).context("execvp failed")?;
                unreachable!();
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master)?;
                let master = AsyncFd::new(PtyFd(master)).context("AsyncFd::new failed")?;
                Ok(Self { master, child_pid: child })
            }
        }
    }

    pub fn child_pid(&self) -> i32 {
        self.child_pid.as_raw()
    }

    /// Read a chunk from the master side. `Ok(0)` or `EIO` means the
    /// child hung up.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            match guard.try_io(|inner| nix::unistd::read(inner, buf).map_err(io_err)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write all bytes to the master side.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.master.writable().await?;
            match guard.try_io(|inner| {
                nix::unistd::write(inner, &data[offset..]).map_err(io_err)
            }) {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Apply new terminal dimensions to the PTY.
    // TIOCSWINSZ ioctl requires unsafe for the libc::ioctl call
    #[allow(unsafe_code)]
    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: TIOCSWINSZ is a well-defined ioctl on the PTY master fd
        // and the Winsize struct is fully initialized.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            anyhow::bail!("TIOCSWINSZ ioctl failed: {}", io::Error::last_os_error());
        }
        Ok(())
    }

    /// Terminate the child: SIGHUP, then SIGKILL.
    pub fn kill(&self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let _ = kill(self.child_pid, Signal::SIGKILL);
    }

    /// Reap the child on a blocking thread and return how it exited.
    pub async fn wait_exit(&self) -> anyhow::Result<ExitStatus> {
        let pid = self.child_pid;
        tokio::task::spawn_blocking(move || wait_for_exit(pid))
            .await
            .context("join wait thread")?
    }

    /// Whether an EIO read error means child hangup (PTY convention).
    pub fn is_hangup(err: &io::Error) -> bool {
        err.raw_os_error() == Some(libc::EIO)
    }
}

/// Block until the child exits and convert to our `ExitStatus`.
fn wait_for_exit(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                return Ok(ExitStatus { code: Some(code), signal: None })
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(ExitStatus { code: None, signal: Some(sig as i32) })
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => {
                return Ok(ExitStatus { code: None, signal: None })
            }
            Err(e) => anyhow::bail!("waitpid failed: {e}"),
        }
    }
}

/// Set the given file descriptor to non-blocking mode.
fn set_nonblocking(fd: &impl std::os::fd::AsFd) -> io::Result<()> {
    let fd = fd.as_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn io_err(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Read the child's working directory from procfs. Returns `None` when the
/// process is gone or the kernel interface is unavailable.
pub fn read_cwd(pid: i32) -> Option<String> {
    std::fs::read_link(format!("/proc/{pid}/cwd"))
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}
