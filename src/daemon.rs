//! Terminal detachment.
//!
//! Must run before the tokio runtime is built: forking a process with live
//! runtime threads is not survivable.

use std::{
    fs::OpenOptions,
    io,
    os::fd::AsRawFd,
    process,
};

use nix::unistd::{fork, ForkResult};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DaemonError {
    #[snafu(display("failed to fork daemon process: {source}"))]
    Fork { source: nix::Error },

    #[snafu(display("failed to open /dev/null: {source}"))]
    OpenNull { source: io::Error },

    #[snafu(display("failed to redirect standard stream: {source}"))]
    Redirect { source: nix::Error },
}

/// Forks into the background.
///
/// The parent prints the daemon pid and exits 0; the child returns with its
/// standard streams redirected to `/dev/null`.
pub fn daemonize() -> Result<(), DaemonError> {
    match unsafe { fork() }.context(ForkSnafu)? {
        ForkResult::Parent { child } => {
            println!("Daemon pid {child}");
            process::exit(0);
        }
        ForkResult::Child => {
            let null = OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/null")
                .context(OpenNullSnafu)?;
            let streams = [
                io::stdin().as_raw_fd(),
                io::stdout().as_raw_fd(),
                io::stderr().as_raw_fd(),
            ];
            for stream in streams {
                nix::unistd::dup2(null.as_raw_fd(), stream).context(RedirectSnafu)?;
            }
            Ok(())
        }
    }
}
