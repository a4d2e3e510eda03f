use clap::Parser;

/// Command-line surface: one optional flag. Anything else, including the
/// flags clap would otherwise generate itself, is rejected at startup with a
/// usage error.
#[derive(Debug, Parser)]
#[command(
    name = "backlogd",
    about = "Append-and-echo TCP service",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Opts {
    /// Detach from the controlling terminal and run in the background.
    #[arg(short = 'd')]
    pub daemonize: bool,
}
