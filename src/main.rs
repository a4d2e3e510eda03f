use clap::Parser;

fn main() {
    let opts = backlogd::cli::Opts::parse();
    std::process::exit(backlogd::app::run(opts));
}
