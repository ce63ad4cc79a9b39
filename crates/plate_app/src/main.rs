mod cli;

use std::path::PathBuf;

fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    if let Err(err) = cli::run_app(config_path) {
        eprintln!("plate_app: {err:#}");
        std::process::exit(1);
    }
}
