use std::io;
use std::process::ExitCode;

use tiny_drop::upload::{SystemToolbox, UploadConfig, Uploader};

fn main() -> ExitCode {
    env_logger::init();

    let stdout = io::stdout();
    let mut uploader = Uploader::new(UploadConfig::default(), SystemToolbox::new(), stdout.lock());

    // the console already carries the diagnostics, the status is for scripts
    match uploader.run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
