use std::process;

use tiny_drop::serve::{self, ServeConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = match std::env::args().nth(1) {
        None => serve::DEFAULT_PORT,
        Some(arg) => match arg.parse() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("usage: cors-serve [PORT]");
                process::exit(2);
            }
        },
    };

    let config = ServeConfig {
        port,
        ..ServeConfig::default()
    };

    // only returns when the socket could not be bound
    if let Err(err) = serve::run(config) {
        eprintln!("Could not start server on port {}: {}", port, err);
        process::exit(1);
    }
}
