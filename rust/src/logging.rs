/// Logging initialization.
///
/// Installs a `tracing-subscriber` fmt layer on stderr filtered by `RUST_LOG` (falling back to
/// `courier_core=debug,info`). With `log_to_file` set, a second non-ANSI layer appends to
/// `<data_dir>/courier.log`.
///
/// Called once at the start of `ChatApp::new()`. Repeated calls are no-ops.
pub fn init_logging(data_dir: &str, log_to_file: bool) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    let file_layer = if log_to_file {
        let log_path = std::path::Path::new(data_dir).join("courier.log");
        let _ = std::fs::create_dir_all(data_dir);
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true),
            ),
            Err(e) => {
                eprintln!("courier: cannot open {}: {e}", log_path.display());
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init();
}

const DEFAULT_FILTER: &str = "courier_core=debug,info";
