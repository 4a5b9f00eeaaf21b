use chrono::Local;
use env_logger::Builder;
use log::info;
use std::io::Write;
use std::path::Path;

pub struct Logger;

impl Logger {
    /// Console at debug level in debug builds, `log_path` at info level in
    /// release builds. Falls back to the console if the file can't be made.
    pub fn initialize(log_path: &Path) {
        let mut binding = Builder::from_default_env();
        let builder = binding.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });

        #[cfg(debug_assertions)]
        {
            _ = log_path;
            builder.filter(None, log::LevelFilter::Debug).init();
            info!("Debug mode: Logging to console.");
        }

        #[cfg(not(debug_assertions))]
        {
            if let Some(parent) = log_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::File::create(log_path) {
                Ok(log_file) => {
                    builder
                        .target(env_logger::Target::Pipe(Box::new(log_file)))
                        .filter(None, log::LevelFilter::Info)
                        .init();
                    info!("Release mode: Logging to file at {:?}", log_path);
                }
                Err(err) => {
                    builder.filter(None, log::LevelFilter::Info).init();
                    log::error!("Failed to create log file at {:?}: {:?}", log_path, err);
                }
            }
        }
    }
}
