//! Drives a bluetooth LE receipt printer.
//!
//! - [`layout`]: fixed width centering and column rows for character printers
//! - [`device`]: discovery, connection upkeep and writes, on top of a pluggable transport
//! - [`config`]: the JSON config file
//!
//! ```ignore
//! let central = BtleCentral::new().await?;
//! let session = Session::new(central, SessionSettings::default());
//! session.start().await?;
//!
//! if session.wait_ready(Duration::from_secs(30)).await {
//!     let layout = LineLayout::default();
//!     session.print_line(&layout.center("RECEIPT", ' ')).await?;
//!     session.print_line(&layout.row(&["Tea", "1.50"], &[20, 6], &[Alignment::Right, Alignment::Left], ' ')).await?;
//! }
//! ```

use std::env;

pub mod app;
pub mod config;
pub mod device;
pub mod error;
pub mod layout;
pub mod payload;

pub fn init_logging() {
    let level = match env::var("LOG_LEVEL").ok().and_then(|level| level.parse::<log::LevelFilter>().ok()) {
        Some(level) => level,
        None => log::LevelFilter::Info,
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}
