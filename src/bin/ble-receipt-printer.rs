use clap::Parser;
use log::{error, info};
use ble_receipt_printer::app::{run, Args};
use ble_receipt_printer::error::{AppRunError, ConfigError};
use ble_receipt_printer::init_logging;

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("BLE receipt printer ", env!("CARGO_PKG_VERSION")));

    let args = Args::parse();

    match run(args).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another instance is already printing with this config file");
            Ok(())
        },
        Err(err) => {
            error!("{}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
