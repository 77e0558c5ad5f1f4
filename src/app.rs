use std::path::PathBuf;
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleCentral;
use crate::device::session::Session;
use crate::error::{AppRunError, ConfigError, SessionError};
use crate::layout::types::Column;

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Prints fixed width text on a bluetooth LE receipt printer.\n\nExample: ble-receipt-printer print \"Thank you\"", long_about = None)]
pub struct Args {
    /// Path to the JSON config file. Defaults to a file next to the executable if present,
    /// otherwise to the user config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the printer service UUID from the config file
    #[arg(long, global = true)]
    pub service: Option<Uuid>,

    /// Override the printer data characteristic UUID from the config file
    #[arg(long, global = true)]
    pub characteristic: Option<Uuid>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a layout to stdout, no printer needed
    Preview {
        #[command(subcommand)]
        layout: PreviewLayout,
    },

    /// Connect to the first printer found and print
    Print(PrintArgs),

    /// Write the effective config to the config file
    SaveConfig,
}

#[derive(Subcommand, Debug)]
pub enum PreviewLayout {
    /// Center a text on one line
    Center {
        text: String,

        #[arg(long, default_value_t = ' ')]
        fill: char,
    },

    /// Lay out one row of columns
    Row {
        /// Columns as TEXT:WIDTH:ALIGN, ALIGN being L, R or C
        #[arg(required = true)]
        columns: Vec<Column>,

        #[arg(long, default_value_t = ' ')]
        fill: char,
    },
}

#[derive(ClapArgs, Debug)]
pub struct PrintArgs {
    /// Lines to print. Lines are read from stdin if none are given.
    pub lines: Vec<String>,

    /// Center each line
    #[arg(long)]
    pub center: bool,

    /// Raw bytes to send after the lines, as hex (e.g. 1B40)
    #[arg(long)]
    pub hex: Option<String>,

    /// How long to wait for a printer to become ready
    #[arg(long, default_value = "30s")]
    pub wait: humantime::Duration,
}

async fn load_config(config_io: &ConfigIO) -> Result<Config, ConfigError> {
    match config_io.read().await {
        Ok(config) => Ok(config),
        Err(err) if err.is_file_not_found_error() => {
            info!("Config file not found, using defaults");
            Ok(Config::default())
        },
        Err(err) => Err(err),
    }
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(service) = args.service {
        config.service_uuid = service;
    }
    if let Some(characteristic) = args.characteristic {
        config.characteristic_uuid = characteristic;
    }
    config
}

fn preview(config: &Config, layout: &PreviewLayout) {
    let line_layout = config.layout();

    let line = match layout {
        PreviewLayout::Center { text, fill } => line_layout.center(text, *fill),
        PreviewLayout::Row { columns, fill } => line_layout.row_columns(columns, *fill),
    };

    if line.is_empty() {
        warn!("Columns do not fit on a line of {} characters", line_layout.chars_per_line());
    }
    println!("{}", line);
}

async fn read_stdin_lines() -> Result<Vec<String>, AppRunError> {
    let mut lines = BufReader::new(stdin()).lines();
    let mut result = Vec::new();

    while let Some(line) = lines.next_line().await? {
        result.push(line);
    }

    Ok(result)
}

async fn print(config: &Config, args: &PrintArgs) -> Result<(), AppRunError> {
    let lines = match args.lines.is_empty() {
        true => read_stdin_lines().await?,
        false => args.lines.clone(),
    };

    let central = BtleCentral::new().await
        .map_err(|source| SessionError::TransportInit { source })?;
    let session = Session::new(central, config.session_settings());
    session.configure(config.endpoint());
    session.start().await?;

    info!("Waiting up to {} for a printer", args.wait);
    if !session.wait_ready(*args.wait).await {
        session.stop().await;
        return Err(AppRunError::NotReady(args.wait));
    }

    let line_layout = config.layout();
    let result = async {
        for line in &lines {
            match args.center {
                true => session.print_line(&line_layout.center(line, ' ')).await?,
                false => session.print_line(line).await?,
            }
        }

        if let Some(hex) = &args.hex {
            session.print_hex(hex).await?;
        }

        Ok::<(), AppRunError>(())
    }.await;

    session.stop().await;
    result
}

pub async fn run(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    let config = apply_overrides(load_config(&config_io).await?, &args);

    match &args.command {
        Command::Preview { layout } => preview(&config, layout),
        Command::Print(print_args) => {
            let mut locker = config_io.locker()?;
            let _guard = locker.lock()?;
            print(&config, print_args).await?;
        },
        Command::SaveConfig => {
            config_io.save(&config).await?;
            info!("Saved config to {}", config_io.path().to_string_lossy());
        },
    }

    Ok(())
}
