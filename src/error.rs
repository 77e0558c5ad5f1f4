use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Invalid endpoint identity: the {0} UUID is nil")]
    InvalidEndpoint(&'static str),

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Timed out while {0}")]
    Timeout(&'static str),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to activate the bluetooth transport: {source}")]
    TransportInit { source: TransportError },

    #[error("Scanning for printers failed: {source}")]
    Scan { source: TransportError },

    #[error("Connecting to printer {peripheral} failed: {source}")]
    Connect { peripheral: String, source: TransportError },
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("No printer is connected")]
    NotReady,

    #[error("Failed to write to printer: {source}")]
    Transport { #[from] source: TransportError },

    #[error("Writing to the printer took too long")]
    Timeout,

    #[error("Invalid hex payload: {source}")]
    InvalidHex { #[from] source: HexError },
}

impl WriteError {
    /// Writes while disconnected are dropped on purpose, callers usually ignore this one.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, WriteError::NotReady)
    }
}

#[derive(Error, Debug)]
pub enum HexError {
    #[error("Hex payload is empty")]
    Empty,

    #[error("{source}")]
    Decode { #[from] source: hex::FromHexError },
}

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Unknown column alignment {0:?}, expected L, R or C")]
    UnknownAlignment(String),

    #[error("Malformed column {0:?}, expected TEXT:WIDTH:ALIGN")]
    MalformedColumn(String),
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start printer session: {source}")]
    Session { #[from] source: SessionError },

    #[error("Failed to print: {source}")]
    Write { #[from] source: WriteError },

    #[error("Failed to read input: {source}")]
    Input { #[from] source: io::Error },

    #[error("Printer did not become ready within {0}")]
    NotReady(humantime::Duration),
}
