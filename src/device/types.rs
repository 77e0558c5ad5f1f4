use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    CONNECT_TIMEOUT, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID, IS_CONNECTED_DEADLINE, SCAN_DURATION,
    SCAN_INTER_ROUND_DELAY, WRITE_DEADLINE,
};
use crate::error::{SessionError, TransportError};

/// The advertised service and characteristic that carry printer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointIdentity {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl EndpointIdentity {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        EndpointIdentity { service, characteristic }
    }
}

impl Default for EndpointIdentity {
    fn default() -> Self {
        EndpointIdentity::new(DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID)
    }
}

/// Opaque, transport specific identity of a remote peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        PeripheralId(id.into())
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    WithResponse,
    WithoutResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailabilityCause {
    NoAdapter,
    PoweredOff,
    Unauthorized,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(UnavailabilityCause),
}

/// Timing of a scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    /// How long one discovery round listens for advertisements.
    pub duration: Duration,
    /// Pause between two discovery rounds.
    pub inter_round_delay: Duration,
    /// Stop after this many rounds. `None` keeps scanning until the cycle is replaced.
    pub max_rounds: Option<u32>,
}

impl Default for ScanParams {
    fn default() -> Self {
        ScanParams {
            duration: Duration::from_millis(SCAN_DURATION),
            inter_round_delay: Duration::from_millis(SCAN_INTER_ROUND_DELAY),
            max_rounds: None,
        }
    }
}

/// A peripheral seen during one discovery round.
#[derive(Debug, Clone)]
pub struct Discovery<P> {
    pub id: PeripheralId,
    pub local_name: Option<String>,
    pub remote: P,
}

#[derive(Debug)]
pub enum ScanEvent<P> {
    Started,
    Stopped,
    Discovered(Vec<Discovery<P>>),
    Failed(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Scanning,
    CandidateFound,
    NoCandidate,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChange(LinkPhase),
    Error(Arc<SessionError>),
}

/// What to do when the transport reports that the bound printer disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectPolicy {
    /// Drop readiness and forget the peripheral right away.
    Clear,
    /// Only log it and let the next scan round sort it out.
    Passive,
}

/// How an empty discovery round is interpreted while a printer is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadinessProbe {
    /// Nothing new was found, so assume the bound printer is still there.
    DiscoveryLull,
    /// Ask the peripheral whether it is still connected.
    LinkQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub scan: ScanParams,
    pub connect_timeout: Duration,
    pub write_deadline: Duration,
    pub is_connected_deadline: Duration,
    pub disconnect_policy: DisconnectPolicy,
    pub readiness_probe: ReadinessProbe,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            scan: ScanParams::default(),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT),
            write_deadline: Duration::from_millis(WRITE_DEADLINE),
            is_connected_deadline: Duration::from_millis(IS_CONNECTED_DEADLINE),
            disconnect_policy: DisconnectPolicy::Clear,
            readiness_probe: ReadinessProbe::DiscoveryLull,
        }
    }
}
