use log::{debug, info, warn};

use crate::device::transport::RemotePeripheral;
use crate::device::types::{
    DisconnectPolicy, Discovery, EndpointIdentity, LinkPhase, PeripheralId, PeripheralState, ReadinessProbe,
};

/// Picks the peripheral to connect to from one discovery batch.
///
/// The first discovered peripheral wins. There is no ranking by signal strength and no name
/// filtering: with more than one printer advertising the same service, whichever advertised
/// first during the round is used. Backends only report peripherals sighted in the current
/// round, so a bound printer that stopped advertising leaves the batch empty.
pub fn select_candidate<P>(batch: Vec<Discovery<P>>) -> Option<Discovery<P>> {
    batch.into_iter().next()
}

/// Follow up work a transition asks the session driver to perform.
#[derive(Debug)]
pub enum Transition<P> {
    Connect(Discovery<P>),
    QueryLink(P),
}

/// Readiness and the bound printer of one session.
///
/// Only the session event loop mutates this, callers get snapshots.
#[derive(Debug)]
pub struct SessionState<P> {
    ready: bool,
    connected: Option<P>,
    connecting: Option<PeripheralId>,
    endpoint: Option<EndpointIdentity>,
    phase: LinkPhase,
    scan_cycle: u64,
}

impl<P: RemotePeripheral> SessionState<P> {
    pub fn new() -> Self {
        SessionState {
            ready: false,
            connected: None,
            connecting: None,
            endpoint: None,
            phase: LinkPhase::Idle,
            scan_cycle: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn connected_id(&self) -> Option<PeripheralId> {
        self.connected.as_ref().map(|remote| remote.id())
    }

    pub fn endpoint(&self) -> Option<EndpointIdentity> {
        self.endpoint
    }

    /// The printer and endpoint to write to, if writes are currently allowed.
    pub fn writable(&self) -> Option<(P, EndpointIdentity)> {
        match (self.ready, &self.connected, self.endpoint) {
            (true, Some(remote), Some(endpoint)) => Some((remote.clone(), endpoint)),
            _ => None,
        }
    }

    pub fn set_endpoint(&mut self, endpoint: EndpointIdentity) {
        self.endpoint = Some(endpoint);
    }

    /// Starts a new scan cycle, scan events of older cycles are ignored from now on.
    pub fn begin_scan_cycle(&mut self) -> u64 {
        self.scan_cycle += 1;
        self.scan_cycle
    }

    pub fn is_current_cycle(&self, cycle: u64) -> bool {
        self.scan_cycle == cycle
    }

    pub fn scan_started(&mut self) {
        if !self.ready && self.connecting.is_none() {
            self.phase = LinkPhase::Scanning;
        }
    }

    pub fn discovered(&mut self, batch: Vec<Discovery<P>>, probe: ReadinessProbe) -> Option<Transition<P>> {
        debug!(
            "Discovery batch: {:?}",
            batch.iter().map(|discovery| discovery.id.to_string()).collect::<Vec<_>>()
        );

        match select_candidate(batch) {
            Some(candidate) => {
                if self.connected_id().as_ref() == Some(&candidate.id) {
                    return None;
                }

                if self.connecting.as_ref() == Some(&candidate.id) {
                    debug!("Already connecting to {}", candidate.id);
                    return None;
                }

                info!(
                    "Found printer {} ({})",
                    candidate.id,
                    candidate.local_name.as_deref().unwrap_or("NONE")
                );
                self.phase = LinkPhase::CandidateFound;
                Some(Transition::Connect(candidate))
            },
            None => match (&self.connected, probe) {
                (Some(_), ReadinessProbe::DiscoveryLull) => {
                    self.ready = true;
                    self.phase = LinkPhase::Connected;
                    None
                },
                (Some(remote), ReadinessProbe::LinkQuery) => Some(Transition::QueryLink(remote.clone())),
                (None, _) => {
                    if self.connecting.is_none() {
                        self.phase = LinkPhase::NoCandidate;
                    }
                    None
                },
            },
        }
    }

    pub fn connecting(&mut self, candidate: &PeripheralId) {
        self.connecting = Some(candidate.clone());
        self.phase = LinkPhase::Connecting;
    }

    /// Applies the outcome of a connection attempt. `None` means the attempt failed.
    ///
    /// Only the most recent attempt counts, the outcome of an attempt that was replaced by a
    /// newer one is dropped. Returns the links that are no longer used and should be closed.
    #[must_use]
    pub fn connect_completed(&mut self, candidate: &PeripheralId, outcome: Option<(P, PeripheralState)>) -> Vec<P> {
        if self.connecting.as_ref() != Some(candidate) {
            debug!("Dropping outcome of superseded connection attempt to {}", candidate);
            return outcome.map(|(remote, _)| remote).into_iter().collect();
        }
        self.connecting = None;
        self.ready = false;

        let mut unused: Vec<P> = self.connected.take().into_iter().collect();

        match outcome {
            Some((remote, PeripheralState::Connected)) => {
                info!("Printer {} ready", candidate);
                unused.retain(|previous| previous.id() != remote.id());
                self.ready = true;
                self.connected = Some(remote);
                self.phase = LinkPhase::Connected;
            },
            Some((remote, state)) => {
                warn!("Printer {} is {:?} after connecting", candidate, state);
                unused.push(remote);
                self.phase = LinkPhase::Disconnected;
            },
            None => {
                self.phase = LinkPhase::Disconnected;
            },
        }

        unused
    }

    pub fn disconnected(&mut self, peripheral: &PeripheralId, policy: DisconnectPolicy) {
        if self.connected_id().as_ref() != Some(peripheral) {
            debug!("Ignoring disconnect of unbound peripheral {}", peripheral);
            return;
        }

        match policy {
            DisconnectPolicy::Clear => {
                warn!("Printer {} disconnected", peripheral);
                self.clear();
            },
            DisconnectPolicy::Passive => {
                info!("Printer {} disconnected, waiting for the next scan round", peripheral);
            },
        }
    }

    pub fn link_checked(&mut self, peripheral: &PeripheralId, connected: bool) {
        if self.connected_id().as_ref() != Some(peripheral) {
            return;
        }

        if connected {
            self.ready = true;
            self.phase = LinkPhase::Connected;
        } else {
            warn!("Connection to printer {} lost", peripheral);
            self.clear();
        }
    }

    /// Forgets everything about the current printer, returns the link that was bound.
    ///
    /// Scan events and connect outcomes that arrive afterwards are ignored.
    pub fn shutdown(&mut self) -> Option<P> {
        self.ready = false;
        self.connecting = None;
        self.phase = LinkPhase::Idle;
        self.scan_cycle += 1;
        self.connected.take()
    }

    fn clear(&mut self) {
        self.ready = false;
        self.connected = None;
        self.phase = LinkPhase::Disconnected;
    }
}
