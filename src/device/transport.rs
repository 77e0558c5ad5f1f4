//! The boundary between the printer session and the wireless stack.
//!
//! A session only talks to the radio through these traits, the btleplug backend lives in
//! [`crate::device::btle`]. Events flow back through narrow observer traits, one per event
//! category, which the session implements.

use std::sync::Arc;
use std::time::Duration;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::device::types::{
    Availability, Discovery, EndpointIdentity, PeripheralId, PeripheralState, ScanEvent, ScanParams,
    UnavailabilityCause, WriteAck,
};
use crate::error::TransportError;

pub trait AvailabilityObserver: Send + Sync {
    fn availability_did_change(&self, availability: Availability);

    fn unavailability_cause_did_change(&self, cause: UnavailabilityCause);
}

pub trait DisconnectObserver: Send + Sync {
    fn peripheral_did_disconnect(&self, peripheral: &PeripheralId);
}

/// A connected (or connectable) remote printer.
pub trait RemotePeripheral: Clone + Send + Sync + 'static {
    fn id(&self) -> PeripheralId;

    fn state(&self) -> BoxFuture<'_, Result<PeripheralState, TransportError>>;

    fn write<'a>(
        &'a self,
        data: &'a [u8],
        endpoint: EndpointIdentity,
        ack: WriteAck,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Closes the link. Closing a link that is already down is not an error.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

pub trait Central: Send + Sync + 'static {
    type Peripheral: RemotePeripheral;

    /// Powers up the capability for `endpoint` and registers the observers.
    ///
    /// Activating again replaces the observers of the previous activation.
    fn activate(
        &self,
        endpoint: EndpointIdentity,
        availability: Arc<dyn AvailabilityObserver>,
        disconnects: Arc<dyn DisconnectObserver>,
    ) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Runs discovery rounds until the stream is dropped or `params.max_rounds` is reached.
    fn scan(&self, endpoint: EndpointIdentity, params: ScanParams) -> BoxStream<'static, ScanEvent<Self::Peripheral>>;

    fn connect(
        &self,
        discovery: Discovery<Self::Peripheral>,
        endpoint: EndpointIdentity,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Self::Peripheral, TransportError>>;
}
