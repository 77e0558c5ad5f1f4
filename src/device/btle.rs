use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use btleplug::api::{Central as _, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId as BtlePeripheralId};
use futures::channel::mpsc::{channel, Sender};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{select_all, BoxStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::constants::ADAPTER_POLL_DELAY;
use crate::device::transport::{AvailabilityObserver, Central, DisconnectObserver, RemotePeripheral};
use crate::device::types::{
    Availability, Discovery, EndpointIdentity, PeripheralId, PeripheralState, ScanEvent, ScanParams,
    UnavailabilityCause, WriteAck,
};
use crate::error::TransportError;

fn peripheral_id(peripheral: &Peripheral) -> PeripheralId {
    PeripheralId::new(format!("{:?}", peripheral.id()))
}

fn validate_endpoint(endpoint: &EndpointIdentity) -> Result<(), TransportError> {
    if endpoint.service.is_nil() {
        return Err(TransportError::InvalidEndpoint("service"));
    }
    if endpoint.characteristic.is_nil() {
        return Err(TransportError::InvalidEndpoint("characteristic"));
    }
    Ok(())
}

/// A printer reachable through btleplug.
#[derive(Debug, Clone)]
pub struct BtlePrinter {
    id: PeripheralId,
    peripheral: Peripheral,
}

impl BtlePrinter {
    fn new(peripheral: Peripheral) -> Self {
        BtlePrinter { id: peripheral_id(&peripheral), peripheral }
    }

    fn find_characteristic(&self, endpoint: &EndpointIdentity) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|characteristic| {
                characteristic.service_uuid == endpoint.service && characteristic.uuid == endpoint.characteristic
            })
            .ok_or(TransportError::MissingCharacteristic)
    }
}

impl RemotePeripheral for BtlePrinter {
    fn id(&self) -> PeripheralId {
        self.id.clone()
    }

    fn state(&self) -> BoxFuture<'_, Result<PeripheralState, TransportError>> {
        async move {
            match self.peripheral.is_connected().await? {
                true => Ok(PeripheralState::Connected),
                false => Ok(PeripheralState::Disconnected),
            }
        }.boxed()
    }

    fn write<'a>(
        &'a self,
        data: &'a [u8],
        endpoint: EndpointIdentity,
        ack: WriteAck,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            let characteristic = self.find_characteristic(&endpoint)?;
            let write_type = match ack {
                WriteAck::WithResponse => WriteType::WithResponse,
                WriteAck::WithoutResponse => WriteType::WithoutResponse,
            };

            self.peripheral.write(&characteristic, data, write_type).await?;
            Ok(())
        }.boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            if self.peripheral.is_connected().await? {
                info!("Disconnecting from {}", self.id);
                self.peripheral.disconnect().await?;
            }
            Ok(())
        }.boxed()
    }
}

async fn close_link(printer: &BtlePrinter) {
    if let Err(err) = printer.disconnect().await {
        warn!("Failed to disconnect from {}: {}", printer.id, err);
    }
}

/// The [`Central`] backed by the platform bluetooth stack.
pub struct BtleCentral {
    manager: Arc<Manager>,
    // cancels the watchers of the previous activation
    watch_cancel: Mutex<Option<CancellationToken>>,
}

impl BtleCentral {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;

        Ok(BtleCentral {
            manager: Arc::new(manager),
            watch_cancel: Mutex::new(None),
        })
    }
}

impl Drop for BtleCentral {
    fn drop(&mut self) {
        if let Some(cancel) = self.watch_cancel.lock().unwrap_or_else(PoisonError::into_inner).take() {
            cancel.cancel();
        }
    }
}

fn adapter_availability(result: &Result<Vec<Adapter>, btleplug::Error>) -> Availability {
    match result {
        Ok(adapters) if adapters.is_empty() => Availability::Unavailable(UnavailabilityCause::NoAdapter),
        Ok(_) => Availability::Available,
        Err(btleplug::Error::PermissionDenied) => Availability::Unavailable(UnavailabilityCause::Unauthorized),
        Err(btleplug::Error::NotSupported(_)) => Availability::Unavailable(UnavailabilityCause::Unsupported),
        Err(_) => Availability::Unavailable(UnavailabilityCause::Unknown),
    }
}

async fn watch_adapters(manager: Arc<Manager>, cancel: CancellationToken, observer: Arc<dyn AvailabilityObserver>) {
    let mut previous: Option<Availability> = None;

    'mainloop: loop {
        let availability = adapter_availability(&manager.adapters().await);

        match (previous, availability) {
            (Some(Availability::Unavailable(old)), Availability::Unavailable(new)) if old != new => {
                observer.unavailability_cause_did_change(new);
            },
            (Some(old), new) if old == new => {},
            (_, new) => observer.availability_did_change(new),
        }
        previous = Some(availability);

        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            _ = sleep(Duration::from_millis(ADAPTER_POLL_DELAY)) => {},
        }
    }
}

async fn watch_disconnects(adapter: Adapter, cancel: CancellationToken, observer: Arc<dyn DisconnectObserver>) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(err) => {
            warn!("Failed to subscribe to adapter events: {}", err);
            return;
        },
    };

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            event = events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(id)) => {
                    observer.peripheral_did_disconnect(&PeripheralId::new(format!("{:?}", id)));
                },
                Some(_) => {},
                None => break 'mainloop,
            },
        }
    }
}

async fn start_scanning(adapters: &[Adapter], endpoint: &EndpointIdentity) -> Result<(), TransportError> {
    let filter = ScanFilter {
        services: vec![endpoint.service],
    };

    for adapter in adapters {
        debug!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(())
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

fn sighted_peripheral(event: CentralEvent) -> Option<BtlePeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
        CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// Peripherals advertising on any of `adapters`, tagged with the index of the adapter.
async fn subscribe_sightings(
    adapters: &[Adapter],
) -> Result<BoxStream<'static, (usize, BtlePeripheralId)>, TransportError> {
    let mut streams = Vec::new();

    for (index, adapter) in adapters.iter().enumerate() {
        let events = adapter.events().await?;
        let sightings = events.filter_map(move |event| async move {
            sighted_peripheral(event).map(|id| (index, id))
        });
        streams.push(sightings.boxed());
    }

    Ok(select_all(streams).boxed())
}

/// Collects sightings for `duration`, in the order they were first seen.
async fn collect_sightings<T: PartialEq>(mut sightings: BoxStream<'_, T>, duration: Duration) -> Vec<T> {
    let mut seen = Vec::new();
    let mut exhausted = false;
    let deadline = sleep(duration);
    tokio::pin!(deadline);

    'mainloop: loop {
        tokio::select! {
            _ = &mut deadline => {
                break 'mainloop;
            },
            sighting = sightings.next() => match sighting {
                Some(sighting) => {
                    if !seen.contains(&sighting) {
                        seen.push(sighting);
                    }
                },
                None => {
                    exhausted = true;
                    break 'mainloop;
                },
            },
        }
    }

    if exhausted {
        deadline.await;
    }
    seen
}

// btleplug keeps every peripheral it ever saw, only the ones sighted this round are reported
async fn find_printers(
    adapters: &[Adapter],
    sightings: Vec<(usize, BtlePeripheralId)>,
    endpoint: &EndpointIdentity,
) -> Vec<Discovery<BtlePrinter>> {
    let mut discoveries = Vec::new();

    for (index, id) in sightings {
        let adapter = match adapters.get(index) {
            Some(adapter) => adapter,
            None => continue,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripheral {:?}: {}", id, err);
                continue;
            },
        };

        match peripheral.properties().await {
            Err(err) => {
                warn!("Could not query peripheral for properties: {:?}", err);
            },
            Ok(None) => {
                debug!("Peripheral has no properties");
            },
            Ok(Some(properties)) => {
                // Some environments ignore the filter, so make sure to check the service uuid again
                if properties.services.contains(&endpoint.service) {
                    let printer = BtlePrinter::new(peripheral);
                    debug!(
                        "Discovered {} {} {:?}",
                        properties.address,
                        properties.local_name.as_deref().unwrap_or("NONE"),
                        properties.rssi,
                    );
                    discoveries.push(Discovery {
                        id: printer.id.clone(),
                        local_name: properties.local_name,
                        remote: printer,
                    });
                }
            },
        }
    }

    discoveries
}

async fn run_scan(
    manager: Arc<Manager>,
    endpoint: EndpointIdentity,
    params: ScanParams,
    mut events: Sender<ScanEvent<BtlePrinter>>,
) -> Result<(), futures::channel::mpsc::SendError> {
    let mut round: u32 = 0;

    loop {
        if params.max_rounds.is_some_and(|max_rounds| round >= max_rounds) {
            break;
        }
        round += 1;

        let adapters = match manager.adapters().await {
            Ok(adapters) if adapters.is_empty() => {
                events.send(ScanEvent::Failed(TransportError::NoAdapter)).await?;
                break;
            },
            Ok(adapters) => adapters,
            Err(err) => {
                events.send(ScanEvent::Failed(err.into())).await?;
                break;
            },
        };

        // subscribe before scanning so that no advertisement of this round is missed
        let sightings = match subscribe_sightings(&adapters).await {
            Ok(sightings) => sightings,
            Err(err) => {
                events.send(ScanEvent::Failed(err)).await?;
                break;
            },
        };

        if let Err(err) = start_scanning(&adapters, &endpoint).await {
            events.send(ScanEvent::Failed(err)).await?;
            break;
        }
        events.send(ScanEvent::Started).await?;

        let sighted = collect_sightings(sightings, params.duration).await;
        let discoveries = find_printers(&adapters, sighted, &endpoint).await;
        stop_scanning(&adapters).await;

        events.send(ScanEvent::Discovered(discoveries)).await?;
        events.send(ScanEvent::Stopped).await?;

        sleep(params.inter_round_delay).await;
        if events.is_closed() {
            break;
        }
    }

    Ok(())
}

async fn connect_peripheral(printer: &BtlePrinter, endpoint: &EndpointIdentity) -> Result<(), TransportError> {
    info!("Connecting to peripheral...");
    printer.peripheral.connect().await?;

    let result = async {
        info!("Connected; Discovering services...");
        printer.peripheral.discover_services().await?;

        let characteristic = printer.find_characteristic(endpoint)?;
        info!("Using characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        Ok::<(), TransportError>(())
    }.await;

    if result.is_err() {
        close_link(printer).await;
    }
    result
}

impl Central for BtleCentral {
    type Peripheral = BtlePrinter;

    fn activate(
        &self,
        endpoint: EndpointIdentity,
        availability: Arc<dyn AvailabilityObserver>,
        disconnects: Arc<dyn DisconnectObserver>,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            validate_endpoint(&endpoint)?;

            let adapters = self.manager.adapters().await?;
            if adapters.is_empty() {
                return Err(TransportError::NoAdapter);
            }

            let cancel = CancellationToken::new();
            let previous = self.watch_cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(cancel.clone());
            if let Some(previous) = previous {
                previous.cancel();
            }

            for adapter in adapters {
                spawn(watch_disconnects(adapter, cancel.clone(), disconnects.clone()));
            }
            spawn(watch_adapters(self.manager.clone(), cancel, availability));

            Ok(())
        }.boxed()
    }

    fn scan(&self, endpoint: EndpointIdentity, params: ScanParams) -> BoxStream<'static, ScanEvent<BtlePrinter>> {
        let (sender, receiver) = channel::<ScanEvent<BtlePrinter>>(16);
        let manager = self.manager.clone();

        spawn(async move {
            if run_scan(manager, endpoint, params, sender).await.is_err() {
                debug!("Scan stream dropped, stopping discovery rounds");
            }
        });

        receiver.boxed()
    }

    fn connect(
        &self,
        discovery: Discovery<BtlePrinter>,
        endpoint: EndpointIdentity,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<BtlePrinter, TransportError>> {
        async move {
            let printer = discovery.remote;

            let result = tokio::select! {
                _ = sleep(timeout) => None,
                result = connect_peripheral(&printer, &endpoint) => Some(result),
            };

            match result {
                Some(result) => result.map(|_| printer),
                None => {
                    warn!("Connecting to {} took too long", printer.id);
                    close_link(&printer).await;
                    Err(TransportError::Timeout("connecting"))
                },
            }
        }.boxed()
    }
}
