use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::constants::{DISCONNECT_DEADLINE, READY_POLL_DELAY};
use crate::device::state::{SessionState, Transition};
use crate::device::transport::{AvailabilityObserver, Central, DisconnectObserver, RemotePeripheral};
use crate::device::types::{
    Availability, Discovery, EndpointIdentity, LinkPhase, PeripheralId, PeripheralState, ScanEvent, SessionEvent,
    SessionSettings, UnavailabilityCause, WriteAck,
};
use crate::error::{SessionError, TransportError, WriteError};
use crate::payload::hex::decode_hex;
use crate::payload::{LINE_FEED, TAB};

/// Everything that can change the session state. All of it is handled by one task, in order.
enum SessionMessage<P> {
    Availability(Availability),
    UnavailabilityCause(UnavailabilityCause),
    Scan { cycle: u64, event: ScanEvent<P> },
    ConnectCompleted { candidate: PeripheralId, result: Result<(P, PeripheralState), TransportError> },
    Disconnected(PeripheralId),
    LinkChecked { peripheral: PeripheralId, connected: bool },
}

/// Forwards transport callbacks into the session event loop.
struct SessionObserver<P> {
    sender: UnboundedSender<SessionMessage<P>>,
}

impl<P> SessionObserver<P> {
    fn forward(&self, message: SessionMessage<P>) {
        if self.sender.unbounded_send(message).is_err() {
            debug!("Session event loop has stopped, dropping transport event");
        }
    }
}

impl<P: Send> AvailabilityObserver for SessionObserver<P> {
    fn availability_did_change(&self, availability: Availability) {
        self.forward(SessionMessage::Availability(availability));
    }

    fn unavailability_cause_did_change(&self, cause: UnavailabilityCause) {
        self.forward(SessionMessage::UnavailabilityCause(cause));
    }
}

impl<P: Send> DisconnectObserver for SessionObserver<P> {
    fn peripheral_did_disconnect(&self, peripheral: &PeripheralId) {
        self.forward(SessionMessage::Disconnected(peripheral.clone()));
    }
}

struct SessionInner<C: Central> {
    central: C,
    settings: SessionSettings,
    endpoint: Mutex<EndpointIdentity>,
    state: Mutex<SessionState<C::Peripheral>>,
    subscribers: Mutex<Vec<UnboundedSender<SessionEvent>>>,
    sender: UnboundedSender<SessionMessage<C::Peripheral>>,
    receiver: Mutex<Option<UnboundedReceiver<SessionMessage<C::Peripheral>>>>,
    // this token is cancelled by stop()
    cancel: CancellationToken,
    scan_cancel: Mutex<Option<CancellationToken>>,
}

/// Keeps a single printer connected and writes to it.
///
/// Discovery, connecting and reconnecting happen in the background once [`Session::start`] has
/// activated the transport. Writes while no printer is ready are dropped with
/// [`WriteError::NotReady`].
pub struct Session<C: Central> {
    inner: Arc<SessionInner<C>>,
}

impl<C: Central> Clone for Session<C> {
    fn clone(&self) -> Self {
        Session { inner: self.inner.clone() }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn release<P: RemotePeripheral>(remote: P) {
    tokio::select! {
        _ = sleep(Duration::from_millis(DISCONNECT_DEADLINE)) => {
            warn!("Disconnecting from printer {} took too long", remote.id());
        }
        result = remote.disconnect() => {
            if let Err(err) = result {
                warn!("Failed to disconnect from printer {}: {}", remote.id(), err);
            }
        }
    }
}

impl<C: Central> Session<C> {
    pub fn new(central: C, settings: SessionSettings) -> Self {
        let (sender, receiver) = unbounded();

        let inner = SessionInner {
            central,
            settings,
            endpoint: Mutex::new(EndpointIdentity::default()),
            state: Mutex::new(SessionState::new()),
            subscribers: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            scan_cancel: Mutex::new(None),
        };

        Session { inner: Arc::new(inner) }
    }

    /// Sets the printer endpoint. Takes effect on the next call to [`Session::start`].
    pub fn configure(&self, endpoint: EndpointIdentity) {
        *lock(&self.inner.endpoint) = endpoint;
    }

    /// Activates the transport with the configured endpoint.
    ///
    /// Scanning begins as soon as the transport reports its availability. A failed activation
    /// leaves the session idle, `start` may simply be called again.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.spawn_event_loop();

        let endpoint = *lock(&self.inner.endpoint);
        let observer = Arc::new(SessionObserver { sender: self.inner.sender.clone() });

        info!("Activating transport for service {} characteristic {}", endpoint.service, endpoint.characteristic);
        // the transport may report availability before activate() returns
        lock(&self.inner.state).set_endpoint(endpoint);

        match self.inner.central.activate(endpoint, observer.clone(), observer).await {
            Ok(()) => Ok(()),
            Err(source) => {
                warn!("Activating transport failed: {}", source);
                Err(SessionError::TransportInit { source })
            },
        }
    }

    /// Stops the event loop and any running scan and closes the link to the bound printer.
    ///
    /// Writes fail with [`WriteError::NotReady`] afterwards. The session can not be started
    /// again.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let bound = lock(&self.inner.state).shutdown();
        if let Some(remote) = bound {
            info!("Disconnecting from printer {}", remote.id());
            release(remote).await;
        }
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.inner.state).is_ready()
    }

    pub fn phase(&self) -> LinkPhase {
        lock(&self.inner.state).phase()
    }

    pub fn connected_peripheral(&self) -> Option<PeripheralId> {
        lock(&self.inner.state).connected_id()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = unbounded();
        lock(&self.inner.subscribers).push(sender);
        receiver
    }

    /// Waits until a printer is ready, returns `false` if that did not happen within `deadline`.
    pub async fn wait_ready(&self, deadline: Duration) -> bool {
        let poll = async {
            while !self.is_ready() {
                sleep(Duration::from_millis(READY_POLL_DELAY)).await;
            }
        };

        tokio::select! {
            _ = sleep(deadline) => self.is_ready(),
            _ = poll => true,
        }
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), WriteError> {
        let writable = lock(&self.inner.state).writable();

        let (remote, endpoint) = match writable {
            Some(v) => v,
            None => {
                debug!("Printer not ready, dropping {} bytes", data.len());
                return Err(WriteError::NotReady);
            },
        };

        let fut = remote.write(data, endpoint, WriteAck::WithResponse);

        tokio::select! {
            _ = sleep(self.inner.settings.write_deadline) => {
                warn!("Writing to printer {} took too long", remote.id());
                Err(WriteError::Timeout)
            }
            result = fut => {
                if let Err(err) = &result {
                    warn!("Failed to write to printer {}: {}", remote.id(), err);
                }
                result.map_err(WriteError::from)
            }
        }
    }

    /// Prints `line` followed by a line feed.
    pub async fn print_line(&self, line: &str) -> Result<(), WriteError> {
        self.write(line.as_bytes()).await?;
        self.write(&[LINE_FEED]).await
    }

    /// Sends `text` without a terminator, the printer keeps it in its line buffer.
    pub async fn print_to_buffer(&self, text: &str) -> Result<(), WriteError> {
        self.write(text.as_bytes()).await
    }

    pub async fn print_tab(&self) -> Result<(), WriteError> {
        self.write(&[TAB]).await
    }

    pub async fn print_line_feed(&self) -> Result<(), WriteError> {
        self.write(&[LINE_FEED]).await
    }

    /// Sends raw bytes given as a hex string, such as printer commands.
    pub async fn print_hex(&self, hex: &str) -> Result<(), WriteError> {
        let data = decode_hex(hex)?;
        self.write(&data).await
    }

    fn spawn_event_loop(&self) {
        let receiver = match lock(&self.inner.receiver).take() {
            Some(receiver) => receiver,
            None => return,
        };

        let session = self.clone();
        spawn(async move {
            session.run_event_loop(receiver).await;
        });
    }

    async fn run_event_loop(&self, mut receiver: UnboundedReceiver<SessionMessage<C::Peripheral>>) {
        let cancel = self.inner.cancel.clone();

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(message) = receiver.next() => {
                    let previous_phase = self.phase();
                    self.handle_message(message);
                    let phase = self.phase();

                    if phase != previous_phase {
                        debug!("Link phase {:?} -> {:?}", previous_phase, phase);
                        self.publish(SessionEvent::StateChange(phase));
                    }
                },
            }
        }

        if let Some(scan_cancel) = lock(&self.inner.scan_cancel).take() {
            scan_cancel.cancel();
        }
        info!("Session stopped");
    }

    fn handle_message(&self, message: SessionMessage<C::Peripheral>) {
        match message {
            SessionMessage::Availability(availability) => {
                match availability {
                    Availability::Available => info!("Bluetooth available"),
                    Availability::Unavailable(cause) => warn!("Bluetooth unavailable: {:?}", cause),
                }
                // any availability signal restarts discovery, also the unavailable ones
                self.start_scan_cycle();
            },
            SessionMessage::UnavailabilityCause(cause) => {
                warn!("Bluetooth unavailable: {:?}", cause);
                self.start_scan_cycle();
            },
            SessionMessage::Scan { cycle, event } => {
                if !lock(&self.inner.state).is_current_cycle(cycle) {
                    debug!("Ignoring event of superseded scan cycle {}", cycle);
                    return;
                }
                self.handle_scan_event(event);
            },
            SessionMessage::ConnectCompleted { candidate, result } => {
                let outcome = match result {
                    Ok(outcome) => Some(outcome),
                    Err(source) => {
                        warn!("Connecting to printer {} failed: {}", candidate, source);
                        self.publish_error(SessionError::Connect { peripheral: candidate.to_string(), source });
                        None
                    },
                };
                let unused = lock(&self.inner.state).connect_completed(&candidate, outcome);
                self.spawn_release(unused);
            },
            SessionMessage::Disconnected(peripheral) => {
                lock(&self.inner.state).disconnected(&peripheral, self.inner.settings.disconnect_policy);
            },
            SessionMessage::LinkChecked { peripheral, connected } => {
                lock(&self.inner.state).link_checked(&peripheral, connected);
            },
        }
    }

    fn handle_scan_event(&self, event: ScanEvent<C::Peripheral>) {
        match event {
            ScanEvent::Started => {
                debug!("Scanning");
                lock(&self.inner.state).scan_started();
            },
            ScanEvent::Stopped => {
                debug!("Scan round stopped");
            },
            ScanEvent::Failed(source) => {
                warn!("Scanning failed: {}", source);
                self.publish_error(SessionError::Scan { source });
            },
            ScanEvent::Discovered(batch) => {
                let transition = lock(&self.inner.state).discovered(batch, self.inner.settings.readiness_probe);

                match transition {
                    Some(Transition::Connect(candidate)) => {
                        // publish CandidateFound before moving on to Connecting
                        self.publish(SessionEvent::StateChange(LinkPhase::CandidateFound));
                        self.spawn_connect(candidate);
                    },
                    Some(Transition::QueryLink(remote)) => self.spawn_link_query(remote),
                    None => {},
                }
            },
        }
    }

    fn start_scan_cycle(&self) {
        let endpoint = {
            let mut state = lock(&self.inner.state);
            match state.endpoint() {
                Some(endpoint) => Some((state.begin_scan_cycle(), endpoint)),
                None => None,
            }
        };

        let (cycle, endpoint) = match endpoint {
            Some(v) => v,
            None => {
                warn!("Transport reported availability before the session was started, not scanning");
                return;
            },
        };

        let cancel = self.inner.cancel.child_token();
        if let Some(previous) = lock(&self.inner.scan_cancel).replace(cancel.clone()) {
            previous.cancel();
        }

        let mut stream = self.inner.central.scan(endpoint, self.inner.settings.scan);
        let sender = self.inner.sender.clone();

        info!("Starting scan cycle {}", cycle);
        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = stream.next() => match event {
                        Some(event) => {
                            if sender.unbounded_send(SessionMessage::Scan { cycle, event }).is_err() {
                                break 'mainloop;
                            }
                        },
                        None => {
                            debug!("Scan cycle {} finished", cycle);
                            break 'mainloop;
                        },
                    },
                }
            }
        });
    }

    fn spawn_connect(&self, candidate: Discovery<C::Peripheral>) {
        let id = candidate.id.clone();
        let endpoint = {
            let mut state = lock(&self.inner.state);
            state.connecting(&id);
            state.endpoint().unwrap_or_default()
        };

        let timeout = self.inner.settings.connect_timeout;
        let remote = candidate.remote.clone();
        let fut = self.inner.central.connect(candidate, endpoint, timeout);
        let sender = self.inner.sender.clone();
        let cancel = self.inner.cancel.clone();

        info!("Connecting to printer {}...", id);
        spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => None,
                _ = sleep(timeout) => Some(Err(TransportError::Timeout("connecting"))),
                result = fut => Some(match result {
                    Ok(remote) => match remote.state().await {
                        Ok(state) => Ok((remote, state)),
                        Err(err) => Err(err),
                    },
                    Err(err) => Err(err),
                }),
            };

            match result {
                None => release(remote).await,
                Some(result) => {
                    let failed = result.is_err();
                    let _ = sender.unbounded_send(SessionMessage::ConnectCompleted { candidate: id, result });
                    // a half open link may be left behind
                    if failed {
                        release(remote).await;
                    }
                },
            }
        });
    }

    fn spawn_release(&self, remotes: Vec<C::Peripheral>) {
        for remote in remotes {
            info!("Releasing printer {}", remote.id());
            spawn(release(remote));
        }
    }

    fn spawn_link_query(&self, remote: C::Peripheral) {
        let deadline = self.inner.settings.is_connected_deadline;
        let sender = self.inner.sender.clone();

        spawn(async move {
            let connected = tokio::select! {
                _ = sleep(deadline) => {
                    warn!("Checking for connection status took too long");
                    false
                }
                result = remote.state() => match result {
                    Ok(state) => state == PeripheralState::Connected,
                    Err(err) => {
                        warn!("Error checking for connection state: {}", err);
                        false
                    },
                },
            };

            let _ = sender.unbounded_send(SessionMessage::LinkChecked { peripheral: remote.id(), connected });
        });
    }

    fn publish(&self, event: SessionEvent) {
        lock(&self.inner.subscribers).retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }

    fn publish_error(&self, error: SessionError) {
        self.publish(SessionEvent::Error(Arc::new(error)));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use futures::future::{BoxFuture, FutureExt};
    use futures::stream::{self, BoxStream};

    use super::*;
    use crate::device::state::tests::{FakePeripheral, FakeWrite};
    use crate::device::types::ScanParams;

    type Observers = (Arc<dyn AvailabilityObserver>, Arc<dyn DisconnectObserver>);
    type ScanScript = Vec<ScanEvent<FakePeripheral>>;

    fn round(batch: Vec<Discovery<FakePeripheral>>) -> ScanScript {
        vec![ScanEvent::Started, ScanEvent::Discovered(batch), ScanEvent::Stopped]
    }

    #[derive(Default)]
    struct FakeCentral {
        fail_activation: bool,
        fail_connect: bool,
        observers: Arc<Mutex<Option<Observers>>>,
        scans: Mutex<VecDeque<ScanScript>>,
        scan_count: Arc<Mutex<usize>>,
        connect_attempts: Arc<Mutex<Vec<PeripheralId>>>,
    }

    impl FakeCentral {
        fn with_scans(scans: Vec<ScanScript>) -> Self {
            FakeCentral { scans: Mutex::new(scans.into()), ..Default::default() }
        }

        fn with_batches(batches: Vec<Vec<Discovery<FakePeripheral>>>) -> Self {
            Self::with_scans(batches.into_iter().map(round).collect())
        }
    }

    impl Central for FakeCentral {
        type Peripheral = FakePeripheral;

        fn activate(
            &self,
            _endpoint: EndpointIdentity,
            availability: Arc<dyn AvailabilityObserver>,
            disconnects: Arc<dyn DisconnectObserver>,
        ) -> BoxFuture<'_, Result<(), TransportError>> {
            async move {
                if self.fail_activation {
                    return Err(TransportError::NoAdapter);
                }
                *self.observers.lock().unwrap() = Some((availability, disconnects));
                Ok(())
            }.boxed()
        }

        fn scan(&self, _endpoint: EndpointIdentity, _params: ScanParams) -> BoxStream<'static, ScanEvent<FakePeripheral>> {
            *self.scan_count.lock().unwrap() += 1;
            let events = self.scans.lock().unwrap().pop_front().unwrap_or_else(|| round(vec![]));

            stream::iter(events).chain(stream::pending()).boxed()
        }

        fn connect(
            &self,
            discovery: Discovery<FakePeripheral>,
            _endpoint: EndpointIdentity,
            _timeout: Duration,
        ) -> BoxFuture<'static, Result<FakePeripheral, TransportError>> {
            self.connect_attempts.lock().unwrap().push(discovery.id.clone());
            let fail = self.fail_connect;

            async move {
                if fail {
                    return Err(TransportError::Timeout("connecting"));
                }
                Ok(discovery.remote)
            }.boxed()
        }
    }

    fn observers(central: &Arc<Mutex<Option<Observers>>>) -> Observers {
        central.lock().unwrap().clone().expect("session did not register observers")
    }

    async fn wait_for(condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_failed_start_is_not_ready() {
        let central = FakeCentral { fail_activation: true, ..Default::default() };
        let session = Session::new(central, SessionSettings::default());

        let result = session.start().await;

        assert!(matches!(result, Err(SessionError::TransportInit { .. })));
        assert!(!session.is_ready());
        assert!(session.write(b"hello").await.unwrap_err().is_not_ready());
        assert!(session.print_line("hello").await.unwrap_err().is_not_ready());
        assert!(session.print_tab().await.unwrap_err().is_not_ready());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_connects_to_first_discovery() {
        let a = FakePeripheral::new("A");
        let b = FakePeripheral::new("B");
        let central = FakeCentral::with_batches(vec![vec![a.discovery(), b.discovery()]]);
        let observers_slot = central.observers.clone();
        let attempts = central.connect_attempts.clone();
        let session = Session::new(central, SessionSettings::default());
        let mut events = session.subscribe();

        session.start().await.unwrap();
        assert!(!session.is_ready());
        observers(&observers_slot).0.availability_did_change(Availability::Available);

        assert!(session.wait_ready(Duration::from_secs(2)).await);
        assert_eq!(session.connected_peripheral(), Some(a.id.clone()));
        assert_eq!(*attempts.lock().unwrap(), vec![a.id.clone()]);

        let mut phases = Vec::new();
        while let Ok(Some(SessionEvent::StateChange(phase))) = events.try_next() {
            phases.push(phase);
        }
        assert_eq!(phases.first(), Some(&LinkPhase::Scanning));
        assert_eq!(phases.last(), Some(&LinkPhase::Connected));
        assert!(phases.contains(&LinkPhase::Connecting));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_writes_reach_printer() {
        let a = FakePeripheral::new("A");
        let central = FakeCentral::with_batches(vec![vec![a.discovery()]]);
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        session.print_line("Total").await.unwrap();
        session.print_tab().await.unwrap();
        session.print_to_buffer("12").await.unwrap();
        session.print_line_feed().await.unwrap();
        session.print_hex("1B40").await.unwrap();
        assert!(matches!(session.print_hex("1B4").await, Err(WriteError::InvalidHex { .. })));

        let writes = a.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![
            b"Total".to_vec(),
            vec![LINE_FEED],
            vec![TAB],
            b"12".to_vec(),
            vec![LINE_FEED],
            vec![0x1B, 0x40],
        ]);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_bound_printer() {
        let p = FakePeripheral::new("P");
        let central = FakeCentral::with_batches(vec![vec![p.discovery()], vec![]]);
        let observers_slot = central.observers.clone();
        let attempts = central.connect_attempts.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        let (availability, _) = observers(&observers_slot);
        availability.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        // the unavailable signal also triggers a rescan, which finds nothing new
        availability.availability_did_change(Availability::Unavailable(UnavailabilityCause::PoweredOff));
        sleep(Duration::from_millis(100)).await;

        assert!(session.is_ready());
        assert_eq!(session.connected_peripheral(), Some(p.id.clone()));
        assert_eq!(attempts.lock().unwrap().len(), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_clears_readiness() {
        let p = FakePeripheral::new("P");
        let central = FakeCentral::with_batches(vec![vec![p.discovery()]]);
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        let (availability, disconnects) = observers(&observers_slot);
        availability.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        disconnects.peripheral_did_disconnect(&p.id);

        assert!(wait_for(|| !session.is_ready()).await);
        assert_eq!(session.connected_peripheral(), None);
        assert!(session.print_line("lost").await.unwrap_err().is_not_ready());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error() {
        let a = FakePeripheral::new("A");
        let central = FakeCentral {
            fail_connect: true,
            ..FakeCentral::with_batches(vec![vec![a.discovery()]])
        };
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());
        let mut events = session.subscribe();

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);

        assert!(wait_for(|| session.phase() == LinkPhase::Disconnected).await);
        assert!(!session.is_ready());
        assert!(wait_for(|| a.disconnect_count() == 1).await);

        let mut saw_error = false;
        while let Ok(Some(event)) = events.try_next() {
            if let SessionEvent::Error(err) = event {
                saw_error = matches!(*err, SessionError::Connect { .. });
            }
        }
        assert!(saw_error);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_write_error_keeps_session_ready() {
        let mut a = FakePeripheral::new("A");
        a.write_mode = FakeWrite::Fail;
        let central = FakeCentral::with_batches(vec![vec![a.discovery()]]);
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        let err = session.print_to_buffer("12").await.unwrap_err();

        assert!(matches!(err, WriteError::Transport { source: TransportError::MissingCharacteristic }));
        assert!(session.is_ready());
        assert_eq!(session.connected_peripheral(), Some(a.id.clone()));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_slow_write_times_out() {
        let mut a = FakePeripheral::new("A");
        a.write_mode = FakeWrite::Hang;
        let central = FakeCentral::with_batches(vec![vec![a.discovery()]]);
        let observers_slot = central.observers.clone();
        let settings = SessionSettings { write_deadline: Duration::from_millis(50), ..SessionSettings::default() };
        let session = Session::new(central, settings);

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        assert!(matches!(session.print_tab().await, Err(WriteError::Timeout)));
        assert!(session.is_ready());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_scan_failure_reports_error() {
        let central = FakeCentral::with_scans(vec![vec![ScanEvent::Failed(TransportError::NoAdapter)]]);
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());
        let mut events = session.subscribe();

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);

        let event = tokio::time::timeout(Duration::from_secs(2), events.next()).await.unwrap();
        match event {
            Some(SessionEvent::Error(err)) => {
                assert!(matches!(*err, SessionError::Scan { source: TransportError::NoAdapter }));
            },
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.phase(), LinkPhase::Idle);
        assert!(!session.is_ready());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_unavailability_cause_starts_scan() {
        let a = FakePeripheral::new("A");
        let central = FakeCentral::with_batches(vec![vec![a.discovery()]]);
        let observers_slot = central.observers.clone();
        let scan_count = central.scan_count.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        let (availability, _) = observers(&observers_slot);

        availability.unavailability_cause_did_change(UnavailabilityCause::PoweredOff);
        assert!(session.wait_ready(Duration::from_secs(2)).await);
        assert_eq!(*scan_count.lock().unwrap(), 1);

        availability.unavailability_cause_did_change(UnavailabilityCause::Unauthorized);
        assert!(wait_for(|| *scan_count.lock().unwrap() == 2).await);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_printer() {
        let a = FakePeripheral::new("A");
        let central = FakeCentral::with_batches(vec![vec![a.discovery()]]);
        let observers_slot = central.observers.clone();
        let session = Session::new(central, SessionSettings::default());

        session.start().await.unwrap();
        observers(&observers_slot).0.availability_did_change(Availability::Available);
        assert!(session.wait_ready(Duration::from_secs(2)).await);

        session.stop().await;

        assert!(!session.is_ready());
        assert_eq!(session.connected_peripheral(), None);
        assert!(session.print_line("late").await.unwrap_err().is_not_ready());
        assert_eq!(a.disconnect_count(), 1);
        assert!(a.writes.lock().unwrap().is_empty());
    }
}
