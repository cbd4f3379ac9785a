//! HDLC link layer
//!
//! `HdlcLayer` owns the link state machine for one session. It performs no
//! I/O itself: encoded frames leave through the outbound channel returned by
//! [`HdlcLayer::new`], and received bytes are fed in with
//! [`HdlcLayer::handle_bytes`]. Upward notifications arrive as [`LinkEvent`]s.
//!
//! Every wait (SNRM/UA, DISC/UA, I-frame acknowledgement) is a one-shot
//! completion plus a timer task. Timers carry a generation number, so a
//! timer that fires after its operation finished is ignored.
//!
//! Methods that process frames may arm timers and therefore must be called
//! from within a Tokio runtime.

use crate::hdlc::address::HdlcAddress;
use crate::hdlc::config::HdlcConfig;
use crate::hdlc::frame::{FrameType, HdlcFrame};
use crate::hdlc::parameters::LinkParameters;
use crate::hdlc::reader::FrameReader;
use crate::hdlc::state::LinkState;
use crate::hdlc::statistics::HdlcStatistics;
use crate::hdlc::window::{ReceiveWindow, SendWindow};
use bytes::{Bytes, BytesMut};
use dlms_core::{ChecksumKind, DlmsError, DlmsResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Notification delivered to the layer above
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// A complete (reassembled) information payload
    Data(Bytes),
    /// An inbound frame was dropped
    FrameRejected { reason: String },
}

/// Receiving ends of the channels a link writes to
#[derive(Debug)]
pub struct LinkChannels {
    /// Encoded frames for the transport
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

type Completion = oneshot::Sender<DlmsResult<()>>;
type Shared = Arc<Mutex<LinkInner>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKey {
    Handshake,
    Frame(u8),
    Inactivity,
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    task: JoinHandle<()>,
}

impl Timer {
    fn cancel(&self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeKind {
    Connect,
    Disconnect,
}

#[derive(Debug)]
struct Handshake {
    kind: HandshakeKind,
    completion: Completion,
    timer: Timer,
}

#[derive(Debug)]
struct Outgoing {
    payload: Bytes,
    segmented: bool,
    /// Set on the last segment of a `send_data` call
    completion: Option<Completion>,
}

impl Outgoing {
    fn fail(self, error: DlmsError) {
        if let Some(completion) = self.completion {
            let _ = completion.send(Err(error));
        }
    }
}

#[derive(Debug)]
struct InFlight {
    outgoing: Outgoing,
    timer: Timer,
}

struct LinkInner {
    config: HdlcConfig,
    parameters: LinkParameters,
    state: LinkState,
    send_window: SendWindow<InFlight>,
    receive_window: ReceiveWindow,
    backlog: VecDeque<Outgoing>,
    remote_busy: bool,
    handshake: Option<Handshake>,
    inactivity: Option<Timer>,
    reader: FrameReader,
    last_rx: Option<Instant>,
    reassembly: BytesMut,
    statistics: HdlcStatistics,
    next_generation: u64,
    outbound: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedSender<LinkEvent>,
    this: Weak<Mutex<LinkInner>>,
}

fn lock(shared: &Mutex<LinkInner>) -> MutexGuard<'_, LinkInner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HDLC link state machine for one session
///
/// Cloning yields another handle to the same link.
#[derive(Clone)]
pub struct HdlcLayer {
    inner: Shared,
}

impl HdlcLayer {
    /// Create a disconnected link
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the configuration does not validate
    pub fn new(config: HdlcConfig) -> DlmsResult<(Self, LinkChannels)> {
        config.validate()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let send_window = SendWindow::new(config.window_size)?;
        let parameters = LinkParameters::from_config(&config);
        let reader = FrameReader::new(config.max_info_length as usize * 2 + 64);

        let inner = Arc::new_cyclic(|this| {
            Mutex::new(LinkInner {
                config,
                parameters,
                state: LinkState::Disconnected,
                send_window,
                receive_window: ReceiveWindow::new(),
                backlog: VecDeque::new(),
                remote_busy: false,
                handshake: None,
                inactivity: None,
                reader,
                last_rx: None,
                reassembly: BytesMut::new(),
                statistics: HdlcStatistics::new(),
                next_generation: 0,
                outbound: outbound_tx,
                events: events_tx,
                this: this.clone(),
            })
        });

        Ok((
            Self { inner },
            LinkChannels {
                outbound: outbound_rx,
                events: events_rx,
            },
        ))
    }

    /// Establish the link: send SNRM and wait for UA
    ///
    /// # Errors
    ///
    /// * `InvalidState` unless the link is `Disconnected`
    /// * `ResponseTimeout` if no UA arrives within the response timeout
    /// * `UnexpectedResponse` if the peer answers with DM
    pub async fn connect(&self) -> DlmsResult<()> {
        let done = lock(&self.inner).start_handshake(HandshakeKind::Connect)?;
        done.await.map_err(|_| DlmsError::ConnectionClosed)?
    }

    /// Release the link: send DISC and wait for UA
    ///
    /// The link ends up `Disconnected` whether or not the peer answers.
    pub async fn disconnect(&self) -> DlmsResult<()> {
        let done = lock(&self.inner).start_handshake(HandshakeKind::Disconnect)?;
        done.await.map_err(|_| DlmsError::ConnectionClosed)?
    }

    /// Send a payload in one or more I-frames
    ///
    /// Payloads longer than the negotiated maximum information length are
    /// segmented. Resolves once the peer acknowledged every segment.
    ///
    /// # Errors
    ///
    /// * `InvalidState` unless the link is `Connected`
    /// * `ResponseTimeout` if a segment is not acknowledged in time
    /// * `ConnectionClosed` if the link goes down first
    pub async fn send_data(&self, data: Bytes) -> DlmsResult<()> {
        let done = lock(&self.inner).enqueue(data)?;
        done.await.map_err(|_| DlmsError::ConnectionClosed)?
    }

    /// Feed raw bytes received from the transport
    pub fn handle_bytes(&self, data: &[u8]) {
        lock(&self.inner).handle_bytes(data);
    }

    /// Process one decoded frame
    pub fn handle_frame(&self, frame: HdlcFrame) {
        lock(&self.inner).handle_frame(frame);
    }

    pub fn state(&self) -> LinkState {
        lock(&self.inner).state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_ready()
    }

    /// V(A): advances by one for every acknowledged I-frame
    pub fn send_sequence(&self) -> u8 {
        lock(&self.inner).send_window.acknowledged_sequence()
    }

    /// V(R): advances by one for every accepted I-frame
    pub fn receive_sequence(&self) -> u8 {
        lock(&self.inner).receive_window.expected_sequence()
    }

    /// Parameters in effect (negotiated once connected)
    pub fn parameters(&self) -> LinkParameters {
        lock(&self.inner).parameters
    }

    pub fn statistics(&self) -> HdlcStatistics {
        lock(&self.inner).statistics.clone()
    }

    pub fn config(&self) -> HdlcConfig {
        lock(&self.inner).config.clone()
    }
}

impl LinkInner {
    fn local(&self) -> HdlcAddress {
        self.config.local_address
    }

    fn remote(&self) -> HdlcAddress {
        self.config.remote_address
    }

    fn set_state(&mut self, new_state: LinkState) {
        if let Err(e) = self.state.validate_transition(new_state) {
            log::warn!("{}", e);
        }
        if self.state != new_state {
            log::debug!("HDLC link {} -> {}", self.state, new_state);
        }
        self.state = new_state;
    }

    fn emit(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Link event receiver dropped");
        }
    }

    fn transmit(&mut self, frame: &HdlcFrame) {
        log::trace!("HDLC TX {}", frame);
        self.statistics.frames_sent += 1;
        if self.outbound.send(frame.encode()).is_err() {
            log::debug!("Outbound channel closed, dropping {}", frame);
        }
    }

    fn unnumbered(&self, frame_type: FrameType, payload: Bytes) -> HdlcFrame {
        HdlcFrame::unnumbered(frame_type, self.remote(), self.local(), payload)
    }

    fn supervisory(&self, frame_type: FrameType) -> HdlcFrame {
        HdlcFrame::supervisory(
            frame_type,
            self.remote(),
            self.local(),
            self.receive_window.expected_sequence(),
        )
    }

    fn arm_timer(&mut self, key: TimerKey, duration: Duration) -> Timer {
        self.next_generation += 1;
        let generation = self.next_generation;
        let this = self.this.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(shared) = this.upgrade() {
                lock(&shared).on_timer(key, generation);
            }
        });
        Timer { generation, task }
    }

    fn touch_inactivity(&mut self) {
        if let Some(timer) = self.inactivity.take() {
            timer.cancel();
        }
        if self.state.is_ready() {
            if let Some(timeout) = self.config.inactivity_timeout() {
                self.inactivity = Some(self.arm_timer(TimerKey::Inactivity, timeout));
            }
        }
    }

    fn start_handshake(
        &mut self,
        kind: HandshakeKind,
    ) -> DlmsResult<oneshot::Receiver<DlmsResult<()>>> {
        match kind {
            HandshakeKind::Connect => {
                if self.state != LinkState::Disconnected {
                    return Err(DlmsError::InvalidState(format!(
                        "connect() requires a disconnected link, link is {}",
                        self.state
                    )));
                }
                self.set_state(LinkState::Connecting);
                let proposal = LinkParameters::from_config(&self.config).encode();
                let snrm = self.unnumbered(FrameType::SetNormalResponseMode, proposal);
                self.transmit(&snrm);
            }
            HandshakeKind::Disconnect => {
                if self.state != LinkState::Connected {
                    return Err(DlmsError::InvalidState(format!(
                        "disconnect() requires a connected link, link is {}",
                        self.state
                    )));
                }
                self.set_state(LinkState::Disconnecting);
                let disc = self.unnumbered(FrameType::Disconnect, Bytes::new());
                self.transmit(&disc);
            }
        }
        let (completion, done) = oneshot::channel();
        let timer = self.arm_timer(TimerKey::Handshake, self.config.response_timeout());
        self.handshake = Some(Handshake {
            kind,
            completion,
            timer,
        });
        Ok(done)
    }

    fn enqueue(&mut self, data: Bytes) -> DlmsResult<oneshot::Receiver<DlmsResult<()>>> {
        if !self.state.is_ready() {
            return Err(DlmsError::InvalidState(format!(
                "send_data() requires a connected link, link is {}",
                self.state
            )));
        }
        let (completion, done) = oneshot::channel();
        let max = self.parameters.max_info_length_tx.max(1) as usize;
        let count = data.len().div_ceil(max).max(1);
        let mut completion = Some(completion);
        for index in 0..count {
            let start = index * max;
            let end = (start + max).min(data.len());
            let last = index + 1 == count;
            self.backlog.push_back(Outgoing {
                payload: data.slice(start..end),
                segmented: !last,
                completion: if last { completion.take() } else { None },
            });
        }
        if count > 1 {
            log::debug!("Segmenting {} bytes into {} I-frames", data.len(), count);
        }
        self.pump();
        Ok(done)
    }

    /// Move queued payloads into the send window while it has room
    fn pump(&mut self) {
        while self.state.is_ready() && !self.remote_busy && self.send_window.can_send() {
            let Some(outgoing) = self.backlog.pop_front() else {
                break;
            };
            let frame = HdlcFrame::information(
                self.remote(),
                self.local(),
                self.send_window.next_sequence(),
                self.receive_window.expected_sequence(),
                outgoing.payload.clone(),
            )
            .with_segmented(outgoing.segmented);
            self.transmit(&frame);
            let timer = self.arm_timer(
                TimerKey::Frame(frame.send_sequence),
                self.config.response_timeout(),
            );
            if let Err(e) = self.send_window.push(InFlight { outgoing, timer }) {
                log::error!("{}", e);
            }
        }
    }

    fn complete_acknowledged(&mut self, receive_sequence: u8) {
        for (ns, in_flight) in self.send_window.acknowledge(receive_sequence) {
            in_flight.timer.cancel();
            log::trace!("I-frame N(S)={} acknowledged", ns);
            if let Some(completion) = in_flight.outgoing.completion {
                let _ = completion.send(Ok(()));
            }
        }
    }

    fn fail_outstanding(&mut self, error: fn() -> DlmsError) {
        for (_, in_flight) in self.send_window.reset() {
            in_flight.timer.cancel();
            in_flight.outgoing.fail(error());
        }
        for outgoing in self.backlog.drain(..) {
            outgoing.fail(error());
        }
    }

    /// Tear down the session and land in `Disconnected`
    ///
    /// Emits `LinkEvent::Disconnected` only when leaving an established link.
    fn enter_disconnected(&mut self) {
        let was_connected = matches!(
            self.state,
            LinkState::Connected | LinkState::Disconnecting
        );
        self.set_state(LinkState::Disconnected);
        self.fail_outstanding(|| DlmsError::ConnectionClosed);
        if let Some(handshake) = self.handshake.take() {
            handshake.timer.cancel();
            let _ = handshake.completion.send(Err(DlmsError::ConnectionClosed));
        }
        if let Some(timer) = self.inactivity.take() {
            timer.cancel();
        }
        self.remote_busy = false;
        self.receive_window.reset();
        self.reassembly.clear();
        self.parameters = LinkParameters::from_config(&self.config);
        if was_connected {
            log::info!("HDLC link to {} disconnected", self.remote());
            self.emit(LinkEvent::Disconnected);
        }
    }

    fn establish(&mut self, peer: Option<&Bytes>) {
        let ours = LinkParameters::from_config(&self.config);
        self.parameters = match peer.filter(|p| !p.is_empty()) {
            Some(raw) => match LinkParameters::decode(raw) {
                Ok(theirs) => ours.negotiate(&theirs),
                Err(e) => {
                    log::warn!("Ignoring malformed link parameters: {}", e);
                    ours
                }
            },
            None => ours,
        };
        if let Err(e) = self
            .send_window
            .set_window_size(self.parameters.window_size_tx)
        {
            log::warn!("{}", e);
        }
        self.fail_outstanding(|| DlmsError::ConnectionClosed);
        self.receive_window.reset();
        self.reassembly.clear();
        self.remote_busy = false;
        self.set_state(LinkState::Connected);
        self.touch_inactivity();
        log::info!(
            "HDLC link to {} connected (info tx/rx {}/{}, window tx/rx {}/{})",
            self.remote(),
            self.parameters.max_info_length_tx,
            self.parameters.max_info_length_rx,
            self.parameters.window_size_tx,
            self.parameters.window_size_rx
        );
        self.emit(LinkEvent::Connected);
    }

    fn handle_bytes(&mut self, data: &[u8]) {
        let now = Instant::now();
        if let Some(last) = self.last_rx {
            if now.duration_since(last) > self.config.inter_frame_timeout()
                && self.reader.has_partial()
            {
                let dropped = self.reader.discard_partial();
                self.statistics.invalid_frames += 1;
                log::debug!("Inter-frame timeout, discarded {} bytes", dropped);
            }
        }
        self.last_rx = Some(now);
        self.reader.push(data);

        while let Some(raw) = self.reader.next_frame() {
            match HdlcFrame::decode(&raw) {
                Ok(frame) => self.handle_frame(frame),
                Err(e) => {
                    match &e {
                        DlmsError::ChecksumMismatch {
                            kind: ChecksumKind::Header,
                            ..
                        } => self.statistics.hcs_errors += 1,
                        DlmsError::ChecksumMismatch {
                            kind: ChecksumKind::Frame,
                            ..
                        } => self.statistics.fcs_errors += 1,
                        _ => self.statistics.invalid_frames += 1,
                    }
                    log::debug!("Dropping undecodable frame: {}", e);
                    self.emit(LinkEvent::FrameRejected {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: HdlcFrame) {
        self.statistics.frames_received += 1;
        log::trace!("HDLC RX {}", frame);
        if frame.destination != self.local() && !frame.destination.is_all_station() {
            self.statistics.frames_rejected += 1;
            log::debug!("Dropping frame for {} (we are {})", frame.destination, self.local());
            return;
        }
        self.touch_inactivity();

        match frame.frame_type {
            FrameType::Information => self.on_information(frame),
            FrameType::ReceiveReady
            | FrameType::ReceiveNotReady
            | FrameType::Reject => self.on_supervisory(&frame),
            FrameType::SetNormalResponseMode => self.on_snrm(&frame),
            FrameType::UnnumberedAcknowledge => self.on_ua(&frame),
            FrameType::DisconnectMode => self.on_dm(),
            FrameType::Disconnect => self.on_disc(),
            FrameType::FrameReject => {
                self.statistics.frames_rejected += 1;
                log::warn!("Peer rejected a frame (FRMR, {} info bytes)", frame.payload.len());
                self.emit(LinkEvent::FrameRejected {
                    reason: "FRMR received from peer".to_string(),
                });
            }
        }
    }

    /// A command frame arrived while no session exists
    fn refuse(&mut self, frame: &HdlcFrame) {
        self.statistics.frames_rejected += 1;
        log::debug!("Dropping {} while link is {}", frame, self.state);
        if self.state == LinkState::Disconnected {
            let dm = self.unnumbered(FrameType::DisconnectMode, Bytes::new());
            self.transmit(&dm);
        }
    }

    fn on_information(&mut self, frame: HdlcFrame) {
        if self.state != LinkState::Connected {
            self.refuse(&frame);
            return;
        }
        let (ns, nr) = (frame.send_sequence, frame.receive_sequence);
        if !self.send_window.is_valid_ack(nr) || !self.receive_window.is_expected(ns) {
            self.statistics.sequence_errors += 1;
            let reason = format!(
                "I-frame N(S)={} N(R)={} out of sequence (V(R)={}, V(A)={}, V(S)={})",
                ns,
                nr,
                self.receive_window.expected_sequence(),
                self.send_window.acknowledged_sequence(),
                self.send_window.next_sequence()
            );
            log::debug!("{}, sending REJ", reason);
            let rej = self.supervisory(FrameType::Reject);
            self.transmit(&rej);
            self.emit(LinkEvent::FrameRejected { reason });
            return;
        }

        self.complete_acknowledged(nr);
        if let Err(e) = self.receive_window.accept(ns) {
            log::error!("{}", e);
            return;
        }
        let rr = self.supervisory(FrameType::ReceiveReady);
        self.transmit(&rr);

        if frame.segmented {
            self.reassembly.extend_from_slice(&frame.payload);
            log::trace!("Buffered segment, {} bytes so far", self.reassembly.len());
        } else if self.reassembly.is_empty() {
            self.emit(LinkEvent::Data(frame.payload));
        } else {
            self.reassembly.extend_from_slice(&frame.payload);
            let data = self.reassembly.split().freeze();
            log::debug!("Reassembled {} bytes", data.len());
            self.emit(LinkEvent::Data(data));
        }
        self.pump();
    }

    fn on_supervisory(&mut self, frame: &HdlcFrame) {
        if self.state != LinkState::Connected {
            self.refuse(frame);
            return;
        }
        let nr = frame.receive_sequence;
        if !self.send_window.is_valid_ack(nr) {
            self.statistics.sequence_errors += 1;
            log::warn!(
                "{} N(R)={} outside window V(A)={} V(S)={}",
                frame.frame_type.as_str(),
                nr,
                self.send_window.acknowledged_sequence(),
                self.send_window.next_sequence()
            );
            return;
        }
        self.complete_acknowledged(nr);

        match frame.frame_type {
            FrameType::ReceiveNotReady => {
                log::debug!("Peer busy (RNR), holding {} queued frames", self.backlog.len());
                self.remote_busy = true;
            }
            FrameType::Reject => {
                self.remote_busy = false;
                self.retransmit_in_flight();
                self.pump();
            }
            _ => {
                self.remote_busy = false;
                self.pump();
            }
        }
    }

    /// Go-back-N: resend every unacknowledged frame in order
    fn retransmit_in_flight(&mut self) {
        let receive_sequence = self.receive_window.expected_sequence();
        let resend: Vec<HdlcFrame> = self
            .send_window
            .iter_mut()
            .map(|(ns, in_flight)| {
                HdlcFrame::information(
                    self.config.remote_address,
                    self.config.local_address,
                    *ns,
                    receive_sequence,
                    in_flight.outgoing.payload.clone(),
                )
                .with_segmented(in_flight.outgoing.segmented)
            })
            .collect();
        if resend.is_empty() {
            return;
        }
        log::debug!("REJ received, retransmitting {} frames", resend.len());

        let mut timers = Vec::with_capacity(resend.len());
        for frame in &resend {
            self.transmit(frame);
            self.statistics.retransmissions += 1;
            timers.push(self.arm_timer(
                TimerKey::Frame(frame.send_sequence),
                self.config.response_timeout(),
            ));
        }
        for ((_, in_flight), timer) in self.send_window.iter_mut().zip(timers) {
            let old = std::mem::replace(&mut in_flight.timer, timer);
            old.cancel();
        }
    }

    fn on_snrm(&mut self, frame: &HdlcFrame) {
        match self.state {
            LinkState::Connecting | LinkState::Disconnecting => {
                log::debug!("Ignoring SNRM while {}", self.state);
                return;
            }
            LinkState::Connected => log::info!("Peer re-initialised the link with SNRM"),
            LinkState::Disconnected => {}
        }
        // UA must reflect the negotiated values, so settle them first
        self.establish(Some(&frame.payload));
        let ua = self.unnumbered(FrameType::UnnumberedAcknowledge, self.parameters.encode());
        self.transmit(&ua);
    }

    fn on_ua(&mut self, frame: &HdlcFrame) {
        let Some(handshake) = self.handshake.take() else {
            log::debug!("Ignoring unsolicited UA");
            return;
        };
        handshake.timer.cancel();
        match handshake.kind {
            HandshakeKind::Connect => {
                self.establish(Some(&frame.payload));
                let _ = handshake.completion.send(Ok(()));
            }
            HandshakeKind::Disconnect => {
                self.enter_disconnected();
                let _ = handshake.completion.send(Ok(()));
            }
        }
    }

    fn on_dm(&mut self) {
        if let Some(handshake) = self.handshake.take() {
            handshake.timer.cancel();
            match handshake.kind {
                HandshakeKind::Connect => {
                    log::warn!("Peer refused connection (DM)");
                    self.set_state(LinkState::Disconnected);
                    let _ = handshake.completion.send(Err(DlmsError::UnexpectedResponse(
                        "DM in reply to SNRM".to_string(),
                    )));
                }
                HandshakeKind::Disconnect => {
                    self.enter_disconnected();
                    let _ = handshake.completion.send(Ok(()));
                }
            }
            return;
        }
        if self.state != LinkState::Disconnected {
            log::info!("Peer forced disconnect (DM)");
        }
        self.enter_disconnected();
    }

    fn on_disc(&mut self) {
        if self.state == LinkState::Disconnected {
            let dm = self.unnumbered(FrameType::DisconnectMode, Bytes::new());
            self.transmit(&dm);
            return;
        }
        let ua = self.unnumbered(FrameType::UnnumberedAcknowledge, Bytes::new());
        self.transmit(&ua);
        if let Some(handshake) = self.handshake.take() {
            handshake.timer.cancel();
            let result = match handshake.kind {
                HandshakeKind::Disconnect => Ok(()),
                HandshakeKind::Connect => Err(DlmsError::UnexpectedResponse(
                    "DISC in reply to SNRM".to_string(),
                )),
            };
            let _ = handshake.completion.send(result);
        }
        log::info!("Peer requested disconnect (DISC)");
        self.enter_disconnected();
    }

    fn on_timer(&mut self, key: TimerKey, generation: u64) {
        match key {
            TimerKey::Handshake => {
                let current = self
                    .handshake
                    .as_ref()
                    .is_some_and(|h| h.timer.generation == generation);
                if !current {
                    return;
                }
                let Some(handshake) = self.handshake.take() else {
                    return;
                };
                self.statistics.timeouts += 1;
                match handshake.kind {
                    HandshakeKind::Connect => {
                        log::warn!(
                            "No UA to SNRM within {:?}",
                            self.config.response_timeout()
                        );
                        self.set_state(LinkState::Disconnected);
                    }
                    HandshakeKind::Disconnect => {
                        log::warn!(
                            "No UA to DISC within {:?}",
                            self.config.response_timeout()
                        );
                        self.enter_disconnected();
                    }
                }
                let _ = handshake.completion.send(Err(DlmsError::ResponseTimeout));
            }
            TimerKey::Frame(ns) => {
                let current = self
                    .send_window
                    .get(ns)
                    .is_some_and(|f| f.timer.generation == generation);
                if !current {
                    return;
                }
                self.statistics.timeouts += 1;
                log::warn!(
                    "I-frame N(S)={} not acknowledged within {:?}",
                    ns,
                    self.config.response_timeout()
                );
                for (_, in_flight) in self.send_window.truncate_from(ns) {
                    in_flight.timer.cancel();
                    in_flight.outgoing.fail(DlmsError::ResponseTimeout);
                }
                for outgoing in self.backlog.drain(..) {
                    outgoing.fail(DlmsError::ResponseTimeout);
                }
            }
            TimerKey::Inactivity => {
                let current = self
                    .inactivity
                    .as_ref()
                    .is_some_and(|t| t.generation == generation);
                if !current {
                    return;
                }
                self.inactivity = None;
                if self.state.is_ready() {
                    self.statistics.timeouts += 1;
                    log::warn!(
                        "No traffic from {} for {} ms, dropping link",
                        self.remote(),
                        self.config.inactivity_timeout_ms
                    );
                    self.enter_disconnected();
                }
            }
        }
    }
}

impl Drop for LinkInner {
    fn drop(&mut self) {
        if let Some(handshake) = &self.handshake {
            handshake.timer.cancel();
        }
        if let Some(timer) = &self.inactivity {
            timer.cancel();
        }
        for (_, in_flight) in self.send_window.iter_mut() {
            in_flight.timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: HdlcAddress = HdlcAddress::new(0x02, 0x02);
    const SERVER: HdlcAddress = HdlcAddress::new(0x01, 0x01);

    fn client() -> (HdlcLayer, LinkChannels) {
        let _ = env_logger::builder().is_test(true).try_init();
        HdlcLayer::new(HdlcConfig::default()).unwrap()
    }

    fn next_frame(channels: &mut LinkChannels) -> HdlcFrame {
        let bytes = channels.outbound.try_recv().expect("frame queued");
        HdlcFrame::decode(&bytes).unwrap()
    }

    async fn connected() -> (HdlcLayer, LinkChannels) {
        let (link, mut channels) = client();
        let pending = tokio::spawn({
            let link = link.clone();
            async move { link.connect().await }
        });
        tokio::task::yield_now().await;
        let snrm = next_frame(&mut channels);
        assert_eq!(snrm.frame_type, FrameType::SetNormalResponseMode);
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::UnnumberedAcknowledge,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        pending.await.unwrap().unwrap();
        assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Connected);
        (link, channels)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let (link, _channels) = client();
        let err = link.send_data(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, DlmsError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_ua_ignored() {
        let (link, mut channels) = client();
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::UnnumberedAcknowledge,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(channels.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_for_other_station_dropped() {
        let (link, mut channels) = connected().await;
        link.handle_frame(HdlcFrame::information(
            HdlcAddress::new(0x05, 0x05),
            SERVER,
            0,
            0,
            Bytes::from_static(b"not ours"),
        ));
        assert_eq!(link.receive_sequence(), 0);
        assert!(channels.events.try_recv().is_err());
        assert_eq!(link.statistics().frames_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_segmented_send_and_reassembly() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = HdlcConfig {
            max_info_length: 4,
            ..HdlcConfig::default()
        };
        let (link, mut channels) = HdlcLayer::new(config).unwrap();
        let pending = tokio::spawn({
            let link = link.clone();
            async move { link.connect().await }
        });
        tokio::task::yield_now().await;
        next_frame(&mut channels);
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::UnnumberedAcknowledge,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        pending.await.unwrap().unwrap();
        let _ = channels.events.try_recv();

        let send = tokio::spawn({
            let link = link.clone();
            async move { link.send_data(Bytes::from_static(b"abcdefghij")).await }
        });
        tokio::task::yield_now().await;
        for (ns, chunk, segmented) in [(0u8, &b"abcd"[..], true), (1, b"efgh", true), (2, b"ij", false)] {
            let frame = next_frame(&mut channels);
            assert_eq!(frame.send_sequence, ns);
            assert_eq!(frame.payload.as_ref(), chunk);
            assert_eq!(frame.segmented, segmented);
            link.handle_frame(HdlcFrame::supervisory(FrameType::ReceiveReady, CLIENT, SERVER, ns + 1));
        }
        send.await.unwrap().unwrap();
        assert_eq!(link.send_sequence(), 3);

        link.handle_frame(
            HdlcFrame::information(CLIENT, SERVER, 0, 3, Bytes::from_static(b"12"))
                .with_segmented(true),
        );
        link.handle_frame(HdlcFrame::information(CLIENT, SERVER, 1, 3, Bytes::from_static(b"34")));
        assert_eq!(
            channels.events.try_recv().unwrap(),
            LinkEvent::Data(Bytes::from_static(b"1234"))
        );
        assert_eq!(link.receive_sequence(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dm_during_connect_is_unexpected() {
        let (link, mut channels) = client();
        let pending = tokio::spawn({
            let link = link.clone();
            async move { link.connect().await }
        });
        tokio::task::yield_now().await;
        next_frame(&mut channels);
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::DisconnectMode,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, DlmsError::UnexpectedResponse(_)));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(channels.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_disc_forces_disconnect_once() {
        let (link, mut channels) = connected().await;
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::Disconnect,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        let ua = next_frame(&mut channels);
        assert_eq!(ua.frame_type, FrameType::UnnumberedAcknowledge);
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Disconnected);

        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::DisconnectMode,
            CLIENT,
            SERVER,
            Bytes::new(),
        ));
        assert!(channels.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_accepts_snrm() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (link, mut channels) = HdlcLayer::new(HdlcConfig::server()).unwrap();
        let proposal = LinkParameters {
            max_info_length_tx: 64,
            max_info_length_rx: 256,
            window_size_tx: 1,
            window_size_rx: 1,
        };
        link.handle_frame(HdlcFrame::unnumbered(
            FrameType::SetNormalResponseMode,
            SERVER,
            CLIENT,
            proposal.encode(),
        ));
        let ua = next_frame(&mut channels);
        assert_eq!(ua.frame_type, FrameType::UnnumberedAcknowledge);
        assert!(ua.poll_final);
        assert_eq!(ua.destination, CLIENT);
        let agreed = LinkParameters::decode(&ua.payload).unwrap();
        assert_eq!(agreed.max_info_length_rx, 64);
        assert_eq!(agreed.max_info_length_tx, 128);
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checksum_error_counted_not_delivered() {
        let (link, mut channels) = connected().await;
        let mut wire = BytesMut::from(
            &HdlcFrame::information(CLIENT, SERVER, 0, 0, Bytes::from_static(b"data")).encode()[..],
        );
        let at = wire.windows(4).position(|w| w == b"data").unwrap();
        wire[at] ^= 0x01;
        link.handle_bytes(&wire);
        assert!(matches!(
            channels.events.try_recv().unwrap(),
            LinkEvent::FrameRejected { .. }
        ));
        assert_eq!(link.statistics().fcs_errors, 1);
        assert_eq!(link.receive_sequence(), 0);
        assert!(channels.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_drops_link() {
        let (link, mut channels) = connected().await;
        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Disconnected);
    }
}
