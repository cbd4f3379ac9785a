//! Client connection to one meter
//!
//! A [`MeterConnection`] owns one HDLC link and one application layer and
//! runs three tasks while open:
//!
//! - the byte pump between the transport and the link
//! - link events: received APDUs go up to the application layer
//! - application APDUs go down to the link, one at a time
//!
//! Opening performs SNRM/UA and then the xDLMS Initiate exchange.

use crate::registry::ConnectionRegistry;
use bytes::Bytes;
use dlms_application::{
    ApplicationChannels, ApplicationEvent, ApplicationLayer, CosemAttributeDescriptor, CosemMethodDescriptor,
    InitiateResponse, SelectiveAccessDescriptor,
};
use dlms_core::{DataObject, DlmsError, DlmsResult};
use dlms_session::{HdlcLayer, HdlcStatistics, LinkChannels, LinkEvent, LinkState};
use dlms_transport::StreamAccessor;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
}

/// Everything the I/O tasks take over when the connection opens
struct Unstarted {
    transport: Box<dyn StreamAccessor>,
    link_channels: LinkChannels,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

/// One link and one application layer bound to a single meter
pub struct MeterConnection {
    meter_id: String,
    link: HdlcLayer,
    application: ApplicationLayer,
    registry: Option<ConnectionRegistry>,
    state: ConnectionState,
    // Mutex only for Sync: the boxed transport is Send, and `&self` futures must be Send
    unstarted: Mutex<Option<Unstarted>>,
    events: Option<mpsc::UnboundedReceiver<ApplicationEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MeterConnection {
    pub(crate) fn new(
        meter_id: String,
        link: (HdlcLayer, LinkChannels),
        application: (ApplicationLayer, ApplicationChannels),
        transport: Box<dyn StreamAccessor>,
        registry: Option<ConnectionRegistry>,
    ) -> Self {
        let (link, link_channels) = link;
        let (application, channels) = application;
        Self {
            meter_id,
            link,
            application,
            registry,
            state: ConnectionState::Closed,
            unstarted: Mutex::new(Some(Unstarted {
                transport,
                link_channels,
                outbound: channels.outbound,
            })),
            events: Some(channels.events),
            tasks: Vec::new(),
        }
    }

    /// Start the I/O tasks, connect the link and run Initiate
    ///
    /// # Errors
    ///
    /// * `InvalidState` if the connection was opened before
    /// * `ResponseTimeout` or `UnexpectedResponse` from the link handshake
    /// * any Initiate failure; the link is released again in that case
    pub async fn open(&mut self) -> DlmsResult<InitiateResponse> {
        let unstarted = self
            .unstarted
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(unstarted) = unstarted else {
            return Err(DlmsError::InvalidState(format!(
                "Connection to {} cannot be reopened",
                self.meter_id
            )));
        };
        self.state = ConnectionState::Opening;
        self.spawn_tasks(unstarted);

        if let Err(e) = self.link.connect().await {
            log::warn!("Link to {} not established: {}", self.meter_id, e);
            self.shutdown();
            return Err(e);
        }

        let negotiated = match self.application.initiate().await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                log::warn!("Initiate with {} failed: {}", self.meter_id, e);
                let _ = self.link.disconnect().await;
                self.shutdown();
                return Err(e);
            }
        };

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.register(&self.meter_id) {
                let _ = self.link.disconnect().await;
                self.shutdown();
                return Err(e);
            }
        }
        self.state = ConnectionState::Open;
        log::info!("Connection to {} open", self.meter_id);
        Ok(negotiated)
    }

    fn spawn_tasks(&mut self, unstarted: Unstarted) {
        let Unstarted {
            transport,
            link_channels:
                LinkChannels {
                    outbound: frames,
                    events: mut link_events,
                },
            mut outbound,
        } = unstarted;

        let link = self.link.clone();
        let meter_id = self.meter_id.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = dlms_transport::pump(transport, frames, move |bytes: &[u8]| {
                link.handle_bytes(bytes)
            })
            .await;
            match result {
                Ok(()) => log::debug!("Transport to {} finished", meter_id),
                Err(e) => log::warn!("Transport to {} failed: {}", meter_id, e),
            }
        }));

        let application = self.application.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = link_events.recv().await {
                match event {
                    LinkEvent::Data(apdu) => {
                        // Failures are logged and reported as events by the layer
                        let _ = application.handle_received_data(&apdu);
                    }
                    LinkEvent::Disconnected => application.fail_all(),
                    LinkEvent::FrameRejected { reason } => {
                        log::debug!("Frame rejected: {}", reason)
                    }
                    LinkEvent::Connected => {}
                }
            }
        }));

        let link = self.link.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(apdu) = outbound.recv().await {
                if let Err(e) = link.send_data(apdu).await {
                    // The request times out at the application layer
                    log::warn!("APDU not delivered: {}", e);
                }
            }
        }));
    }

    fn check_open(&self) -> DlmsResult<()> {
        if self.state != ConnectionState::Open || !self.link.is_connected() {
            return Err(DlmsError::InvalidState(format!(
                "Connection to {} is not open",
                self.meter_id
            )));
        }
        Ok(())
    }

    fn record<T>(&self, result: DlmsResult<T>) -> DlmsResult<T> {
        if let Some(registry) = &self.registry {
            registry.record_request(&self.meter_id, result.is_ok());
        }
        result
    }

    /// Read one attribute
    pub async fn get(&self, attribute: CosemAttributeDescriptor) -> DlmsResult<DataObject> {
        self.check_open()?;
        let result = self.application.get(attribute).await;
        self.record(result)
    }

    /// Read part of an attribute
    pub async fn get_with_selection(
        &self,
        attribute: CosemAttributeDescriptor,
        access: SelectiveAccessDescriptor,
    ) -> DlmsResult<DataObject> {
        self.check_open()?;
        let result = self.application.get_with_selection(attribute, access).await;
        self.record(result)
    }

    /// Write one attribute
    pub async fn set(&self, attribute: CosemAttributeDescriptor, value: DataObject) -> DlmsResult<()> {
        self.check_open()?;
        let result = self.application.set(attribute, value).await;
        self.record(result)
    }

    /// Invoke a method
    pub async fn action(
        &self,
        method: CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>> {
        self.check_open()?;
        let result = self.application.action(method, parameters).await;
        self.record(result)
    }

    /// Release the link and stop the I/O tasks
    ///
    /// Outstanding requests fail with `ConnectionClosed`. Closing a closed
    /// connection does nothing.
    pub async fn close(&mut self) -> DlmsResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.application.fail_all();
        let released = if self.link.state() == LinkState::Connected {
            self.link.disconnect().await
        } else {
            Ok(())
        };
        self.shutdown();
        if let Some(registry) = &self.registry {
            registry.unregister(&self.meter_id);
        }
        log::info!("Connection to {} closed", self.meter_id);
        released
    }

    fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.state = ConnectionState::Closed;
    }

    /// Take the receiver of event notifications and protocol errors
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ApplicationEvent>> {
        self.events.take()
    }

    pub fn meter_id(&self) -> &str {
        &self.meter_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open && self.link.is_connected()
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn link_statistics(&self) -> HdlcStatistics {
        self.link.statistics()
    }

    pub fn application(&self) -> &ApplicationLayer {
        &self.application
    }
}

impl Drop for MeterConnection {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if self.state != ConnectionState::Closed {
            if let Some(registry) = &self.registry {
                registry.unregister(&self.meter_id);
            }
        }
    }
}

impl std::fmt::Debug for MeterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterConnection")
            .field("meter_id", &self.meter_id)
            .field("state", &self.state)
            .field("link_state", &self.link.state())
            .finish()
    }
}
