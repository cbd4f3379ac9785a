//! Client application layer
//!
//! `ApplicationLayer` turns GET/SET/ACTION calls into xDLMS PDUs and
//! correlates the responses by invoke id. Like the link layer it does no I/O:
//! encoded APDUs leave through [`ApplicationChannels::outbound`] and received
//! APDUs are fed to [`ApplicationLayer::handle_received_data`].
//!
//! An invoke id stays reserved for the whole operation, including every
//! block of a block transfer. An id whose request timed out is quarantined:
//! a response that still arrives for it is dropped, and the id is reused
//! only once nothing else is free.

use crate::block::{BlockAssembler, split_blocks};
use crate::config::ApplicationConfig;
use crate::pdu::{
    Conformance, CosemAttributeDescriptor, CosemMethodDescriptor, InitiateRequest,
    InitiateResponse, InvokeIdAndPriority, MAX_INVOKE_ID, SelectiveAccessDescriptor,
};
use crate::service::{
    ActionRequest, BlockData, DataBlock, EventNotification, GetRequest, GetResponse, SetRequest,
    SetResponse,
};
use crate::xdlms::XdlmsPdu;
use bytes::Bytes;
use dlms_asn1::{decode_data, encode_data};
use dlms_core::{DataAccessResult, DataObject, DlmsError, DlmsResult, ObisCode};
use dlms_security::{AccessLevel, SecurityProvider};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Tag, choice, invoke id, attribute descriptor and access flag
const SET_NORMAL_OVERHEAD: usize = 13;
/// SET-Request-With-First-Datablock header including a 3-byte length
const SET_BLOCK_OVERHEAD: usize = SET_NORMAL_OVERHEAD + 8;

/// Unsolicited notification delivered to the owner of the layer
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationEvent {
    Notification(EventNotification),
    /// An inbound APDU could not be used
    ProtocolError(String),
}

/// Receiving ends of the channels an application layer writes to
#[derive(Debug)]
pub struct ApplicationChannels {
    /// Encoded (and protected) APDUs for the link layer
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    pub events: mpsc::UnboundedReceiver<ApplicationEvent>,
}

type Shared = Arc<Mutex<AppInner>>;

struct AppInner {
    config: ApplicationConfig,
    negotiated: Option<InitiateResponse>,
    pending: HashMap<u8, oneshot::Sender<DlmsResult<XdlmsPdu>>>,
    initiate: Option<oneshot::Sender<DlmsResult<InitiateResponse>>>,
    initiate_round: u64,
    in_use: HashSet<u8>,
    quarantine: VecDeque<u8>,
    next_invoke_id: u8,
    outbound: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedSender<ApplicationEvent>,
}

fn lock(shared: &Mutex<AppInner>) -> MutexGuard<'_, AppInner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppInner {
    fn allocate(&mut self) -> DlmsResult<u8> {
        for _ in 0..MAX_INVOKE_ID {
            let candidate = self.next_invoke_id;
            self.next_invoke_id = candidate % MAX_INVOKE_ID + 1;
            if !self.in_use.contains(&candidate) && !self.quarantine.contains(&candidate) {
                self.in_use.insert(candidate);
                return Ok(candidate);
            }
        }
        match self.quarantine.pop_front() {
            Some(id) => {
                log::warn!("Reclaiming quarantined invoke id {}", id);
                self.in_use.insert(id);
                Ok(id)
            }
            None => Err(DlmsError::InvalidState(format!(
                "All {} invoke ids are in use",
                MAX_INVOKE_ID
            ))),
        }
    }

    fn release(&mut self, id: u8) {
        self.in_use.remove(&id);
        if self.pending.remove(&id).is_some() {
            log::debug!("Quarantining invoke id {} until its response arrives", id);
            self.quarantine.push_back(id);
        }
    }

    fn conformance(&self) -> Conformance {
        let proposed = self.config.proposed_conformance;
        match &self.negotiated {
            Some(response) => proposed & response.negotiated_conformance,
            None => proposed,
        }
    }

    fn max_pdu_size(&self) -> usize {
        let ours = self.config.max_pdu_size;
        match &self.negotiated {
            Some(response) => ours.min(response.server_max_receive_pdu_size) as usize,
            None => ours as usize,
        }
    }

    fn emit(&self, event: ApplicationEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Application event dropped: receiver closed");
        }
    }
}

/// Releases an invoke id when the operation holding it ends
struct Reservation {
    inner: Shared,
    id: u8,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        lock(&self.inner).release(self.id);
    }
}

/// Frees the Initiate slot when the exchange that filled it ends
struct InitiateSlot {
    inner: Shared,
    round: u64,
}

impl Drop for InitiateSlot {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        if inner.initiate_round == self.round {
            inner.initiate = None;
        }
    }
}

/// xDLMS client for one association
///
/// Cloning yields another handle to the same layer; requests issued from
/// different clones may be outstanding at the same time.
#[derive(Clone)]
pub struct ApplicationLayer {
    inner: Shared,
    security: Option<Arc<dyn SecurityProvider>>,
}

impl ApplicationLayer {
    /// Create a layer; `security` protects every APDU and authorizes requests
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the configuration does not validate
    pub fn new(
        config: ApplicationConfig,
        security: Option<Arc<dyn SecurityProvider>>,
    ) -> DlmsResult<(Self, ApplicationChannels)> {
        config.validate()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = AppInner {
            config,
            negotiated: None,
            pending: HashMap::new(),
            initiate: None,
            initiate_round: 0,
            in_use: HashSet::new(),
            quarantine: VecDeque::new(),
            next_invoke_id: 1,
            outbound: outbound_tx,
            events: events_tx,
        };
        Ok((
            Self {
                inner: Arc::new(Mutex::new(inner)),
                security,
            },
            ApplicationChannels {
                outbound: outbound_rx,
                events: events_rx,
            },
        ))
    }

    pub fn config(&self) -> ApplicationConfig {
        lock(&self.inner).config.clone()
    }

    /// Result of the last successful Initiate exchange
    pub fn negotiated(&self) -> Option<InitiateResponse> {
        lock(&self.inner).negotiated.clone()
    }

    /// Services usable on this association
    pub fn conformance(&self) -> Conformance {
        lock(&self.inner).conformance()
    }

    /// Upper bound for outbound APDUs
    pub fn max_pdu_size(&self) -> usize {
        lock(&self.inner).max_pdu_size()
    }

    /// Requests waiting for a response
    pub fn pending_count(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Propose the xDLMS context and adopt what the server negotiates
    ///
    /// # Errors
    ///
    /// * `InvalidState` if an Initiate exchange is already running
    /// * `ResponseTimeout` if the server does not answer in time
    /// * `Protocol` if the server answers with another DLMS version
    pub async fn initiate(&self) -> DlmsResult<InitiateResponse> {
        let (tx, rx) = oneshot::channel();
        let (request, timeout, version, _slot) = {
            let mut inner = lock(&self.inner);
            if inner.initiate.is_some() {
                return Err(DlmsError::InvalidState(
                    "Initiate already in progress".to_string(),
                ));
            }
            inner.initiate = Some(tx);
            inner.initiate_round = inner.initiate_round.wrapping_add(1);
            let slot = InitiateSlot {
                inner: self.inner.clone(),
                round: inner.initiate_round,
            };
            let config = &inner.config;
            let request = InitiateRequest {
                proposed_dlms_version_number: config.dlms_version,
                ..InitiateRequest::new(config.proposed_conformance, config.max_receive_pdu_size)
            };
            (request, config.timeout(), config.dlms_version, slot)
        };

        self.transmit(&XdlmsPdu::InitiateRequest(request))?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response?,
            Ok(Err(_)) => return Err(DlmsError::ConnectionClosed),
            Err(_) => {
                log::warn!("No InitiateResponse within {:?}", timeout);
                return Err(DlmsError::ResponseTimeout);
            }
        };

        if response.negotiated_dlms_version_number != version {
            return Err(DlmsError::Protocol(format!(
                "Server negotiated DLMS version {}, expected {}",
                response.negotiated_dlms_version_number, version
            )));
        }

        let mut inner = lock(&self.inner);
        inner.negotiated = Some(response.clone());
        log::info!(
            "xDLMS context established: conformance {}, max PDU {}",
            inner.conformance(),
            inner.max_pdu_size()
        );
        Ok(response)
    }

    /// Read one attribute
    pub async fn get(&self, attribute: CosemAttributeDescriptor) -> DlmsResult<DataObject> {
        self.get_inner(attribute, None).await
    }

    /// Read part of an attribute, e.g. a date range of a profile buffer
    pub async fn get_with_selection(
        &self,
        attribute: CosemAttributeDescriptor,
        access: SelectiveAccessDescriptor,
    ) -> DlmsResult<DataObject> {
        self.require(Conformance::SELECTIVE_ACCESS, "selective access")?;
        self.get_inner(attribute, Some(access)).await
    }

    async fn get_inner(
        &self,
        attribute: CosemAttributeDescriptor,
        access: Option<SelectiveAccessDescriptor>,
    ) -> DlmsResult<DataObject> {
        self.require(Conformance::GET, "GET")?;
        self.authorize(&attribute.logical_name, AccessLevel::Read)?;
        let reservation = self.reserve()?;
        let invoke = self.invoke(&reservation)?;
        log::debug!("GET {} (invoke id {})", attribute, reservation.id);

        let request = GetRequest::Normal {
            invoke,
            attribute,
            access,
        };
        let mut response = self
            .round_trip(&reservation, XdlmsPdu::GetRequest(request))
            .await?;
        let mut assembler: Option<BlockAssembler> = None;

        loop {
            match response {
                XdlmsPdu::GetResponse(GetResponse::Normal { result, .. }) => {
                    if assembler.is_some() {
                        return Err(DlmsError::Protocol(
                            "GET-Response-Normal during block transfer".to_string(),
                        ));
                    }
                    return result.into_result();
                }
                XdlmsPdu::GetResponse(GetResponse::WithDataBlock {
                    last_block,
                    block_number,
                    result,
                    ..
                }) => {
                    let raw = match result {
                        BlockData::Raw(raw) => raw,
                        BlockData::Error(result) => return Err(DlmsError::DataAccess(result)),
                    };
                    self.require(Conformance::BLOCK_TRANSFER_WITH_GET, "GET block transfer")?;
                    let blocks = assembler.get_or_insert_with(BlockAssembler::new);
                    blocks.push(block_number, last_block, &raw)?;
                    log::trace!(
                        "GET block {} ({} bytes so far, last: {})",
                        block_number,
                        blocks.len(),
                        last_block
                    );
                    if last_block {
                        let data = blocks_finish(assembler.take())?;
                        return decode_data(&data);
                    }
                    let next = GetRequest::Next {
                        invoke,
                        block_number,
                    };
                    response = self
                        .round_trip(&reservation, XdlmsPdu::GetRequest(next))
                        .await?;
                }
                other => {
                    return Err(DlmsError::UnexpectedResponse(format!(
                        "{} in reply to GET-Request",
                        other.name()
                    )));
                }
            }
        }
    }

    /// Write one attribute, in data blocks if it does not fit in one PDU
    pub async fn set(&self, attribute: CosemAttributeDescriptor, value: DataObject) -> DlmsResult<()> {
        self.require(Conformance::SET, "SET")?;
        self.authorize(&attribute.logical_name, AccessLevel::Write)?;
        let reservation = self.reserve()?;
        let invoke = self.invoke(&reservation)?;
        let encoded = encode_data(&value);
        let max_pdu_size = self.max_pdu_size();
        log::debug!(
            "SET {} with {} bytes (invoke id {})",
            attribute,
            encoded.len(),
            reservation.id
        );

        if encoded.len() + SET_NORMAL_OVERHEAD <= max_pdu_size {
            let request = SetRequest::Normal {
                invoke,
                attribute,
                access: None,
                value,
            };
            return match self
                .round_trip(&reservation, XdlmsPdu::SetRequest(request))
                .await?
            {
                XdlmsPdu::SetResponse(SetResponse::Normal { result, .. }) => check_result(result),
                other => Err(DlmsError::UnexpectedResponse(format!(
                    "{} in reply to SET-Request-Normal",
                    other.name()
                ))),
            };
        }

        self.require(Conformance::BLOCK_TRANSFER_WITH_SET, "SET block transfer")?;
        let blocks = split_blocks(&encoded, max_pdu_size.saturating_sub(SET_BLOCK_OVERHEAD));
        let count = blocks.len();
        for (index, raw_data) in blocks.into_iter().enumerate() {
            let block = DataBlock {
                last_block: index + 1 == count,
                block_number: index as u32 + 1,
                raw_data,
            };
            let (last_block, block_number) = (block.last_block, block.block_number);
            let request = if index == 0 {
                SetRequest::WithFirstDataBlock {
                    invoke,
                    attribute,
                    access: None,
                    block,
                }
            } else {
                SetRequest::WithDataBlock { invoke, block }
            };

            match self
                .round_trip(&reservation, XdlmsPdu::SetRequest(request))
                .await?
            {
                XdlmsPdu::SetResponse(SetResponse::DataBlock {
                    block_number: acked,
                    ..
                }) if !last_block => {
                    if acked != block_number {
                        return Err(DlmsError::Protocol(format!(
                            "SET block {} acknowledged as {}",
                            block_number, acked
                        )));
                    }
                }
                XdlmsPdu::SetResponse(SetResponse::LastDataBlock { result, .. }) if last_block => {
                    return check_result(result);
                }
                XdlmsPdu::SetResponse(SetResponse::Normal { result, .. })
                | XdlmsPdu::SetResponse(SetResponse::LastDataBlock { result, .. })
                    if !result.is_success() =>
                {
                    return Err(DlmsError::DataAccess(result));
                }
                other => {
                    return Err(DlmsError::UnexpectedResponse(format!(
                        "{} in reply to SET block {}",
                        other.name(),
                        block_number
                    )));
                }
            }
        }
        Err(DlmsError::Protocol("SET block transfer ended without a result".to_string()))
    }

    /// Invoke a method; returns its return value, if any
    pub async fn action(
        &self,
        method: CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> DlmsResult<Option<DataObject>> {
        self.require(Conformance::ACTION, "ACTION")?;
        self.authorize(&method.logical_name, AccessLevel::Write)?;
        let reservation = self.reserve()?;
        let invoke = self.invoke(&reservation)?;
        log::debug!("ACTION {} (invoke id {})", method, reservation.id);

        let request = ActionRequest {
            invoke,
            method,
            parameters,
        };
        match self
            .round_trip(&reservation, XdlmsPdu::ActionRequest(request))
            .await?
        {
            XdlmsPdu::ActionResponse(response) => response.into_result(),
            other => Err(DlmsError::UnexpectedResponse(format!(
                "{} in reply to ACTION-Request",
                other.name()
            ))),
        }
    }

    /// Feed one received APDU
    ///
    /// # Errors
    ///
    /// Returns `Security` if the APDU cannot be unprotected and `Protocol` or
    /// `InvalidData` if it cannot be decoded or used. No pending request is
    /// resolved in that case.
    pub fn handle_received_data(&self, data: &[u8]) -> DlmsResult<()> {
        let plain = match &self.security {
            Some(security) => match security.decrypt(data) {
                Ok(plain) => plain,
                Err(e) => return self.reject(e),
            },
            None => Bytes::copy_from_slice(data),
        };
        let pdu = match XdlmsPdu::decode(&plain) {
            Ok(pdu) => pdu,
            Err(e) => return self.reject(e),
        };
        log::trace!("Received {}", pdu.name());

        let mut inner = lock(&self.inner);
        match pdu {
            XdlmsPdu::InitiateResponse(response) => match inner.initiate.take() {
                Some(completion) => {
                    let _ = completion.send(Ok(response));
                }
                None => log::warn!("Dropping unsolicited InitiateResponse"),
            },
            XdlmsPdu::EventNotification(notification) => {
                log::debug!("Event notification for {}", notification.attribute);
                inner.emit(ApplicationEvent::Notification(notification));
            }
            response @ (XdlmsPdu::GetResponse(_)
            | XdlmsPdu::SetResponse(_)
            | XdlmsPdu::ActionResponse(_)) => {
                let Some(id) = response.invoke_id() else {
                    return Ok(());
                };
                if let Some(completion) = inner.pending.remove(&id) {
                    let _ = completion.send(Ok(response));
                } else if let Some(position) = inner.quarantine.iter().position(|&q| q == id) {
                    inner.quarantine.remove(position);
                    log::debug!("Dropping late {} for invoke id {}", response.name(), id);
                } else {
                    log::warn!("Dropping {} for unknown invoke id {}", response.name(), id);
                }
            }
            request => {
                drop(inner);
                return self.reject(DlmsError::Protocol(format!(
                    "Unexpected {} received by client",
                    request.name()
                )));
            }
        }
        Ok(())
    }

    /// Fail every outstanding request with `ConnectionClosed`
    pub fn fail_all(&self) {
        let mut inner = lock(&self.inner);
        let pending: Vec<_> = inner.pending.drain().collect();
        if !pending.is_empty() {
            log::debug!("Failing {} pending requests", pending.len());
        }
        for (_, completion) in pending {
            let _ = completion.send(Err(DlmsError::ConnectionClosed));
        }
        if let Some(completion) = inner.initiate.take() {
            let _ = completion.send(Err(DlmsError::ConnectionClosed));
        }
        inner.negotiated = None;
    }

    fn reject(&self, error: DlmsError) -> DlmsResult<()> {
        log::warn!("Discarding inbound APDU: {}", error);
        lock(&self.inner).emit(ApplicationEvent::ProtocolError(error.to_string()));
        Err(error)
    }

    fn require(&self, feature: Conformance, service: &str) -> DlmsResult<()> {
        let conformance = self.conformance();
        if conformance.contains(feature) {
            Ok(())
        } else {
            Err(DlmsError::Protocol(format!(
                "{} not allowed by conformance {}",
                service, conformance
            )))
        }
    }

    fn authorize(&self, logical_name: &ObisCode, required: AccessLevel) -> DlmsResult<()> {
        let Some(security) = &self.security else {
            return Ok(());
        };
        let client_id = lock(&self.inner).config.client_id;
        if security.authorize(client_id, logical_name, required) {
            Ok(())
        } else {
            log::warn!(
                "Client {} denied {} access to {}",
                client_id,
                required.as_str(),
                logical_name
            );
            Err(DlmsError::AccessDenied(format!(
                "{} access to {} denied",
                required.as_str(),
                logical_name
            )))
        }
    }

    fn reserve(&self) -> DlmsResult<Reservation> {
        let id = lock(&self.inner).allocate()?;
        Ok(Reservation {
            inner: self.inner.clone(),
            id,
        })
    }

    fn invoke(&self, reservation: &Reservation) -> DlmsResult<InvokeIdAndPriority> {
        let priority = lock(&self.inner).config.priority;
        InvokeIdAndPriority::new(reservation.id, priority)
    }

    fn transmit(&self, pdu: &XdlmsPdu) -> DlmsResult<()> {
        let encoded = pdu.encode();
        let protected = match &self.security {
            Some(security) => security.encrypt(&encoded)?,
            None => encoded,
        };
        log::trace!("Sending {} ({} bytes)", pdu.name(), protected.len());
        lock(&self.inner)
            .outbound
            .send(protected)
            .map_err(|_| DlmsError::ConnectionClosed)
    }

    async fn round_trip(&self, reservation: &Reservation, request: XdlmsPdu) -> DlmsResult<XdlmsPdu> {
        let id = reservation.id;
        let (tx, rx) = oneshot::channel();
        let timeout = {
            let mut inner = lock(&self.inner);
            inner.pending.insert(id, tx);
            inner.config.timeout()
        };
        if let Err(e) = self.transmit(&request) {
            lock(&self.inner).pending.remove(&id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(DlmsError::ConnectionClosed),
            Err(_) => {
                log::warn!("{} (invoke id {}) timed out after {:?}", request.name(), id, timeout);
                Err(DlmsError::RequestTimeout { invoke_id: id })
            }
        }
    }
}

fn blocks_finish(assembler: Option<BlockAssembler>) -> DlmsResult<Bytes> {
    assembler
        .ok_or_else(|| DlmsError::Protocol("No block transfer in progress".to_string()))?
        .finish()
}

fn check_result(result: DataAccessResult) -> DlmsResult<()> {
    if result.is_success() {
        Ok(())
    } else {
        Err(DlmsError::DataAccess(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> (ApplicationLayer, ApplicationChannels) {
        ApplicationLayer::new(ApplicationConfig::default(), None).unwrap()
    }

    #[test]
    fn test_invoke_ids_cycle_from_one() {
        let (layer, _channels) = layer();
        let mut inner = lock(&layer.inner);
        let ids: Vec<u8> = (0..MAX_INVOKE_ID).map(|_| inner.allocate().unwrap()).collect();
        assert_eq!(ids, (1..=MAX_INVOKE_ID).collect::<Vec<_>>());
        assert!(inner.allocate().is_err());
        inner.release(4);
        assert_eq!(inner.allocate().unwrap(), 4);
    }

    #[test]
    fn test_quarantined_id_reclaimed_last() {
        let (layer, _channels) = layer();
        let mut inner = lock(&layer.inner);
        let id = inner.allocate().unwrap();
        let (tx, _rx) = oneshot::channel();
        inner.pending.insert(id, tx);
        inner.release(id);
        assert_eq!(inner.quarantine, VecDeque::from([id]));

        let others: Vec<u8> = (1..MAX_INVOKE_ID).map(|_| inner.allocate().unwrap()).collect();
        assert!(!others.contains(&id));
        assert_eq!(inner.allocate().unwrap(), id);
        assert!(inner.quarantine.is_empty());
    }

    #[test]
    fn test_release_without_pending_frees_id() {
        let (layer, _channels) = layer();
        let mut inner = lock(&layer.inner);
        let id = inner.allocate().unwrap();
        inner.release(id);
        assert!(inner.quarantine.is_empty());
        assert!(!inner.in_use.contains(&id));
    }

    #[tokio::test]
    async fn test_response_for_unknown_id_ignored() {
        let (layer, _channels) = layer();
        assert!(layer.handle_received_data(&[0xC5, 0x01, 0x43, 0x00]).is_ok());
        assert_eq!(layer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_pdu_rejected_on_client() {
        let (layer, mut channels) = layer();
        let request = [0xC0, 0x02, 0x41, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            layer.handle_received_data(&request),
            Err(DlmsError::Protocol(_))
        ));
        assert!(matches!(
            channels.events.try_recv(),
            Ok(ApplicationEvent::ProtocolError(_))
        ));
    }
}
