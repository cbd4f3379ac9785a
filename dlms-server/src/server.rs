//! COSEM server: the meter side of an association
//!
//! [`CosemServer`] owns the registered objects and answers xDLMS requests
//! arriving over an HDLC link. Every served link gets its own
//! [`Association`]; objects are shared by all of them.
//!
//! Failures of the object model never leave the server as errors. They are
//! answered with the data access result the client sees:
//!
//! | object model error                      | result                    |
//! |-----------------------------------------|---------------------------|
//! | unknown object, attribute or method     | `ObjectUndefined`         |
//! | class id of the request does not match  | `ObjectClassInconsistent` |
//! | read-only attribute, access denied      | `ReadWriteDenied`         |
//! | `DataAccess(result)`                    | `result`                  |
//! | anything else                           | `OtherReason`             |

use crate::association::{Association, GetTransfer, SetTransfer};
use crate::config::ServerConfig;
use bytes::Bytes;
use dlms_application::{
    ActionRequest, ActionResponse, BlockAssembler, BlockData, Conformance, CosemAttributeDescriptor, CosemMethodDescriptor,
    DataBlock, GetDataResult, GetRequest, GetResponse, InitiateRequest, InitiateResponse,
    InvokeIdAndPriority, SelectiveAccessDescriptor, SetRequest, SetResponse, XdlmsPdu, split_blocks,
};
use dlms_asn1::{decode_data, encode_data};
use dlms_core::{DataAccessResult, DataObject, DlmsError, DlmsResult, ObisCode};
use dlms_interface::CosemObject;
use dlms_security::{AccessLevel, SecurityProvider};
use dlms_session::{HdlcLayer, LinkChannels, LinkEvent};
use dlms_transport::StreamAccessor;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tag, choice, invoke id and result choice ahead of the data
const GET_NORMAL_OVERHEAD: usize = 4;
/// Tag, choice, invoke id, last-block flag, block number, result choice and
/// up to three length bytes ahead of the raw data
const GET_BLOCK_OVERHEAD: usize = 12;

/// Maps an object model error to the result code sent to the client
pub fn access_result(error: &DlmsError) -> DataAccessResult {
    match error {
        DlmsError::DataAccess(result) => *result,
        DlmsError::AttributeNotFound(_) | DlmsError::MethodNotFound(_) => {
            DataAccessResult::ObjectUndefined
        }
        DlmsError::ReadOnlyAttribute(_) | DlmsError::AccessDenied(_) => {
            DataAccessResult::ReadWriteDenied
        }
        _ => DataAccessResult::OtherReason,
    }
}

/// Attribute and method ids are 1 or above on the wire
fn member_id(id: i8) -> Result<u8, DataAccessResult> {
    u8::try_from(id)
        .ok()
        .filter(|id| *id > 0)
        .ok_or(DataAccessResult::ObjectUndefined)
}

/// A logical device serving registered COSEM objects
///
/// ```rust,no_run
/// use dlms_core::{DataObject, ObisCode};
/// use dlms_interface::{Register, ScalerUnit, units};
/// use dlms_server::CosemServer;
/// use std::sync::Arc;
///
/// # async fn run(stream: dlms_transport::TcpTransport) -> dlms_core::DlmsResult<()> {
/// let server = CosemServer::new();
/// let energy = Register::new(
///     ObisCode::new(1, 0, 1, 8, 0, 255),
///     DataObject::new_unsigned32(0),
///     ScalerUnit::new(0, units::WATT_HOUR),
/// )?;
/// server.register_object(Arc::new(energy)).await?;
/// server.serve(stream).await?;
/// # Ok(())
/// # }
/// ```
pub struct CosemServer {
    objects: RwLock<HashMap<ObisCode, Arc<dyn CosemObject>>>,
    security: Option<Arc<dyn SecurityProvider>>,
    config: ServerConfig,
}

impl CosemServer {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            security: None,
            config: ServerConfig::default(),
        }
    }

    /// Create a server with `config`
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the configuration does not validate
    pub fn with_config(config: ServerConfig) -> DlmsResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Protect every APDU with `security` and authorize requests through it
    pub fn with_security(mut self, security: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register an object under its logical name
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if an object with the same logical name is
    /// already registered
    pub async fn register_object(&self, object: Arc<dyn CosemObject>) -> DlmsResult<()> {
        let mut objects = self.objects.write().await;
        let logical_name = object.logical_name();
        if objects.contains_key(&logical_name) {
            return Err(DlmsError::InvalidState(format!(
                "Object {} is already registered",
                logical_name
            )));
        }
        log::debug!(
            "Registered class {} object {}",
            object.class_id(),
            logical_name
        );
        objects.insert(logical_name, object);
        Ok(())
    }

    pub async fn unregister_object(&self, logical_name: &ObisCode) -> Option<Arc<dyn CosemObject>> {
        self.objects.write().await.remove(logical_name)
    }

    pub async fn find_object(&self, logical_name: &ObisCode) -> Option<Arc<dyn CosemObject>> {
        self.objects.read().await.get(logical_name).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Serve one client over `stream` until the peer closes it
    ///
    /// The link answers SNRM/DISC itself; each delivered APDU is answered
    /// through [`CosemServer::handle_apdu`].
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the connection, if any
    pub async fn serve<S>(&self, stream: S) -> DlmsResult<()>
    where
        S: StreamAccessor + 'static,
    {
        let (link, LinkChannels { outbound, mut events }) = HdlcLayer::new(self.config.link.clone())?;
        let input = link.clone();
        let mut transport = tokio::spawn(dlms_transport::pump(stream, outbound, move |bytes: &[u8]| {
            input.handle_bytes(bytes)
        }));
        let mut association = Association::new();

        loop {
            tokio::select! {
                finished = &mut transport => {
                    association.reset();
                    return match finished {
                        Ok(result) => result,
                        Err(e) => Err(DlmsError::InvalidState(format!("Transport task failed: {}", e))),
                    };
                }
                Some(event) = events.recv() => match event {
                    LinkEvent::Data(apdu) => match self.handle_apdu(&mut association, &apdu).await {
                        Ok(response) => {
                            if let Err(e) = link.send_data(response).await {
                                log::warn!("Response not delivered: {}", e);
                            }
                        }
                        Err(e) => log::warn!("Request not answered: {}", e),
                    },
                    LinkEvent::Connected => {
                        log::info!("Client connected");
                        association.reset();
                    }
                    LinkEvent::Disconnected => {
                        log::info!("Client disconnected");
                        association.reset();
                    }
                    LinkEvent::FrameRejected { reason } => log::debug!("Frame rejected: {}", reason),
                },
            }
        }
    }

    /// Answer one received APDU
    ///
    /// # Errors
    ///
    /// Returns `Security` if the APDU cannot be unprotected, `Protocol` or
    /// `InvalidData` if it is not a request this server answers, and
    /// `InvalidState` for a service request before Initiate. No response is
    /// due in any of these cases.
    pub async fn handle_apdu(&self, association: &mut Association, apdu: &[u8]) -> DlmsResult<Bytes> {
        let plain = match &self.security {
            Some(security) => security.decrypt(apdu)?,
            None => Bytes::copy_from_slice(apdu),
        };
        let request = XdlmsPdu::decode(&plain)?;
        log::trace!("Received {}", request.name());
        let response = self.handle_pdu(association, request).await?;
        log::trace!("Answering with {}", response.name());
        let encoded = response.encode();
        match &self.security {
            Some(security) => security.encrypt(&encoded),
            None => Ok(encoded),
        }
    }

    /// Answer one decoded request
    pub async fn handle_pdu(&self, association: &mut Association, request: XdlmsPdu) -> DlmsResult<XdlmsPdu> {
        if let XdlmsPdu::InitiateRequest(request) = request {
            return self.initiate(association, request).map(XdlmsPdu::InitiateResponse);
        }
        if !association.is_established() {
            return Err(DlmsError::InvalidState(format!(
                "{} before Initiate",
                request.name()
            )));
        }
        match request {
            XdlmsPdu::GetRequest(request) => Ok(XdlmsPdu::GetResponse(self.get(association, request).await)),
            XdlmsPdu::SetRequest(request) => Ok(XdlmsPdu::SetResponse(self.set(association, request).await)),
            XdlmsPdu::ActionRequest(request) => {
                Ok(XdlmsPdu::ActionResponse(self.action(association, request).await))
            }
            other => Err(DlmsError::Protocol(format!(
                "{} is not a request",
                other.name()
            ))),
        }
    }

    fn initiate(&self, association: &mut Association, request: InitiateRequest) -> DlmsResult<InitiateResponse> {
        if request.proposed_dlms_version_number < self.config.dlms_version {
            return Err(DlmsError::Protocol(format!(
                "DLMS version {} not supported",
                request.proposed_dlms_version_number
            )));
        }
        let conformance = request.proposed_conformance & self.config.conformance;
        let response = InitiateResponse::new(conformance, self.config.max_receive_pdu_size);
        log::info!(
            "Association established: conformance {}, client receives up to {} bytes",
            conformance,
            request.client_max_receive_pdu_size
        );
        association.establish(response.clone(), request.client_max_receive_pdu_size);
        Ok(response)
    }

    /// The object addressed by a request, if the client may use it
    async fn resolve(
        &self,
        association: &Association,
        service: Conformance,
        class_id: u16,
        logical_name: &ObisCode,
        required: AccessLevel,
    ) -> Result<Arc<dyn CosemObject>, DataAccessResult> {
        if !association.conformance().contains(service) {
            log::debug!("Service {} not negotiated", service);
            return Err(DataAccessResult::ReadWriteDenied);
        }
        if let Some(security) = &self.security {
            if !security.authorize(self.config.client_id, logical_name, required) {
                log::warn!(
                    "Client {} denied {:?} on {}",
                    self.config.client_id,
                    required,
                    logical_name
                );
                return Err(DataAccessResult::ReadWriteDenied);
            }
        }
        let object = self
            .find_object(logical_name)
            .await
            .ok_or(DataAccessResult::ObjectUndefined)?;
        if object.class_id() != class_id {
            return Err(DataAccessResult::ObjectClassInconsistent);
        }
        Ok(object)
    }

    async fn read(
        &self,
        association: &Association,
        attribute: &CosemAttributeDescriptor,
        access: Option<&SelectiveAccessDescriptor>,
    ) -> Result<DataObject, DataAccessResult> {
        let object = self
            .resolve(
                association,
                Conformance::GET,
                attribute.class_id,
                &attribute.logical_name,
                AccessLevel::Read,
            )
            .await?;
        let id = member_id(attribute.attribute_id)?;
        object
            .get_attribute(id, access)
            .await
            .map_err(|e| access_result(&e))
    }

    async fn write(
        &self,
        association: &Association,
        attribute: &CosemAttributeDescriptor,
        access: Option<&SelectiveAccessDescriptor>,
        value: DataObject,
    ) -> DataAccessResult {
        match self.try_write(association, attribute, access, value).await {
            Ok(()) => DataAccessResult::Success,
            Err(result) => {
                log::debug!("SET {} failed: {}", attribute, result.as_str());
                result
            }
        }
    }

    async fn try_write(
        &self,
        association: &Association,
        attribute: &CosemAttributeDescriptor,
        access: Option<&SelectiveAccessDescriptor>,
        value: DataObject,
    ) -> Result<(), DataAccessResult> {
        let object = self
            .resolve(
                association,
                Conformance::SET,
                attribute.class_id,
                &attribute.logical_name,
                AccessLevel::Write,
            )
            .await?;
        let id = member_id(attribute.attribute_id)?;
        object
            .set_attribute(id, value, access)
            .await
            .map_err(|e| access_result(&e))
    }

    async fn get(&self, association: &mut Association, request: GetRequest) -> GetResponse {
        match request {
            GetRequest::Normal {
                invoke,
                attribute,
                access,
            } => {
                log::debug!("GET {}", attribute);
                association.get_transfers.remove(&invoke.invoke_id());
                match self.read(association, &attribute, access.as_ref()).await {
                    Ok(value) => respond_with_value(association, invoke, value),
                    Err(result) => {
                        log::debug!("GET {} failed: {}", attribute, result.as_str());
                        GetResponse::Normal {
                            invoke,
                            result: GetDataResult::Error(result),
                        }
                    }
                }
            }
            GetRequest::Next {
                invoke,
                block_number,
            } => next_block(association, invoke, block_number),
        }
    }

    async fn set(&self, association: &mut Association, request: SetRequest) -> SetResponse {
        match request {
            SetRequest::Normal {
                invoke,
                attribute,
                access,
                value,
            } => {
                log::debug!("SET {}", attribute);
                let result = self.write(association, &attribute, access.as_ref(), value).await;
                SetResponse::Normal { invoke, result }
            }
            SetRequest::WithFirstDataBlock {
                invoke,
                attribute,
                access,
                block,
            } => {
                log::debug!("SET {} in blocks", attribute);
                let id = invoke.invoke_id();
                if !association.conformance().contains(Conformance::BLOCK_TRANSFER_WITH_SET) {
                    return SetResponse::LastDataBlock {
                        invoke,
                        result: DataAccessResult::ReadWriteDenied,
                        block_number: block.block_number,
                    };
                }
                association.set_transfers.insert(
                    id,
                    SetTransfer {
                        attribute,
                        access,
                        assembler: BlockAssembler::new(),
                    },
                );
                self.set_block(association, invoke, block).await
            }
            SetRequest::WithDataBlock { invoke, block } => self.set_block(association, invoke, block).await,
        }
    }

    async fn set_block(&self, association: &mut Association, invoke: InvokeIdAndPriority, block: DataBlock) -> SetResponse {
        let id = invoke.invoke_id();
        let block_number = block.block_number;
        let Some(transfer) = association.set_transfers.get_mut(&id) else {
            return SetResponse::LastDataBlock {
                invoke,
                result: DataAccessResult::NoLongSetInProgress,
                block_number,
            };
        };
        if let Err(e) = transfer
            .assembler
            .push(block_number, block.last_block, &block.raw_data)
        {
            log::warn!("SET block transfer aborted: {}", e);
            association.set_transfers.remove(&id);
            return SetResponse::LastDataBlock {
                invoke,
                result: DataAccessResult::LongSetAborted,
                block_number,
            };
        }
        if !block.last_block {
            return SetResponse::DataBlock {
                invoke,
                block_number,
            };
        }

        let Some(SetTransfer {
            attribute,
            access,
            assembler,
        }) = association.set_transfers.remove(&id)
        else {
            return SetResponse::LastDataBlock {
                invoke,
                result: DataAccessResult::NoLongSetInProgress,
                block_number,
            };
        };
        let result = match assembler.finish().and_then(|data| decode_data(&data)) {
            Ok(value) => self.write(association, &attribute, access.as_ref(), value).await,
            Err(e) => {
                log::warn!("SET block data for {} unusable: {}", attribute, e);
                DataAccessResult::OtherReason
            }
        };
        SetResponse::LastDataBlock {
            invoke,
            result,
            block_number,
        }
    }

    async fn action(&self, association: &Association, request: ActionRequest) -> ActionResponse {
        let ActionRequest {
            invoke,
            method,
            parameters,
        } = request;
        log::debug!("ACTION {}", method);
        match self.invoke(association, &method, parameters).await {
            Ok(return_data) => ActionResponse {
                invoke,
                result: DataAccessResult::Success,
                return_data: return_data.map(GetDataResult::Data),
            },
            Err(result) => {
                log::debug!("ACTION {} failed: {}", method, result.as_str());
                ActionResponse {
                    invoke,
                    result,
                    return_data: None,
                }
            }
        }
    }

    async fn invoke(
        &self,
        association: &Association,
        method: &CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, DataAccessResult> {
        let object = self
            .resolve(
                association,
                Conformance::ACTION,
                method.class_id,
                &method.logical_name,
                AccessLevel::Write,
            )
            .await?;
        let id = member_id(method.method_id)?;
        object
            .invoke_method(id, parameters)
            .await
            .map_err(|e| access_result(&e))
    }
}

impl Default for CosemServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CosemServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosemServer")
            .field("config", &self.config)
            .field("security", &self.security.is_some())
            .finish()
    }
}

/// A Normal response if it fits the client, otherwise the first data block
fn respond_with_value(association: &mut Association, invoke: InvokeIdAndPriority, value: DataObject) -> GetResponse {
    let limit = association.max_response_size();
    let encoded = encode_data(&value);
    if encoded.len() + GET_NORMAL_OVERHEAD <= limit {
        return GetResponse::Normal {
            invoke,
            result: GetDataResult::Data(value),
        };
    }
    if !association.conformance().contains(Conformance::BLOCK_TRANSFER_WITH_GET) {
        log::warn!(
            "{} byte value exceeds the client limit of {} bytes",
            encoded.len(),
            limit
        );
        return GetResponse::Normal {
            invoke,
            result: GetDataResult::Error(DataAccessResult::OtherReason),
        };
    }

    let mut remaining: VecDeque<Bytes> = split_blocks(&encoded, limit.saturating_sub(GET_BLOCK_OVERHEAD)).into();
    log::debug!("Sending {} bytes in {} blocks", encoded.len(), remaining.len());
    let first = remaining.pop_front().unwrap_or_default();
    let last_block = remaining.is_empty();
    if !last_block {
        association.get_transfers.insert(
            invoke.invoke_id(),
            GetTransfer {
                block_number: 1,
                remaining,
            },
        );
    }
    GetResponse::WithDataBlock {
        invoke,
        last_block,
        block_number: 1,
        result: BlockData::Raw(first),
    }
}

/// Serve GET-Request-Next for the block after `acknowledged`
fn next_block(association: &mut Association, invoke: InvokeIdAndPriority, acknowledged: u32) -> GetResponse {
    let id = invoke.invoke_id();
    let failed = |block_number, result| GetResponse::WithDataBlock {
        invoke,
        last_block: true,
        block_number,
        result: BlockData::Error(result),
    };
    let Some(transfer) = association.get_transfers.get_mut(&id) else {
        return failed(acknowledged, DataAccessResult::NoLongGetInProgress);
    };
    if transfer.block_number != acknowledged {
        log::warn!(
            "GET-Request-Next for block {} while block {} is outstanding",
            acknowledged,
            transfer.block_number
        );
        association.get_transfers.remove(&id);
        return failed(acknowledged, DataAccessResult::LongGetAborted);
    }
    let Some(raw) = transfer.remaining.pop_front() else {
        association.get_transfers.remove(&id);
        return failed(acknowledged, DataAccessResult::NoLongGetInProgress);
    };
    transfer.block_number += 1;
    let block_number = transfer.block_number;
    let last_block = transfer.remaining.is_empty();
    if last_block {
        association.get_transfers.remove(&id);
    }
    GetResponse::WithDataBlock {
        invoke,
        last_block,
        block_number,
        result: BlockData::Raw(raw),
    }
}
