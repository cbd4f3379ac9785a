//! MeterConnection against a scripted meter over an in-memory pipe

use dlms_application::{
    ActionResponse, CosemAttributeDescriptor, CosemMethodDescriptor, GetDataResult, GetRequest,
    GetResponse, InitiateResponse, SetRequest, SetResponse, XdlmsPdu,
};
use dlms_client::{ConnectionBuilder, ConnectionRegistry, ConnectionState};
use dlms_core::{DataAccessResult, DataObject, DlmsError, ObisCode};
use dlms_session::{HdlcConfig, HdlcLayer, LinkChannels, LinkEvent, LinkState};
use dlms_transport::{IoTransport, pump};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Answers like a meter holding a single register at 1-0:1.8.0.255
fn answer(request: XdlmsPdu) -> Option<XdlmsPdu> {
    Some(match request {
        XdlmsPdu::InitiateRequest(request) => {
            XdlmsPdu::InitiateResponse(InitiateResponse::new(request.proposed_conformance, 256))
        }
        XdlmsPdu::GetRequest(GetRequest::Normal { invoke, attribute, .. }) => {
            let result = if attribute.logical_name == ENERGY {
                GetDataResult::Data(DataObject::new_unsigned32(12_345))
            } else {
                GetDataResult::Error(DataAccessResult::ObjectUndefined)
            };
            XdlmsPdu::GetResponse(GetResponse::Normal { invoke, result })
        }
        XdlmsPdu::SetRequest(SetRequest::Normal { invoke, .. }) => XdlmsPdu::SetResponse(SetResponse::Normal {
            invoke,
            result: DataAccessResult::ReadWriteDenied,
        }),
        XdlmsPdu::ActionRequest(request) => XdlmsPdu::ActionResponse(ActionResponse {
            invoke: request.invoke,
            result: DataAccessResult::Success,
            return_data: None,
        }),
        _ => return None,
    })
}

fn spawn_meter(stream: DuplexStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (link, channels) = HdlcLayer::new(HdlcConfig::server()).unwrap();
        let LinkChannels { outbound, mut events } = channels;
        let input = link.clone();
        tokio::spawn(pump(IoTransport::new(stream), outbound, move |bytes: &[u8]| {
            input.handle_bytes(bytes)
        }));
        while let Some(event) = events.recv().await {
            if let LinkEvent::Data(apdu) = event {
                let request = XdlmsPdu::decode(&apdu).unwrap();
                if let Some(response) = answer(request) {
                    let _ = link.send_data(response.encode()).await;
                }
            }
        }
    })
}

#[tokio::test]
async fn open_exchange_and_close() {
    init_logger();
    let (near, far) = tokio::io::duplex(1024);
    let meter = spawn_meter(far);
    let registry = ConnectionRegistry::new();

    let mut connection = ConnectionBuilder::new("meter-1")
        .registry(registry.clone())
        .build(IoTransport::new(near))
        .unwrap();
    let negotiated = connection.open().await.unwrap();
    assert_eq!(negotiated.server_max_receive_pdu_size, 256);
    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(connection.application().max_pdu_size(), 256);
    assert!(registry.is_open("meter-1"));

    let energy = CosemAttributeDescriptor::new(3, ENERGY, 2);
    assert_eq!(
        connection.get(energy).await.unwrap(),
        DataObject::new_unsigned32(12_345)
    );

    let unknown = CosemAttributeDescriptor::new(3, ObisCode::new(1, 0, 2, 8, 0, 255), 2);
    assert!(matches!(
        connection.get(unknown).await,
        Err(DlmsError::DataAccess(DataAccessResult::ObjectUndefined))
    ));
    assert!(matches!(
        connection.set(energy, DataObject::new_unsigned32(0)).await,
        Err(DlmsError::DataAccess(DataAccessResult::ReadWriteDenied))
    ));
    let reset = CosemMethodDescriptor::new(3, ENERGY, 1);
    assert_eq!(connection.action(reset, Some(DataObject::new_integer8(0))).await.unwrap(), None);

    let stats = registry.stats("meter-1").unwrap();
    assert_eq!((stats.requests, stats.failures), (4, 2));

    connection.close().await.unwrap();
    assert_eq!(connection.link_state(), LinkState::Disconnected);
    assert!(registry.is_empty());
    assert!(matches!(
        connection.get(energy).await,
        Err(DlmsError::InvalidState(_))
    ));
    meter.abort();
}

#[tokio::test]
async fn concurrent_requests_complete_independently() {
    init_logger();
    let (near, far) = tokio::io::duplex(1024);
    let meter = spawn_meter(far);
    let connection = ConnectionBuilder::new("meter-2")
        .connect(IoTransport::new(near))
        .await
        .unwrap();

    let energy = CosemAttributeDescriptor::new(3, ENERGY, 2);
    let name = CosemAttributeDescriptor::new(3, ENERGY, 1);
    let missing = CosemAttributeDescriptor::new(1, ObisCode::new(0, 0, 96, 1, 0, 255), 2);
    let (a, b, c) = tokio::join!(
        connection.get(energy),
        connection.get(name),
        connection.get(missing)
    );
    assert_eq!(a.unwrap(), DataObject::new_unsigned32(12_345));
    assert_eq!(b.unwrap(), DataObject::new_unsigned32(12_345));
    assert!(c.is_err());
    assert_eq!(connection.application().pending_count(), 0);
    meter.abort();
}

#[tokio::test(start_paused = true)]
async fn open_fails_when_meter_is_silent() {
    init_logger();
    let (near, _far) = tokio::io::duplex(1024);
    let registry = ConnectionRegistry::new();
    let mut connection = ConnectionBuilder::new("meter-3")
        .registry(registry.clone())
        .build(IoTransport::new(near))
        .unwrap();

    assert!(matches!(connection.open().await, Err(DlmsError::ResponseTimeout)));
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(connection.link_state(), LinkState::Disconnected);
    assert!(registry.is_empty());
    assert!(matches!(connection.open().await, Err(DlmsError::InvalidState(_))));
}
