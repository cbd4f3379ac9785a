//! CosemServer::serve driven by a bare client link over an in-memory pipe

use bytes::Bytes;
use dlms_application::{
    Conformance, CosemAttributeDescriptor, DataBlock, GetDataResult, GetRequest, GetResponse,
    InitiateRequest, InvokeIdAndPriority, Priority, SelectiveAccessDescriptor, SetRequest,
    SetResponse, XdlmsPdu,
};
use dlms_asn1::encode_data;
use dlms_core::{DataAccessResult, DataObject, ObisCode};
use dlms_interface::{Register, ScalerUnit, units};
use dlms_server::{CosemServer, ServerConfig};
use dlms_session::{HdlcConfig, HdlcLayer, LinkChannels, LinkEvent};
use dlms_transport::{IoTransport, pump};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn invoke(id: u8) -> InvokeIdAndPriority {
    InvokeIdAndPriority::new(id, Priority::Normal).unwrap()
}

struct Client {
    link: HdlcLayer,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Client {
    async fn connect(stream: DuplexStream) -> Self {
        let (link, LinkChannels { outbound, events }) = HdlcLayer::new(HdlcConfig::default()).unwrap();
        let input = link.clone();
        tokio::spawn(pump(IoTransport::new(stream), outbound, move |bytes: &[u8]| {
            input.handle_bytes(bytes)
        }));
        link.connect().await.unwrap();
        Self { link, events }
    }

    async fn exchange(&mut self, request: XdlmsPdu) -> XdlmsPdu {
        self.link.send_data(request.encode()).await.unwrap();
        loop {
            if let LinkEvent::Data(apdu) = self.events.recv().await.unwrap() {
                return XdlmsPdu::decode(&apdu).unwrap();
            }
        }
    }

    async fn initiate(&mut self, conformance: Conformance, max_receive_pdu_size: u16) {
        let request = XdlmsPdu::InitiateRequest(InitiateRequest::new(conformance, max_receive_pdu_size));
        let XdlmsPdu::InitiateResponse(response) = self.exchange(request).await else {
            panic!("expected InitiateResponse");
        };
        assert_eq!(response.negotiated_conformance, conformance);
    }
}

async fn start(server: CosemServer) -> (Client, tokio::task::JoinHandle<dlms_core::DlmsResult<()>>) {
    let (near, far) = tokio::io::duplex(1024);
    let server = Arc::new(server);
    let serving = tokio::spawn(async move { server.serve(IoTransport::new(far)).await });
    (Client::connect(near).await, serving)
}

async fn meter() -> CosemServer {
    let server = CosemServer::new();
    let energy = Register::new(
        ENERGY,
        DataObject::new_unsigned32(4_200),
        ScalerUnit::new(0, units::WATT_HOUR),
    )
    .unwrap();
    server.register_object(Arc::new(energy)).await.unwrap();
    server
}

#[tokio::test]
async fn request_before_initiate_is_not_answered() {
    init_logger();
    let (mut client, _serving) = start(meter().await).await;

    let early = XdlmsPdu::GetRequest(GetRequest::Normal {
        invoke: invoke(1),
        attribute: CosemAttributeDescriptor::new(3, ENERGY, 2),
        access: None,
    });
    client.link.send_data(early.encode()).await.unwrap();

    // The first answer belongs to the Initiate sent afterwards
    client.initiate(Conformance::GET, 512).await;
}

#[tokio::test]
async fn get_set_and_result_codes() {
    init_logger();
    let (mut client, _serving) = start(meter().await).await;
    client.initiate(Conformance::GET | Conformance::SET, 512).await;

    let value = CosemAttributeDescriptor::new(3, ENERGY, 2);
    let set = XdlmsPdu::SetRequest(SetRequest::Normal {
        invoke: invoke(2),
        attribute: value,
        access: None,
        value: DataObject::new_unsigned32(4_321),
    });
    assert_eq!(
        client.exchange(set).await,
        XdlmsPdu::SetResponse(SetResponse::Normal {
            invoke: invoke(2),
            result: DataAccessResult::Success,
        })
    );

    let get = XdlmsPdu::GetRequest(GetRequest::Normal {
        invoke: invoke(3),
        attribute: value,
        access: None,
    });
    assert_eq!(
        client.exchange(get).await,
        XdlmsPdu::GetResponse(GetResponse::Normal {
            invoke: invoke(3),
            result: GetDataResult::Data(DataObject::new_unsigned32(4_321)),
        })
    );

    let scaler_unit = XdlmsPdu::SetRequest(SetRequest::Normal {
        invoke: invoke(4),
        attribute: CosemAttributeDescriptor::new(3, ENERGY, 3),
        access: None,
        value: DataObject::new_unsigned32(0),
    });
    assert_eq!(
        client.exchange(scaler_unit).await,
        XdlmsPdu::SetResponse(SetResponse::Normal {
            invoke: invoke(4),
            result: DataAccessResult::ReadWriteDenied,
        })
    );
}

#[tokio::test]
async fn set_in_blocks_is_reassembled() {
    init_logger();
    let (mut client, _serving) = start(meter().await).await;
    client
        .initiate(Conformance::SET | Conformance::BLOCK_TRANSFER_WITH_SET, 512)
        .await;

    let encoded = encode_data(&DataObject::new_unsigned32(77));
    let (head, tail) = encoded.split_at(2);
    let first = XdlmsPdu::SetRequest(SetRequest::WithFirstDataBlock {
        invoke: invoke(5),
        attribute: CosemAttributeDescriptor::new(3, ENERGY, 2),
        access: None,
        block: DataBlock {
            last_block: false,
            block_number: 1,
            raw_data: Bytes::copy_from_slice(head),
        },
    });
    assert_eq!(
        client.exchange(first).await,
        XdlmsPdu::SetResponse(SetResponse::DataBlock {
            invoke: invoke(5),
            block_number: 1,
        })
    );
    let last = XdlmsPdu::SetRequest(SetRequest::WithDataBlock {
        invoke: invoke(5),
        block: DataBlock {
            last_block: true,
            block_number: 2,
            raw_data: Bytes::copy_from_slice(tail),
        },
    });
    assert_eq!(
        client.exchange(last).await,
        XdlmsPdu::SetResponse(SetResponse::LastDataBlock {
            invoke: invoke(5),
            result: DataAccessResult::Success,
            block_number: 2,
        })
    );
}

#[tokio::test]
async fn selective_access_survives_block_set() {
    init_logger();
    let (mut client, _serving) = start(meter().await).await;
    client
        .initiate(
            Conformance::GET | Conformance::SET | Conformance::BLOCK_TRANSFER_WITH_SET,
            512,
        )
        .await;

    let value = CosemAttributeDescriptor::new(3, ENERGY, 2);
    let encoded = encode_data(&DataObject::new_unsigned32(9));
    let (head, tail) = encoded.split_at(3);
    let first = XdlmsPdu::SetRequest(SetRequest::WithFirstDataBlock {
        invoke: invoke(6),
        attribute: value,
        access: Some(SelectiveAccessDescriptor::new(1, DataObject::Null)),
        block: DataBlock {
            last_block: false,
            block_number: 1,
            raw_data: Bytes::copy_from_slice(head),
        },
    });
    assert_eq!(
        client.exchange(first).await,
        XdlmsPdu::SetResponse(SetResponse::DataBlock {
            invoke: invoke(6),
            block_number: 1,
        })
    );
    let last = XdlmsPdu::SetRequest(SetRequest::WithDataBlock {
        invoke: invoke(6),
        block: DataBlock {
            last_block: true,
            block_number: 2,
            raw_data: Bytes::copy_from_slice(tail),
        },
    });
    assert_eq!(
        client.exchange(last).await,
        XdlmsPdu::SetResponse(SetResponse::LastDataBlock {
            invoke: invoke(6),
            result: DataAccessResult::ScopeOfAccessViolated,
            block_number: 2,
        })
    );

    let get = XdlmsPdu::GetRequest(GetRequest::Normal {
        invoke: invoke(7),
        attribute: value,
        access: None,
    });
    assert_eq!(
        client.exchange(get).await,
        XdlmsPdu::GetResponse(GetResponse::Normal {
            invoke: invoke(7),
            result: GetDataResult::Data(DataObject::new_unsigned32(4_200)),
        })
    );
}

#[tokio::test]
async fn serve_ends_when_client_goes_away() {
    init_logger();
    let server = Arc::new(CosemServer::with_config(ServerConfig::default()).unwrap());
    let (near, far) = tokio::io::duplex(256);
    let serving = tokio::spawn(async move { server.serve(IoTransport::new(far)).await });
    drop(near);
    serving.await.unwrap().unwrap();
}
