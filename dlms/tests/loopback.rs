//! Client connections against a CosemServer over in-memory pipes

use dlms::application::{CosemAttributeDescriptor, CosemMethodDescriptor};
use dlms::client::{ConnectionBuilder, ConnectionRegistry, MeterConnection};
use dlms::interface::{
    ActivityCalendar, CalendarPlan, DayProfile, DayProfileAction, Register, ScalerUnit, SeasonProfile,
    WeekProfile, units,
};
use dlms::security::{AccessControl, AccessLevel, AesGcmSecurity, SystemTitle};
use dlms::server::CosemServer;
use dlms::transport::IoTransport;
use dlms::{CosemDateTime, CosemTime, DataAccessResult, DataObject, DlmsError, ObisCode};
use std::sync::Arc;

const ENERGY: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
const CALENDAR: ObisCode = ObisCode::new(0, 0, 13, 0, 0, 255);
const SCRIPTS: ObisCode = ObisCode::new(0, 0, 10, 0, 100, 255);
const KEY: [u8; 16] = *b"0123456789ABCDEF";
const CLIENT_TITLE: SystemTitle = SystemTitle::new(*b"HEADEND1");
const METER_TITLE: SystemTitle = SystemTitle::new(*b"METER001");

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn plan(name: &str, switches: &[(u8, u16)]) -> CalendarPlan {
    let actions = switches
        .iter()
        .map(|(hour, tariff)| DayProfileAction::new(CosemTime::new(*hour, 0, 0), SCRIPTS, *tariff))
        .collect();
    CalendarPlan::new(name)
        .with_season(SeasonProfile::new(
            "year",
            CosemDateTime::new(0xFFFF, 1, 1, 0, 0, 0),
            "week",
        ))
        .with_week(WeekProfile::new("week", [1; 7]))
        .with_day(DayProfile::new(1, actions))
}

fn octets(value: &str) -> DataObject {
    DataObject::new_octet_string(value.as_bytes().to_vec())
}

fn attribute(class_id: u16, logical_name: ObisCode, id: i8) -> CosemAttributeDescriptor {
    CosemAttributeDescriptor::new(class_id, logical_name, id)
}

async fn meter() -> CosemServer {
    let server = CosemServer::new();
    let energy = Register::new(
        ENERGY,
        DataObject::new_unsigned32(123_456),
        ScalerUnit::new(0, units::WATT_HOUR),
    )
    .unwrap();
    server.register_object(Arc::new(energy)).await.unwrap();
    let calendar = ActivityCalendar::with_default_obis(plan("T1", &[(0, 1)])).unwrap();
    server.register_object(Arc::new(calendar)).await.unwrap();
    server
}

/// Serve `server` on one end of a pipe and open `builder` on the other
async fn connect(server: CosemServer, builder: ConnectionBuilder) -> MeterConnection {
    let (near, far) = tokio::io::duplex(4096);
    let server = Arc::new(server);
    tokio::spawn(async move {
        let _ = server.serve(IoTransport::new(far)).await;
    });
    builder.connect(IoTransport::new(near)).await.unwrap()
}

async fn write_passive(connection: &MeterConnection, next: &CalendarPlan) {
    let tables = [
        (6, DataObject::new_octet_string(next.name.clone())),
        (7, DataObject::Array(next.seasons.iter().map(SeasonProfile::to_data_object).collect())),
        (8, DataObject::Array(next.weeks.iter().map(WeekProfile::to_data_object).collect())),
        (9, DataObject::Array(next.days.iter().map(DayProfile::to_data_object).collect())),
    ];
    for (id, value) in tables {
        connection
            .set(attribute(ActivityCalendar::CLASS_ID, CALENDAR, id), value)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn read_register_and_switch_calendar() {
    init_logger();
    let mut connection = connect(meter().await, ConnectionBuilder::new("meter-1")).await;

    assert_eq!(
        connection.get(attribute(3, ENERGY, 2)).await.unwrap(),
        DataObject::new_unsigned32(123_456)
    );
    assert_eq!(
        connection.get(attribute(20, CALENDAR, 2)).await.unwrap(),
        octets("T1")
    );
    assert!(matches!(
        connection.set(attribute(20, CALENDAR, 2), octets("X")).await,
        Err(DlmsError::DataAccess(DataAccessResult::ReadWriteDenied))
    ));

    write_passive(&connection, &plan("T2", &[(6, 1), (22, 2)])).await;
    let activate = CosemMethodDescriptor::new(20, CALENDAR, 1);
    assert_eq!(
        connection
            .action(activate, Some(DataObject::new_integer8(0)))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        connection.get(attribute(20, CALENDAR, 2)).await.unwrap(),
        octets("T2")
    );
    assert_eq!(
        connection.get(attribute(20, CALENDAR, 6)).await.unwrap(),
        octets("T1")
    );

    connection.close().await.unwrap();
}

#[tokio::test]
async fn unknown_objects_and_members() {
    init_logger();
    let mut connection = connect(meter().await, ConnectionBuilder::new("meter-1")).await;

    let cases = [
        (attribute(3, ObisCode::new(1, 0, 2, 8, 0, 255), 2), DataAccessResult::ObjectUndefined),
        (attribute(3, ENERGY, 7), DataAccessResult::ObjectUndefined),
        (attribute(20, ENERGY, 2), DataAccessResult::ObjectClassInconsistent),
    ];
    for (attribute, expected) in cases {
        match connection.get(attribute).await {
            Err(DlmsError::DataAccess(result)) => assert_eq!(result, expected, "{}", attribute),
            other => panic!("{}: expected {:?}, got {:?}", attribute, expected, other),
        }
    }
    assert!(matches!(
        connection.action(CosemMethodDescriptor::new(3, ENERGY, 5), None).await,
        Err(DlmsError::DataAccess(DataAccessResult::ObjectUndefined))
    ));
    connection.close().await.unwrap();
}

#[tokio::test]
async fn small_pdu_moves_tables_in_blocks() {
    init_logger();
    let mut connection = connect(meter().await, ConnectionBuilder::new("meter-1").max_pdu_size(64)).await;
    assert_eq!(connection.application().max_pdu_size(), 64);

    // Six switching times encode to well over 64 bytes in both directions
    let next = plan("T3", &[(0, 2), (6, 1), (9, 3), (12, 1), (18, 3), (22, 2)]);
    write_passive(&connection, &next).await;

    let days = connection.get(attribute(20, CALENDAR, 9)).await.unwrap();
    let expected = DataObject::Array(next.days.iter().map(DayProfile::to_data_object).collect());
    assert_eq!(days, expected);
    assert!(dlms::asn1::encode_data(&days).len() > 64);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn protected_association_enforces_server_rights() {
    init_logger();
    let meter_security = AesGcmSecurity::new(&KEY, METER_TITLE, CLIENT_TITLE)
        .unwrap()
        .with_access_control(AccessControl::new(AccessLevel::Read));
    let server = meter().await.with_security(Arc::new(meter_security));
    let client_security = AesGcmSecurity::new(&KEY, CLIENT_TITLE, METER_TITLE).unwrap();
    let mut connection = connect(
        server,
        ConnectionBuilder::new("meter-1").security(Arc::new(client_security)),
    )
    .await;

    assert_eq!(
        connection.get(attribute(3, ENERGY, 2)).await.unwrap(),
        DataObject::new_unsigned32(123_456)
    );
    assert!(matches!(
        connection.set(attribute(3, ENERGY, 2), DataObject::new_unsigned32(0)).await,
        Err(DlmsError::DataAccess(DataAccessResult::ReadWriteDenied))
    ));
    connection.close().await.unwrap();
}

#[tokio::test]
async fn registry_tracks_several_meters() {
    init_logger();
    let registry = ConnectionRegistry::new();
    let mut first = connect(
        meter().await,
        ConnectionBuilder::new("meter-b").registry(registry.clone()),
    )
    .await;
    let mut second = connect(
        meter().await,
        ConnectionBuilder::new("meter-a").registry(registry.clone()),
    )
    .await;
    assert_eq!(registry.open_connections(), ["meter-a", "meter-b"]);

    let (a, b) = tokio::join!(
        first.get(attribute(3, ENERGY, 2)),
        second.get(attribute(20, CALENDAR, 2))
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(registry.stats("meter-b").unwrap().requests, 1);

    first.close().await.unwrap();
    assert_eq!(registry.open_connections(), ["meter-a"]);
    second.close().await.unwrap();
    assert!(registry.is_empty());
}
