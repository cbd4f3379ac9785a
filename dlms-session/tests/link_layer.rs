//! Link layer behaviour against a scripted peer

use bytes::Bytes;
use dlms_core::DlmsError;
use dlms_session::{
    FrameType, HdlcAddress, HdlcConfig, HdlcFrame, HdlcLayer, LinkChannels, LinkEvent,
    LinkParameters, LinkState,
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

const CLIENT: HdlcAddress = HdlcAddress::new(0x02, 0x02);
const METER: HdlcAddress = HdlcAddress::new(0x01, 0x01);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sent(channels: &mut LinkChannels) -> HdlcFrame {
    let bytes = channels.outbound.try_recv().expect("no frame was sent");
    HdlcFrame::decode(&bytes).unwrap()
}

fn ua(payload: Bytes) -> HdlcFrame {
    HdlcFrame::unnumbered(FrameType::UnnumberedAcknowledge, CLIENT, METER, payload)
}

fn rr(nr: u8) -> HdlcFrame {
    HdlcFrame::supervisory(FrameType::ReceiveReady, CLIENT, METER, nr)
}

async fn connect(config: HdlcConfig) -> (HdlcLayer, LinkChannels) {
    init_logger();
    let (link, mut channels) = HdlcLayer::new(config).unwrap();
    let mut connecting = task::spawn(link.connect());
    assert_pending!(connecting.poll());
    assert_eq!(sent(&mut channels).frame_type, FrameType::SetNormalResponseMode);
    link.handle_frame(ua(Bytes::new()));
    assert_ready_ok!(connecting.poll());
    drop(connecting);
    assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Connected);
    (link, channels)
}

#[tokio::test(start_paused = true)]
async fn connect_negotiates_parameters_from_ua() {
    init_logger();
    let (link, mut channels) = HdlcLayer::new(HdlcConfig::default()).unwrap();
    let mut connecting = task::spawn(link.connect());
    assert_pending!(connecting.poll());
    assert_eq!(link.state(), LinkState::Connecting);

    let snrm = sent(&mut channels);
    assert_eq!(snrm.destination, METER);
    assert_eq!(snrm.source, CLIENT);
    assert!(snrm.poll_final);
    let proposal = LinkParameters::decode(&snrm.payload).unwrap();
    assert_eq!(proposal.max_info_length_tx, 128);

    let meter = LinkParameters {
        max_info_length_tx: 64,
        max_info_length_rx: 96,
        window_size_tx: 1,
        window_size_rx: 1,
    };
    link.handle_frame(ua(meter.encode()));
    assert_ready_ok!(connecting.poll());

    assert_eq!(link.state(), LinkState::Connected);
    let agreed = link.parameters();
    assert_eq!(agreed.max_info_length_tx, 96);
    assert_eq!(agreed.max_info_length_rx, 64);
    assert_eq!(link.send_sequence(), 0);
    assert_eq!(link.receive_sequence(), 0);
    assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_without_ua_times_out() {
    init_logger();
    let (link, mut channels) = HdlcLayer::new(HdlcConfig::default()).unwrap();
    let started = Instant::now();

    let err = link.connect().await.unwrap_err();

    assert!(matches!(err, DlmsError::ResponseTimeout));
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(link.statistics().timeouts, 1);
    assert!(channels.events.try_recv().is_err());

    // a late UA must not resurrect the link
    let _ = sent(&mut channels);
    link.handle_frame(ua(Bytes::new()));
    assert_eq!(link.state(), LinkState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn second_connect_fails_fast() {
    let (link, _channels) = connect(HdlcConfig::default()).await;
    let err = link.connect().await.unwrap_err();
    assert!(matches!(err, DlmsError::InvalidState(_)));
}

#[tokio::test(start_paused = true)]
async fn send_sequence_advances_once_per_acknowledged_frame() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    for expected in 0..10u8 {
        let mut sending = task::spawn(link.send_data(Bytes::from_static(b"\xC0\x01")));
        assert_pending!(sending.poll());
        let frame = sent(&mut channels);
        assert_eq!(frame.frame_type, FrameType::Information);
        assert_eq!(frame.send_sequence, expected % 8);
        link.handle_frame(rr((expected + 1) % 8));
        assert_ready_ok!(sending.poll());
        assert_eq!(link.send_sequence(), (expected + 1) % 8);
    }
    assert_eq!(link.statistics().retransmissions, 0);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_frame_times_out_without_advancing() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let err = link
        .send_data(Bytes::from_static(b"lost"))
        .await
        .unwrap_err();
    assert!(matches!(err, DlmsError::ResponseTimeout));
    assert_eq!(link.send_sequence(), 0);
    assert_eq!(link.state(), LinkState::Connected);

    assert_eq!(sent(&mut channels).send_sequence, 0);
    let mut retry = task::spawn(link.send_data(Bytes::from_static(b"again")));
    assert_pending!(retry.poll());
    assert_eq!(sent(&mut channels).send_sequence, 0);
}

#[tokio::test(start_paused = true)]
async fn reject_retransmits_outstanding_frames() {
    let config = HdlcConfig {
        window_size: 2,
        ..HdlcConfig::default()
    };
    let (link, mut channels) = connect(config).await;

    let mut first = task::spawn(link.send_data(Bytes::from_static(b"one")));
    let mut second = task::spawn(link.send_data(Bytes::from_static(b"two")));
    assert_pending!(first.poll());
    assert_pending!(second.poll());
    assert_eq!(sent(&mut channels).send_sequence, 0);
    assert_eq!(sent(&mut channels).send_sequence, 1);

    link.handle_frame(HdlcFrame::supervisory(FrameType::Reject, CLIENT, METER, 0));
    let resent: Vec<_> = (0..2).map(|_| sent(&mut channels)).collect();
    assert_eq!(resent[0].send_sequence, 0);
    assert_eq!(resent[0].payload.as_ref(), b"one");
    assert_eq!(resent[1].send_sequence, 1);
    assert_eq!(resent[1].payload.as_ref(), b"two");
    assert_eq!(link.statistics().retransmissions, 2);

    link.handle_frame(rr(2));
    assert_ready_ok!(first.poll());
    assert_ready_ok!(second.poll());
    assert_eq!(link.send_sequence(), 2);
}

#[tokio::test(start_paused = true)]
async fn receive_not_ready_holds_queued_frames() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let mut first = task::spawn(link.send_data(Bytes::from_static(b"a")));
    assert_pending!(first.poll());
    sent(&mut channels);
    link.handle_frame(HdlcFrame::supervisory(
        FrameType::ReceiveNotReady,
        CLIENT,
        METER,
        1,
    ));
    assert_ready_ok!(first.poll());

    let mut second = task::spawn(link.send_data(Bytes::from_static(b"b")));
    assert_pending!(second.poll());
    assert!(channels.outbound.try_recv().is_err());

    link.handle_frame(rr(1));
    let frame = sent(&mut channels);
    assert_eq!(frame.send_sequence, 1);
    assert_eq!(frame.payload.as_ref(), b"b");
}

#[tokio::test(start_paused = true)]
async fn out_of_sequence_information_is_rejected() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    link.handle_frame(HdlcFrame::information(
        CLIENT,
        METER,
        3,
        0,
        Bytes::from_static(b"skip"),
    ));

    let rej = sent(&mut channels);
    assert_eq!(rej.frame_type, FrameType::Reject);
    assert_eq!(rej.receive_sequence, 0);
    assert!(matches!(
        channels.events.try_recv().unwrap(),
        LinkEvent::FrameRejected { .. }
    ));
    assert_eq!(link.receive_sequence(), 0);
    assert_eq!(link.statistics().sequence_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn accepted_information_is_acknowledged_and_delivered() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let wire = HdlcFrame::information(CLIENT, METER, 0, 0, Bytes::from_static(b"\xC4\x01\xC1"))
        .encode();
    let (head, tail) = wire.split_at(5);
    link.handle_bytes(head);
    assert!(channels.events.try_recv().is_err());
    link.handle_bytes(tail);

    assert_eq!(
        channels.events.try_recv().unwrap(),
        LinkEvent::Data(Bytes::from_static(b"\xC4\x01\xC1"))
    );
    let ack = sent(&mut channels);
    assert_eq!(ack.frame_type, FrameType::ReceiveReady);
    assert_eq!(ack.receive_sequence, 1);
    assert_eq!(link.receive_sequence(), 1);
}

#[tokio::test(start_paused = true)]
async fn silence_mid_frame_discards_partial_bytes() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let wire = HdlcFrame::information(CLIENT, METER, 0, 0, Bytes::from_static(b"slow"))
        .encode();
    let (head, tail) = wire.split_at(6);
    link.handle_bytes(head);
    tokio::time::sleep(Duration::from_millis(150)).await;
    link.handle_bytes(tail);

    assert!(
        !matches!(channels.events.try_recv(), Ok(LinkEvent::Data(_))),
        "partial frame must not be delivered"
    );
    assert_eq!(link.receive_sequence(), 0);
    assert!(link.statistics().invalid_frames >= 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_reports_exactly_once() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let mut releasing = task::spawn(link.disconnect());
    assert_pending!(releasing.poll());
    assert_eq!(link.state(), LinkState::Disconnecting);
    assert_eq!(sent(&mut channels).frame_type, FrameType::Disconnect);

    link.handle_frame(ua(Bytes::new()));
    assert_ready_ok!(releasing.poll());
    drop(releasing);
    assert_eq!(link.state(), LinkState::Disconnected);

    link.handle_frame(HdlcFrame::unnumbered(
        FrameType::DisconnectMode,
        CLIENT,
        METER,
        Bytes::new(),
    ));
    assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Disconnected);
    assert!(channels.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disconnect_without_reply_still_lands_disconnected() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let err = link.disconnect().await.unwrap_err();

    assert!(matches!(err, DlmsError::ResponseTimeout));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn unsolicited_dm_fails_pending_sends() {
    let (link, mut channels) = connect(HdlcConfig::default()).await;

    let mut sending = task::spawn(link.send_data(Bytes::from_static(b"pending")));
    assert_pending!(sending.poll());
    link.handle_frame(HdlcFrame::unnumbered(
        FrameType::DisconnectMode,
        CLIENT,
        METER,
        Bytes::new(),
    ));

    let result = assert_ready!(sending.poll());
    assert!(matches!(result, Err(DlmsError::ConnectionClosed)));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(channels.events.try_recv().unwrap(), LinkEvent::Disconnected);
}
