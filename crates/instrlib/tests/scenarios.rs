//! End-to-end scenarios: discovery through the facades, against mock
//! ports.

use std::sync::Arc;
use std::time::Duration;

use instrlib::cordis::protocol::{format_query, format_set, parse_query_reply, parse_set_echo, ReplyRule};
use instrlib::cordis::{
    CordisBuilder, ControllerVariant, LeakTestConfig, SetOutcome, Telemetry,
};
use instrlib::discovery::{connect, Prober, CONSOLE_PORT};
use instrlib::{DeviceKind, Error, Instrument, InstrumentFamily, Reading, ERR};
use instrlib_test_harness::{MockLock, MockOpener, MockTransport};

/// Identify frame and a typical reply for every family.
const BENCH: [(InstrumentFamily, &[u8], &[u8]); 5] = [
    (
        InstrumentFamily::Fluke8846,
        b"\r*idn?\r",
        b"FLUKE,8846A,1234567,08/02/10-11:53\r",
    ),
    (
        InstrumentFamily::Fluke2700,
        b"\r*idn?\r",
        b"FLUKE,2700G,9876543,1.04\r",
    ),
    (
        InstrumentFamily::Pace1000,
        b"\r\n*idn?\r\n",
        b"*IDN GE Druck,PACE1000,2345678,02.00.05\r\n",
    ),
    (InstrumentFamily::Cordis, b"?ID\r", b"ID CS-5090 rev2\r"),
    (
        InstrumentFamily::SureFlow,
        b"\r*\r",
        b"A +014.70 +022.1 +000.00 +000.00\r",
    ),
];

const IDENTIFY_FRAMES: [&[u8]; 4] = [b"\r*idn?\r", b"\r\n*idn?\r\n", b"?ID\r", b"\r*\r"];

fn prober(opener: &MockOpener, lock: &MockLock) -> Prober {
    Prober::new(Arc::new(opener.clone()), Arc::new(lock.clone()))
}

/// A mock that answers `?ID`/`?SN` like a Cordis board.
fn cordis_port(model: &'static [u8]) -> impl Fn() -> MockTransport + Send + Sync + 'static {
    move || {
        let mut mock = MockTransport::responder();
        mock.reply(b"?ID\r", model).reply(b"?SN\r", b"SN 12345\r");
        mock
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_identify_cs5090_and_read_serial() {
    let mut opener = MockOpener::new();
    opener.add_port("/dev/ttyUSB0", cordis_port(b"ID CS-5090 rev2\r"));
    let lock = MockLock::new();

    let hit = prober(&opener, &lock).identify("/dev/ttyUSB0").await.unwrap();
    assert_eq!(hit.classification.family, InstrumentFamily::Cordis);
    assert_eq!(hit.classification.kind, DeviceKind::FlowController);
    assert_eq!(hit.classification.response, "ID CS-5090 rev2");

    let controller = CordisBuilder::new()
        .build_from_probe(&hit.classification, hit.transport, hit.lock)
        .await
        .unwrap();
    assert_eq!(controller.variant(), ControllerVariant::Cs5090);
    assert_eq!(controller.info().serial_number, "12345");
    assert_eq!(controller.get_telemetry(Telemetry::SerialNumber).await, "12345");
    assert!(lock.is_held("/dev/ttyUSB0"));

    drop(controller);
    assert!(!lock.is_held("/dev/ttyUSB0"));
}

#[tokio::test]
async fn scenario_set_command_zero() {
    let mut mock = MockTransport::new();
    mock.expect(b"?ID\r", b"ID CS-1000\r");
    mock.expect(b"?SN\r", b"SN 12345\r");
    mock.expect(b"\r", b"");
    mock.expect(b"CZERO: 10\r", b"CZERO: 10\r");

    let controller = CordisBuilder::new()
        .build_with_transport(Box::new(mock))
        .await
        .unwrap();
    let outcome = controller
        .set_telemetry(Telemetry::CommandZero, "10")
        .await
        .unwrap();
    assert_eq!(outcome, SetOutcome::Accepted);
    assert_eq!(controller.snapshot().await.command_zero, "10");
}

#[tokio::test]
async fn scenario_status_fields_and_garbage() {
    let mut mock = MockTransport::new();
    mock.expect(b"?ID\r", b"ID CS-1000\r");
    mock.expect(b"?SN\r", b"SN 12345\r");
    mock.expect(b"?STAT\r", b": C:1.0  S:2.0  E:3.0\r");
    mock.expect(b"?STAT\r", b"garbage\r");

    let controller = CordisBuilder::new()
        .build_with_transport(Box::new(mock))
        .await
        .unwrap();

    let status = controller.get_status().await;
    assert_eq!(
        (status.command.as_str(), status.monitor.as_str(), status.exhaust.as_str()),
        ("1.0", "2.0", "3.0")
    );
    assert_eq!(controller.reading().await, Reading::new("2.0", ""));

    let status = controller.get_status().await;
    assert_eq!(
        (status.command.as_str(), status.monitor.as_str(), status.exhaust.as_str()),
        (ERR, ERR, ERR)
    );
}

#[tokio::test]
async fn scenario_leak_test_restores_valves() {
    let mut mock = MockTransport::new();
    mock.expect(b"?ID\r", b"ID CS-1000\r");
    mock.expect(b"?SN\r", b"SN 12345\r");
    mock.expect(b"\r", b"");
    mock.expect(b"DVALVE: 5\r", b"DVALVE: 5\r");
    mock.expect(b"?STAT\r", b": C:0  S:100.0  E:0\r");
    mock.expect(b"?STAT\r", b": C:0  S:99.9  E:0\r");
    mock.expect(b"?STAT\r", b": C:0  S:99.5  E:0\r");
    mock.expect(b"\r", b"");
    mock.expect(b"DVALVE: 0\r", b"DVALVE: 0\r");
    let log = mock.log();

    let controller = CordisBuilder::new()
        .build_with_transport(Box::new(mock))
        .await
        .unwrap();
    let before = controller.valve_state().await;

    let report = controller
        .leak_test(LeakTestConfig::new(-0.4).deadline(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(report.baseline, 100.0);
    assert_eq!(report.final_monitor, 99.5);
    assert_eq!(controller.valve_state().await, before);
    assert_eq!(log.sent().last(), Some(&b"DVALVE: 0\r".to_vec()));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Each family's prober matches only its own signature, even when the port
/// answers every identify frame.
#[tokio::test]
async fn prober_matches_only_its_own_signature() {
    for (family, _, reply) in BENCH {
        let mut opener = MockOpener::new();
        opener.add_port("/dev/ttyUSB0", move || {
            let mut mock = MockTransport::responder();
            for frame in IDENTIFY_FRAMES {
                mock.reply(frame, reply);
            }
            mock
        });
        let lock = MockLock::new();
        let p = prober(&opener, &lock);

        for (probed, _, _) in BENCH {
            let result = p.identify_as("/dev/ttyUSB0", probed).await;
            if probed == family {
                let hit = result.unwrap();
                assert_eq!(hit.classification.family, family);
            } else {
                assert!(
                    matches!(result, Err(Error::NotMatched)),
                    "{probed} matched a {family} reply"
                );
            }
            assert!(!lock.is_held("/dev/ttyUSB0"));
        }
    }
}

#[test]
fn format_echo_parse_recovers_value() {
    for value in ["10", "-0.4", "99.55", "CS-2000", ""] {
        let frame = String::from_utf8(format_set("CZERO", value)).unwrap();
        let echo = parse_set_echo(&frame);
        assert!(echo.accepted("CZERO"));
        assert_eq!(echo.value, value);

        let query = String::from_utf8(format_query("CZERO")).unwrap();
        assert_eq!(query, "?CZERO\r");
        let reply = format!("CZERO: {value}\r");
        assert_eq!(parse_query_reply("CZERO", &reply, ReplyRule::EchoedKeyword), value);
    }
}

#[tokio::test]
async fn set_outcome_follows_echo_prefix() {
    let cases: [(&[u8], SetOutcome, &str); 4] = [
        (b"PIDP: 2.5\r", SetOutcome::Accepted, "2.5"),
        (b"\r", SetOutcome::Rejected, ""),
        (b"ERROR: bad value\r", SetOutcome::Rejected, "ERROR: bad value"),
        (b"PIDI: 2.5\r", SetOutcome::Rejected, "PIDI: 2.5"),
    ];

    for (echo, expected, cached) in cases {
        let mut mock = MockTransport::new();
        mock.expect(b"?ID\r", b"ID CS-1000\r");
        mock.expect(b"?SN\r", b"SN 12345\r");
        mock.expect(b"\r", b"");
        mock.expect(b"PIDP: 2.5\r", echo);
        let controller = CordisBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let outcome = controller.set_telemetry(Telemetry::PidP, "2.5").await.unwrap();
        assert_eq!(outcome, expected, "{}", String::from_utf8_lossy(echo));
        assert_eq!(controller.snapshot().await.pid_p, cached);
    }
}

#[tokio::test]
async fn missing_status_delimiter_only_affects_its_fields() {
    let mut mock = MockTransport::new();
    mock.expect(b"?ID\r", b"ID CS-1000\r");
    mock.expect(b"?SN\r", b"SN 12345\r");
    mock.expect(b"?STAT\r", b": C:1.0 S:2.0  E:3.0\r");
    let controller = CordisBuilder::new()
        .build_with_transport(Box::new(mock))
        .await
        .unwrap();

    let status = controller.get_status().await;
    assert_eq!(status.command, ERR);
    assert_eq!(status.monitor, ERR);
    assert_eq!(status.exhaust, "3.0");
}

#[tokio::test]
async fn concurrent_callers_never_interleave() {
    let mut mock = MockTransport::responder();
    mock.reply(b"?ID\r", b"ID CS-1000\r")
        .reply(b"?SN\r", b"SN 12345\r")
        .reply(b"?CZERO\r", b"CZERO: 1\r")
        .reply(b"?CFS\r", b"CFS: 2\r")
        .reply(b"?MZERO\r", b"MZERO: 3\r")
        .reply(b"?MFS\r", b"MFS: 4\r");
    mock.set_latency(Duration::from_millis(1));
    let log = mock.log();
    let controller = Arc::new(
        CordisBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap(),
    );

    let queries = [
        (Telemetry::CommandZero, "1"),
        (Telemetry::CommandFullScale, "2"),
        (Telemetry::MonitorZero, "3"),
        (Telemetry::MonitorFullScale, "4"),
    ];
    let mut tasks = Vec::new();
    for round in 0..8 {
        for (telemetry, expected) in queries {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                let value = controller.get_telemetry(telemetry).await;
                assert_eq!(value, expected, "round {round} {telemetry}");
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(log.every_send_cleared_first());
    let frames = log.sent();
    assert_eq!(frames.len(), 2 + 8 * queries.len());
    assert!(frames.iter().all(|f| f.starts_with(b"?") && f.ends_with(b"\r")));
}

// ---------------------------------------------------------------------------
// Bench sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_finds_every_instrument_once() {
    let mut opener = MockOpener::new();
    opener
        .add_port("/dev/ttyUSB0", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"?ID\r", b"ID CS-1000\r")
                .reply(b"?STAT\r", b": C:1.0  S:2.0  E:3.0\r")
                .reply(b"?SN\r", b"SN 11111\r");
            mock
        })
        .add_port("/dev/ttyUSB1", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"\r*idn?\r", b"FLUKE,8846A,1234567,08/02/10-11:53\r")
                .reply(b"\rCONF?\r", b"\"VOLT +1.00000000E+01,+3.00000000E-06\"\r")
                .reply(b"\rFETCH3?\r", b"+1.25\r");
            mock
        })
        .add_port("/dev/ttyUSB2", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"\r\n*idn?\r\n", b"*IDN GE Druck,PACE1000,2345678,02.00.05\r\n")
                .reply(b"\r\n:SENS:PRES?\r\n", b":SENS:PRES 14.6959\r\n")
                .reply(b"\r\n:UNIT:PRES?\r\n", b":UNIT:PRES PSI\r\n");
            mock
        })
        .add_port("/dev/ttyUSB3", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"\r*\r", b"A +014.70 +022.1 +000.00 +000.00\r")
                .reply(b"\rA r76\r", b"A r76 = 4242\r")
                .reply(b"\rA\r", b"A +014.70 +022.1 +012.34 +011.98\r");
            mock
        })
        .add_port("/dev/ttyUSB4", || {
            let mut mock = MockTransport::responder();
            mock.reply(b"?ID\r", b"ID ES-100\r")
                .reply(b"?STAT\r", b"ADC::1.234 | SL::0.0 | SH::5.0 | OL::0.5 | OH::4.5\r")
                .reply(b"?SN\r", b"SN 22222\r");
            mock
        })
        .add_port("/dev/ttyUSB5", || MockTransport::responder())
        .add_port("/dev/ttyUSB6", || MockTransport::responder())
        .add_port(CONSOLE_PORT, || MockTransport::responder());
    let mut lock = MockLock::new();
    lock.busy("/dev/ttyUSB6");

    let ports: Vec<String> = [
        CONSOLE_PORT,
        "/dev/ttyUSB0",
        "/dev/ttyUSB1",
        "/dev/ttyUSB2",
        "/dev/ttyUSB3",
        "/dev/ttyUSB4",
        "/dev/ttyUSB5",
        "/dev/ttyUSB6",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();

    let hits = prober(&opener, &lock).sweep(&ports).await;
    let found: Vec<(&str, DeviceKind)> = hits
        .iter()
        .map(|h| (h.classification.port.as_str(), h.classification.kind))
        .collect();
    assert_eq!(
        found,
        vec![
            ("/dev/ttyUSB0", DeviceKind::FlowController),
            ("/dev/ttyUSB1", DeviceKind::Multimeter),
            ("/dev/ttyUSB2", DeviceKind::PressureStandard),
            ("/dev/ttyUSB3", DeviceKind::FlowStandard),
            ("/dev/ttyUSB4", DeviceKind::ExternalSensor),
        ]
    );
    assert!(opener.opened().iter().all(|(port, _)| port != CONSOLE_PORT && port != "/dev/ttyUSB6"));

    let mut devices = Vec::new();
    let mut readings = Vec::new();
    for hit in hits {
        let device = connect(hit).await.unwrap();
        device.update_values().await.unwrap();
        readings.push((device.info().serial_number.clone(), device.reading().await));
        devices.push(device);
    }
    assert_eq!(
        readings,
        vec![
            ("11111".to_string(), Reading::new("2.0", "")),
            ("1234567".to_string(), Reading::new("+1.25", "V")),
            ("2345678".to_string(), Reading::new("14.6959", "PSI")),
            ("4242".to_string(), Reading::new("11.98", "sccm")),
            ("22222".to_string(), Reading::new("1.234", "")),
        ]
    );
    assert!(lock.is_held("/dev/ttyUSB0"));
    assert!(!lock.is_held("/dev/ttyUSB5"));

    drop(devices);
    assert!(!lock.is_held("/dev/ttyUSB0"));
}
