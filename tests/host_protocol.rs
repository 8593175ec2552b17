//! The host text protocol: length-framed request/response, pre-transport.

mod common;

use adbmockd::codec;

#[tokio::test]
async fn devices_reports_serial_and_state() {
    let (addr, device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, payload) = common::host_request(&mut socket, "devices").await;

    assert!(ok);
    assert_eq!(payload, format!("{}\tdevice\n", device.serial()));
}

#[tokio::test]
async fn version_reports_fixed_protocol_version() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, payload) = common::host_request(&mut socket, "version").await;

    assert!(ok);
    assert_eq!(payload, "001f");
}

#[tokio::test]
async fn unknown_command_fails_but_connection_survives() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, _) = common::host_request(&mut socket, "not-a-real-command").await;
    assert!(!ok);

    // The connection is still alive for a subsequent request.
    let (ok, payload) = common::host_request(&mut socket, "version").await;
    assert!(ok);
    assert_eq!(payload, "001f");
}

#[tokio::test]
async fn forward_add_then_list_then_remove() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, _) = common::host_request(&mut socket, "forward:tcp:5000;tcp:6000").await;
    assert!(ok);

    let (ok, listing) = common::host_request(&mut socket, "list-forward").await;
    assert!(ok);
    assert!(listing.contains("tcp:5000") && listing.contains("tcp:6000"));

    let (ok, _) = common::host_request(&mut socket, "forward-remove:tcp:5000").await;
    assert!(ok);

    let (ok, _) = common::host_request(&mut socket, "forward-remove:tcp:5000").await;
    assert!(!ok);
}

#[tokio::test]
async fn transport_switches_connection_into_binary_mode() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, payload) = common::host_request(&mut socket, "transport-any").await;
    assert!(ok);
    assert!(payload.is_empty());

    let reply = common::handshake(&mut socket).await;
    assert_eq!(reply.command, codec::CNXN);
}

#[tokio::test]
async fn host_serial_rejects_mismatched_serial() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;

    let (ok, message) = common::host_request(&mut socket, "host-serial:WRONGSERIAL:get-state").await;
    assert!(!ok);
    assert!(message.contains("unknown serial"));
}
