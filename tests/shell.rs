//! One-shot shell execution and interactive shell Ctrl-C handling.

mod common;

use adbmockd::codec;

#[tokio::test]
async fn one_shot_shell_runs_command_then_closes() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    common::send_packet(&mut socket, codec::OPEN, 7, 0, b"shell:echo hi\0").await;

    let okay = common::read_packet(&mut socket).await;
    assert_eq!(okay.command, codec::OKAY);
    assert_eq!(okay.arg1, 7);
    let local_id = okay.arg0;

    let wrte = common::read_packet(&mut socket).await;
    assert_eq!(wrte.command, codec::WRTE);
    assert_eq!(wrte.arg0, local_id);
    assert_eq!(wrte.arg1, 7);
    assert_eq!(wrte.payload, b"hi\n");

    let clse = common::read_packet(&mut socket).await;
    assert_eq!(clse.command, codec::CLSE);
    assert_eq!(clse.arg0, local_id);
    assert_eq!(clse.arg1, 7);
}

#[tokio::test]
async fn one_shot_shell_reports_nonzero_exit_via_stderr() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    common::send_packet(&mut socket, codec::OPEN, 9, 0, b"exec:frobnicate\0").await;
    common::read_packet(&mut socket).await; // OKAY

    let wrte = common::read_packet(&mut socket).await;
    assert!(String::from_utf8_lossy(&wrte.payload).contains("not found"));
}

#[tokio::test]
async fn open_of_unknown_service_replies_clse_and_allocates_nothing() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    common::send_packet(&mut socket, codec::OPEN, 11, 0, b"bogus:\0").await;
    let reply = common::read_packet(&mut socket).await;

    assert_eq!(reply.command, codec::CLSE);
    assert_eq!(reply.arg0, 0);
    assert_eq!(reply.arg1, 11);
}

#[tokio::test]
async fn interactive_shell_ctrl_c_discards_line_and_reprompts() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    let local_id = common::open_stream(&mut socket, 5, "shell:").await;

    // Initial prompt.
    let prompt = common::read_packet(&mut socket).await;
    assert!(String::from_utf8_lossy(&prompt.payload).ends_with("$ "));

    common::write_stream(&mut socket, local_id, 5, b"ls /nope").await;
    common::write_stream(&mut socket, local_id, 5, &[0x03]).await;

    let ctrl_c_echo = common::read_packet(&mut socket).await;
    assert!(String::from_utf8_lossy(&ctrl_c_echo.payload).ends_with("^C\r\n"));

    let reprompt = common::read_packet(&mut socket).await;
    assert!(String::from_utf8_lossy(&reprompt.payload).ends_with("$ "));

    // A fresh command after Ctrl-C is accepted normally.
    common::write_stream(&mut socket, local_id, 5, b"echo again\r").await;
    let output = common::read_packet(&mut socket).await;
    assert_eq!(output.payload, b"again\r\n");
}

#[tokio::test]
async fn interactive_shell_exit_closes_stream() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    let local_id = common::open_stream(&mut socket, 3, "shell:").await;
    common::read_packet(&mut socket).await; // prompt

    common::write_stream(&mut socket, local_id, 3, b"exit\n").await;
    let echo = common::read_packet(&mut socket).await;
    assert_eq!(echo.payload, b"exit\r\n");

    let close = common::read_packet(&mut socket).await;
    assert_eq!(close.command, codec::CLSE);
}
