//! File push, large-file pull chunking, and sync error-handling cases.

mod common;

use adbmockd::codec;

#[tokio::test]
async fn send_data_done_writes_file_with_mode() {
    let (addr, device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    let local_id = common::open_stream(&mut socket, 3, "sync:").await;

    let mut payload = common::sync_frame(b"SEND", b"/tmp/a,0644");
    payload.extend(common::sync_frame(b"DATA", b"ABC"));
    payload.extend(common::sync_frame(b"DATA", b"DEF"));
    payload.extend(common::sync_frame(b"DONE", &0u32.to_le_bytes()));
    common::write_stream(&mut socket, local_id, 3, &payload).await;

    let reply = common::read_packet(&mut socket).await;
    assert_eq!(reply.command, codec::WRTE);
    let (tag, body) = common::parse_sync_frame(&reply.payload);
    assert_eq!(&tag, b"OKAY");
    assert!(body.is_empty());

    let content = device.with_filesystem_ref(|fs| fs.read_file("/tmp/a", "/")).unwrap();
    assert_eq!(content, b"ABCDEF");
    let entry = device.with_filesystem_ref(|fs| fs.get_entry("/tmp/a", "/", true)).unwrap();
    assert_eq!(entry.permissions, 0o644);
}

#[tokio::test]
async fn push_then_pull_round_trips_contents() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;

    let local_id = common::open_stream(&mut socket, 3, "sync:").await;
    let mut push = common::sync_frame(b"SEND", b"/tmp/a,0644");
    push.extend(common::sync_frame(b"DATA", b"ABC"));
    push.extend(common::sync_frame(b"DONE", &0u32.to_le_bytes()));
    common::write_stream(&mut socket, local_id, 3, &push).await;
    common::read_packet(&mut socket).await; // OKAY

    let local_id2 = common::open_stream(&mut socket, 4, "sync:").await;
    let recv = common::sync_frame(b"RECV", b"/tmp/a");
    common::write_stream(&mut socket, local_id2, 4, &recv).await;

    let data_packet = common::read_packet(&mut socket).await;
    let (tag, body) = common::parse_sync_frame(&data_packet.payload);
    assert_eq!(&tag, b"DATA");
    assert_eq!(body, b"ABC");

    let done_packet = common::read_packet(&mut socket).await;
    let (tag, _) = common::parse_sync_frame(&done_packet.payload);
    assert_eq!(&tag, b"DONE");
}

#[tokio::test]
async fn recv_chunks_large_file_at_64kib_boundaries() {
    let (addr, device) = common::spawn_server().await;
    device.with_filesystem_mut(|fs| fs.write_file("/tmp/big", "/", vec![0x41; 133_120], 0o644)).unwrap();

    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;
    let local_id = common::open_stream(&mut socket, 3, "sync:").await;

    let recv = common::sync_frame(b"RECV", b"/tmp/big");
    common::write_stream(&mut socket, local_id, 3, &recv).await;

    let mut chunk_sizes = Vec::new();
    loop {
        let packet = common::read_packet(&mut socket).await;
        let (tag, body) = common::parse_sync_frame(&packet.payload);
        if &tag == b"DONE" {
            break;
        }
        assert_eq!(&tag, b"DATA");
        chunk_sizes.push(body.len());
    }

    assert_eq!(chunk_sizes, vec![65536, 65536, 2048]);
}

#[tokio::test]
async fn stat_on_missing_path_is_zeroed_not_fail() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;
    let local_id = common::open_stream(&mut socket, 3, "sync:").await;

    let stat = common::sync_frame(b"STAT", b"/does/not/exist");
    common::write_stream(&mut socket, local_id, 3, &stat).await;

    let reply = common::read_packet(&mut socket).await;
    let (tag, body) = common::parse_sync_frame(&reply.payload);
    assert_eq!(&tag, b"STAT");
    assert_eq!(body, vec![0u8; 12]);
}

#[tokio::test]
async fn send_without_comma_is_fail() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;
    let local_id = common::open_stream(&mut socket, 3, "sync:").await;

    let send = common::sync_frame(b"SEND", b"/tmp/a");
    common::write_stream(&mut socket, local_id, 3, &send).await;

    let reply = common::read_packet(&mut socket).await;
    let (tag, body) = common::parse_sync_frame(&reply.payload);
    assert_eq!(&tag, b"FAIL");
    assert_eq!(String::from_utf8_lossy(&body), "Malformed SEND request");
}

#[tokio::test]
async fn done_without_send_is_fail() {
    let (addr, _device) = common::spawn_server().await;
    let mut socket = common::connect(addr).await;
    common::handshake(&mut socket).await;
    let local_id = common::open_stream(&mut socket, 3, "sync:").await;

    let done = common::sync_frame(b"DONE", &0u32.to_le_bytes());
    common::write_stream(&mut socket, local_id, 3, &done).await;

    let reply = common::read_packet(&mut socket).await;
    let (tag, _) = common::parse_sync_frame(&reply.payload);
    assert_eq!(&tag, b"FAIL");
}
