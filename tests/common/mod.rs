//! Shared end-to-end test harness: spins up a real `adbmockd` connection
//! handler on an ephemeral port and exposes small client-side helpers for
//! speaking the binary transport and host-text protocols.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use adbmockd::backend::{Device, DeviceMetadata};
use adbmockd::codec::{self, Packet, HEADER_SIZE};
use adbmockd::host;

/// Spawns a server backed by a freshly seeded device and returns its
/// address plus a handle onto that same device for backend assertions.
#[allow(dead_code)]
pub async fn spawn_server() -> (SocketAddr, Device) {
    spawn_server_with(Device::new(DeviceMetadata::default())).await
}

#[allow(dead_code)]
pub async fn spawn_server_with(device: Device) -> (SocketAddr, Device) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("read ephemeral port");
    let accept_device = device.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let device = accept_device.clone();
            tokio::spawn(async move { host::serve(socket, device).await });
        }
    });
    (addr, device)
}

#[allow(dead_code)]
pub async fn connect(addr: SocketAddr) -> TcpStream {
    let socket = TcpStream::connect(addr).await.expect("connect to test server");
    socket.set_nodelay(true).ok();
    socket
}

#[allow(dead_code)]
pub async fn send_packet(socket: &mut TcpStream, command: u32, arg0: u32, arg1: u32, payload: &[u8]) {
    let packet = Packet::new(command, arg0, arg1, payload.to_vec());
    socket.write_all(&packet.encode().expect("encode test packet")).await.expect("write test packet");
}

#[allow(dead_code)]
pub async fn read_packet(socket: &mut TcpStream) -> Packet {
    let mut header = [0u8; HEADER_SIZE];
    socket.read_exact(&mut header).await.expect("read packet header");
    let length = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
    let mut payload = vec![0u8; length];
    socket.read_exact(&mut payload).await.expect("read packet payload");
    Packet::decode(&header, payload).expect("decode packet")
}

/// Performs the CNXN handshake and returns the server's CNXN reply.
#[allow(dead_code)]
pub async fn handshake(socket: &mut TcpStream) -> Packet {
    send_packet(socket, codec::CNXN, 0x0100_0000, 256 * 1024, b"host::features=shell_v2,cmd\0").await;
    read_packet(socket).await
}

/// Opens a stream against `service` and returns the local id the server
/// assigned (from the OKAY reply).
#[allow(dead_code)]
pub async fn open_stream(socket: &mut TcpStream, remote_id: u32, service: &str) -> u32 {
    let mut payload = service.as_bytes().to_vec();
    payload.push(0);
    send_packet(socket, codec::OPEN, remote_id, 0, &payload).await;
    let reply = read_packet(socket).await;
    assert_eq!(reply.command, codec::OKAY, "expected OKAY for OPEN {service}");
    reply.arg0
}

/// Writes stream payload, then consumes the server's flow-control OKAY ack
/// (the transport acks before the handler consumes the payload).
#[allow(dead_code)]
pub async fn write_stream(socket: &mut TcpStream, local_id: u32, remote_id: u32, data: &[u8]) {
    send_packet(socket, codec::WRTE, remote_id, local_id, data).await;
    let ack = read_packet(socket).await;
    assert_eq!(ack.command, codec::OKAY);
}

/// Speaks one host-text request/response exchange.
#[allow(dead_code)]
pub async fn host_request(socket: &mut TcpStream, request: &str) -> (bool, String) {
    socket.write_all(format!("{:04x}", request.len()).as_bytes()).await.expect("write host length header");
    socket.write_all(request.as_bytes()).await.expect("write host request");
    let mut status = [0u8; 4];
    socket.read_exact(&mut status).await.expect("read host status");
    let ok = &status == b"OKAY";
    let mut length_hex = [0u8; 4];
    socket.read_exact(&mut length_hex).await.expect("read host length header");
    let length = usize::from_str_radix(std::str::from_utf8(&length_hex).unwrap(), 16).expect("parse host length");
    let mut payload = vec![0u8; length];
    socket.read_exact(&mut payload).await.expect("read host payload");
    (ok, String::from_utf8_lossy(&payload).to_string())
}

/// Frames one sync sub-message: 4-byte ASCII tag + u32 LE length + payload.
#[allow(dead_code)]
pub fn sync_frame(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parses one sync sub-message out of a WRTE payload, returning the tag
/// and payload plus the number of bytes consumed.
#[allow(dead_code)]
pub fn parse_sync_frame(buf: &[u8]) -> ([u8; 4], Vec<u8>) {
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&buf[..4]);
    let length = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    (tag, buf[8..8 + length].to_vec())
}
