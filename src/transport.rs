//! The per-connection transport session: the `CNXN` handshake, then a
//! packet loop that demultiplexes `OPEN`/`WRTE`/`OKAY`/`CLSE` onto service
//! streams keyed by stream id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::Device;
use crate::codec::{self, Packet};
use crate::error::CodecError;
use crate::frame::{PacketReader, PacketWriter};
use crate::stream::{self, ServiceStream, StreamSink};

/// Absolute ceiling on the negotiated max-payload, independent of what the
/// peer asks for.
const NEGOTIATED_MAX_PAYLOAD_CEILING: usize = 256 * 1024;
const DEFAULT_MAX_PAYLOAD: usize = 4096;

struct OpenStream {
    remote_id: u32,
    handler: Box<dyn ServiceStream>,
    sink: StreamSink,
}

/// Drives one accepted connection from handshake through teardown. Built
/// fresh per connection; `run` consumes it.
pub struct Transport {
    reader: PacketReader,
    writer: Arc<PacketWriter>,
    device: Device,
    max_payload: usize,
    next_local_id: u32,
    // Keyed by our own local id, since WRTE/CLSE from the peer address a
    // stream by the id we handed out at OPEN time.
    streams: HashMap<u32, OpenStream>,
    close_tx: mpsc::UnboundedSender<u32>,
    close_rx: mpsc::UnboundedReceiver<u32>,
}

impl Transport {
    pub fn new(socket: TcpStream, device: Device) -> Self {
        socket.set_nodelay(true).ok();
        let (read_half, write_half) = socket.into_split();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        Self {
            reader: PacketReader::new(read_half),
            writer: Arc::new(PacketWriter::new(write_half)),
            device,
            max_payload: DEFAULT_MAX_PAYLOAD,
            next_local_id: 1,
            streams: HashMap::new(),
            close_tx,
            close_rx,
        }
    }

    /// Builds a transport around packet reader/writer halves already in
    /// binary mode — used when the host text protocol hands a connection
    /// off after a `transport:*` command.
    pub fn from_halves(reader: PacketReader, writer: Arc<PacketWriter>, device: Device) -> Self {
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        Self { reader, writer, device, max_payload: DEFAULT_MAX_PAYLOAD, next_local_id: 1, streams: HashMap::new(), close_tx, close_rx }
    }

    fn banner(&self) -> Vec<u8> {
        let props = self.device.banner_properties();
        let mut banner = String::from("device::");
        for (key, value) in &props {
            banner.push_str(key);
            banner.push('=');
            banner.push_str(value);
            banner.push(';');
        }
        banner.push_str("features=shell_v2,cmd,stat_v2\0");
        banner.into_bytes()
    }

    async fn send_cnxn_reply(&self) -> Result<(), CodecError> {
        let packet = Packet::new(codec::CNXN, 0x0100_0000, self.max_payload as u32, self.banner());
        self.writer.write_packet(&packet).await
    }

    /// Runs the handshake, then the dispatch loop, until the connection
    /// closes. Every live stream is told to close when this returns.
    pub async fn run(mut self) {
        match self.await_connect().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!(error = %err, "transport handshake failed");
                return;
            }
        }

        loop {
            tokio::select! {
                packet = self.reader.read_packet() => {
                    match packet {
                        Ok(Some(packet)) => {
                            if let Err(err) = self.dispatch(packet).await {
                                warn!(error = %err, "codec error on transport, closing session");
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("peer closed transport");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "codec error reading packet, closing session");
                            break;
                        }
                    }
                }
                Some(local_id) = self.close_rx.recv() => {
                    self.drop_stream(local_id).await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Consumes packets until the first `CNXN` arrives (AUTH is discarded,
    /// per the AUTH bypass). Returns `Ok(false)` on a clean EOF before any
    /// handshake packet shows up.
    async fn await_connect(&mut self) -> Result<bool, CodecError> {
        loop {
            let Some(packet) = self.reader.read_packet().await? else {
                return Ok(false);
            };
            match packet.command {
                codec::CNXN => {
                    self.negotiate(&packet);
                    self.send_cnxn_reply().await?;
                    info!(max_payload = self.max_payload, "transport handshake complete");
                    return Ok(true);
                }
                codec::AUTH => continue,
                other => {
                    debug!(command = codec::command_name(other), "ignoring packet before CNXN");
                }
            }
        }
    }

    fn negotiate(&mut self, packet: &Packet) {
        let peer_max = packet.arg1 as usize;
        self.max_payload = if peer_max == 0 {
            DEFAULT_MAX_PAYLOAD
        } else {
            peer_max.min(NEGOTIATED_MAX_PAYLOAD_CEILING)
        };
    }

    async fn dispatch(&mut self, packet: Packet) -> Result<(), CodecError> {
        match packet.command {
            codec::OPEN => self.handle_open(packet).await,
            codec::WRTE => self.handle_wrte(packet).await,
            codec::OKAY => self.handle_okay(packet),
            codec::CLSE => self.handle_clse(packet).await,
            codec::AUTH => self.send_cnxn_reply().await?,
            codec::CNXN => {
                self.negotiate(&packet);
                self.send_cnxn_reply().await?;
            }
            other => debug!(command = codec::command_name(other), "ignoring unsupported command"),
        }
        Ok(())
    }

    async fn handle_open(&mut self, packet: Packet) {
        let remote_id = packet.arg0;
        let service = parse_service(&packet.payload);

        let Some(mut handler) = stream::create(&service, self.device.clone()) else {
            debug!(service = %service, "OPEN for unrecognised service");
            let reply = Packet::new(codec::CLSE, 0, remote_id, Vec::new());
            let _ = self.writer.write_packet(&reply).await;
            return;
        };

        let local_id = self.next_local_id;
        self.next_local_id += 1;

        let reply = Packet::new(codec::OKAY, local_id, remote_id, Vec::new());
        if self.writer.write_packet(&reply).await.is_err() {
            return;
        }

        let sink = StreamSink::new(local_id, remote_id, self.max_payload, self.writer.clone(), self.close_tx.clone());
        handler.start(sink.clone()).await;
        self.streams.insert(local_id, OpenStream { remote_id, handler, sink });
    }

    async fn handle_wrte(&mut self, packet: Packet) {
        let local_id = packet.arg1;
        let Some(stream) = self.streams.get(&local_id) else {
            debug!(local_id, "WRTE for unknown stream, dropping");
            return;
        };
        // Ack before delivering the payload so the peer can keep sending.
        let ack = Packet::new(codec::OKAY, local_id, stream.remote_id, Vec::new());
        if self.writer.write_packet(&ack).await.is_err() {
            return;
        }
        if let Some(stream) = self.streams.get_mut(&local_id) {
            let sink = stream.sink.clone();
            stream.handler.on_data(packet.payload, &sink).await;
        }
    }

    fn handle_okay(&mut self, _packet: Packet) {
        // Flow-control credit for our prior WRTE; this implementation does
        // not throttle outbound writes on it.
    }

    async fn handle_clse(&mut self, packet: Packet) {
        let local_id = packet.arg1;
        let Some(mut stream) = self.streams.remove(&local_id) else {
            return;
        };
        stream.handler.on_close().await;
        let reply = Packet::new(codec::CLSE, local_id, stream.remote_id, Vec::new());
        let _ = self.writer.write_packet(&reply).await;
    }

    async fn drop_stream(&mut self, local_id: u32) {
        // Streams that close themselves (shell `exit`, sync `QUIT`, logcat
        // Ctrl-C) already sent CLSE from `StreamSink::close`; this just
        // removes the bookkeeping entry, kept here so the table is only
        // ever mutated from the reader loop.
        if let Some(mut stream) = self.streams.remove(&local_id) {
            stream.handler.on_close().await;
        }
    }

    async fn shutdown(&mut self) {
        for (_, mut stream) in self.streams.drain() {
            stream.handler.on_close().await;
        }
    }
}

fn parse_service(payload: &[u8]) -> String {
    let trimmed = match payload.iter().position(|&b| b == 0) {
        Some(idx) => &payload[..idx],
        None => payload,
    };
    String::from_utf8_lossy(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_service_strips_nul_terminator() {
        assert_eq!(parse_service(b"shell:ls\0"), "shell:ls");
        assert_eq!(parse_service(b"sync:"), "sync:");
    }

    #[test]
    fn negotiate_falls_back_to_default_on_zero() {
        let mut transport_max = DEFAULT_MAX_PAYLOAD;
        let peer_max = 0usize;
        transport_max = if peer_max == 0 { DEFAULT_MAX_PAYLOAD } else { peer_max.min(NEGOTIATED_MAX_PAYLOAD_CEILING) };
        assert_eq!(transport_max, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn negotiate_caps_at_ceiling() {
        let peer_max = 1024 * 1024usize;
        let negotiated = peer_max.min(NEGOTIATED_MAX_PAYLOAD_CEILING);
        assert_eq!(negotiated, NEGOTIATED_MAX_PAYLOAD_CEILING);
    }
}
