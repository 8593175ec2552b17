//! The `sync:` inner framed sub-protocol: STAT/LIST/SEND/RECV/DATA/DONE/
//! QUIT/FAIL, each framed as a 4-byte ASCII tag + u32 LE length + payload.

use async_trait::async_trait;

use super::{ServiceStream, StreamSink};
use crate::backend::Device;

const HEADER_SIZE: usize = 8;
const RECV_CHUNK: usize = 64 * 1024;
const DEFAULT_MODE: u32 = 0o664;

struct SendState {
    path: String,
    mode: u32,
    data: Vec<u8>,
}

pub struct SyncStream {
    device: Device,
    buffer: Vec<u8>,
    send_state: Option<SendState>,
}

impl SyncStream {
    pub fn new(device: Device) -> Self {
        Self { device, buffer: Vec::new(), send_state: None }
    }

    async fn dispatch(&mut self, tag: &[u8; 4], payload: Vec<u8>, sink: &StreamSink) {
        match tag {
            b"STAT" => self.handle_stat(payload, sink).await,
            b"LIST" => self.handle_list(payload, sink).await,
            b"SEND" => self.handle_send(payload, sink).await,
            b"DATA" => self.handle_data(payload, sink).await,
            b"DONE" => self.handle_done(payload, sink).await,
            b"RECV" => self.handle_recv(payload, sink).await,
            b"QUIT" => sink.close().await,
            _ => self.send_fail(sink, &format!("Unsupported sync command {}", String::from_utf8_lossy(tag))).await,
        }
    }

    async fn handle_stat(&self, payload: Vec<u8>, sink: &StreamSink) {
        let path = String::from_utf8_lossy(&payload).to_string();
        let (mode, size) = match self.device.with_filesystem_ref(|fs| fs.get_entry(&path, "/", true)) {
            Ok(entry) => (entry.mode(), entry.size()),
            Err(_) => (0, 0),
        };
        self.send_chunk(sink, b"STAT", &stat_payload(mode, size, 0)).await;
    }

    async fn handle_list(&self, payload: Vec<u8>, sink: &StreamSink) {
        let path = String::from_utf8_lossy(&payload).to_string();
        let path = if path.is_empty() { "/".to_string() } else { path };
        let entries = match self.device.with_filesystem_ref(|fs| fs.list_dir(&path, "/")) {
            Ok(entries) => entries,
            Err(e) => {
                self.send_fail(sink, &e.to_string()).await;
                return;
            }
        };
        for entry in entries {
            let name = if entry.path == "/" { "/".to_string() } else { entry.path.rsplit('/').next().unwrap().to_string() };
            let mode = entry.mode();
            let mut dent = dent_payload(mode, entry.size(), 0, name.len() as u32);
            dent.extend_from_slice(name.as_bytes());
            self.send_chunk(sink, b"DENT", &dent).await;
        }
        self.send_chunk(sink, b"DONE", &[]).await;
    }

    async fn handle_send(&mut self, payload: Vec<u8>, sink: &StreamSink) {
        let spec = String::from_utf8_lossy(&payload).to_string();
        let Some((path, mode_text)) = spec.rsplit_once(',') else {
            self.send_fail(sink, "Malformed SEND request").await;
            return;
        };
        let mode = u32::from_str_radix(mode_text, 8).unwrap_or(DEFAULT_MODE);
        self.send_state = Some(SendState { path: path.to_string(), mode, data: Vec::new() });
    }

    async fn handle_data(&mut self, payload: Vec<u8>, sink: &StreamSink) {
        match &mut self.send_state {
            Some(state) => state.data.extend_from_slice(&payload),
            None => self.send_fail(sink, "DATA without SEND").await,
        }
    }

    async fn handle_done(&mut self, _payload: Vec<u8>, sink: &StreamSink) {
        let Some(state) = self.send_state.take() else {
            self.send_fail(sink, "DONE without SEND").await;
            return;
        };
        match self.device.with_filesystem_mut(|fs| fs.write_file(&state.path, "/", state.data, state.mode)) {
            Ok(()) => self.send_chunk(sink, b"OKAY", &[]).await,
            Err(e) => self.send_fail(sink, &e.to_string()).await,
        }
    }

    async fn handle_recv(&self, payload: Vec<u8>, sink: &StreamSink) {
        let path = String::from_utf8_lossy(&payload).to_string();
        let data = match self.device.with_filesystem_ref(|fs| fs.read_file(&path, "/")) {
            Ok(data) => data,
            Err(e) => {
                self.send_fail(sink, &e.to_string()).await;
                return;
            }
        };
        for chunk in data.chunks(RECV_CHUNK) {
            self.send_chunk(sink, b"DATA", chunk).await;
        }
        self.send_chunk(sink, b"DONE", &[]).await;
    }

    async fn send_chunk(&self, sink: &StreamSink, tag: &[u8; 4], payload: &[u8]) {
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(tag);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);
        sink.send(&frame).await;
    }

    async fn send_fail(&self, sink: &StreamSink, message: &str) {
        self.send_chunk(sink, b"FAIL", message.as_bytes()).await;
    }
}

fn stat_payload(mode: u32, size: u32, mtime: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&mode.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&mtime.to_le_bytes());
    out
}

fn dent_payload(mode: u32, size: u32, mtime: u32, name_len: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&mode.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&mtime.to_le_bytes());
    out.extend_from_slice(&name_len.to_le_bytes());
    out
}

#[async_trait]
impl ServiceStream for SyncStream {
    async fn start(&mut self, _sink: StreamSink) {}

    async fn on_data(&mut self, data: Vec<u8>, sink: &StreamSink) {
        self.buffer.extend_from_slice(&data);
        loop {
            if self.buffer.len() < HEADER_SIZE {
                return;
            }
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&self.buffer[..4]);
            let length = u32::from_le_bytes(self.buffer[4..8].try_into().unwrap()) as usize;
            if self.buffer.len() < HEADER_SIZE + length {
                return;
            }
            let payload = self.buffer[HEADER_SIZE..HEADER_SIZE + length].to_vec();
            self.buffer.drain(..HEADER_SIZE + length);
            self.dispatch(&tag, payload, sink).await;
        }
    }

    async fn on_close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceMetadata;

    fn frame(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn stat_payload_is_twelve_bytes() {
        assert_eq!(stat_payload(0, 0, 0).len(), 12);
    }

    #[test]
    fn send_spec_splits_on_last_comma() {
        let spec = "/tmp/a,0644";
        let (path, mode_text) = spec.rsplit_once(',').unwrap();
        assert_eq!(path, "/tmp/a");
        assert_eq!(u32::from_str_radix(mode_text, 8).unwrap(), 0o644);
    }

    #[test]
    fn frame_round_trips_through_parser_buffer() {
        let mut stream = SyncStream::new(Device::new(DeviceMetadata::default()));
        let bytes = frame(b"SEND", b"/tmp/a,0644");
        stream.buffer.extend_from_slice(&bytes);
        assert!(stream.buffer.len() >= HEADER_SIZE);
    }
}
