//! Service streams: the polymorphic handlers multiplexed over one
//! transport session. Each implements [`ServiceStream`] and is driven by
//! the transport's packet loop; a [`StreamSink`] is the one-way,
//! non-owning handle a stream uses to talk back to the transport, so the
//! transport can own its streams without the streams owning it back.

pub mod logcat;
pub mod shell;
pub mod sync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::Packet;
use crate::frame::PacketWriter;

/// Non-owning handle injected into a service stream at construction.
/// Cloning is cheap — background workers (the logcat ticker) hold their
/// own clone so they can keep writing after `start()` returns.
#[derive(Clone)]
pub struct StreamSink {
    local_id: u32,
    remote_id: u32,
    max_payload: usize,
    writer: Arc<PacketWriter>,
    closed: Arc<AtomicBool>,
    close_notify: tokio::sync::mpsc::UnboundedSender<u32>,
}

impl StreamSink {
    pub fn new(
        local_id: u32,
        remote_id: u32,
        max_payload: usize,
        writer: Arc<PacketWriter>,
        close_notify: tokio::sync::mpsc::UnboundedSender<u32>,
    ) -> Self {
        Self { local_id, remote_id, max_payload, writer, closed: Arc::new(AtomicBool::new(false)), close_notify }
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Segments `data` into `ceil(len / max_payload)` WRTE packets and
    /// emits them in order. A no-op once closed.
    pub async fn send(&self, data: &[u8]) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if data.is_empty() {
            return;
        }
        // Outgoing arg order is (our id, their id). All chunks of this
        // call go out under one lock acquisition so another writer on the
        // same transport can't interleave a packet between them.
        let packets: Vec<Packet> = data
            .chunks(self.max_payload.max(1))
            .map(|chunk| Packet::new(crate::codec::WRTE, self.local_id, self.remote_id, chunk.to_vec()))
            .collect();
        let _ = self.writer.write_packets(&packets).await;
    }

    /// Tells the peer the stream is done and asks the transport's reader
    /// loop to drop it from the stream table. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let packet = Packet::new(crate::codec::CLSE, self.local_id, self.remote_id, Vec::new());
        let _ = self.writer.write_packet(&packet).await;
        let _ = self.close_notify.send(self.local_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A service stream's behavior. `on_data`/`on_close` run on the transport's
/// single reader task, so a stream must not block; long-running work
/// (the logcat ticker) is spawned as its own task from `start`.
#[async_trait]
pub trait ServiceStream: Send {
    async fn start(&mut self, sink: StreamSink);

    async fn on_data(&mut self, data: Vec<u8>, sink: &StreamSink);

    /// Called once, either because the peer sent CLSE or because the
    /// stream closed itself. Must release any background workers/handles
    /// within a couple of seconds.
    async fn on_close(&mut self);
}

/// Service-name dispatch table, consulted in order as an explicit
/// registry rather than a method-name lookup. Returns `None` for an
/// unrecognised service, which the transport turns into an immediate CLSE.
pub fn create(service: &str, device: crate::backend::Device) -> Option<Box<dyn ServiceStream>> {
    if let Some(command) = service.strip_prefix("shell:") {
        return Some(Box::new(shell::ShellStream::new(device, command, command.is_empty())));
    }
    if let Some(command) = service.strip_prefix("exec:") {
        return Some(Box::new(shell::ShellStream::new(device, command, false)));
    }
    if service.starts_with("sync:") {
        return Some(Box::new(sync::SyncStream::new(device)));
    }
    if service == "logcat" || service.starts_with("logcat:") {
        return Some(Box::new(logcat::LogcatStream::new(device)));
    }
    None
}
