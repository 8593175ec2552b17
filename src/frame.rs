//! I/O layer over the packet codec: reads exactly one packet at a time,
//! writes a packet atomically with respect to other writers on the same
//! transport.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::codec::{Packet, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::CodecError;

pub struct PacketReader {
    inner: OwnedReadHalf,
}

impl PacketReader {
    pub fn new(inner: OwnedReadHalf) -> Self {
        Self { inner }
    }

    /// Reads one complete packet. Returns `Ok(None)` on a clean EOF before
    /// any byte of the next header was read — the ordinary way a transport
    /// session ends. Any other short read is a `CodecError::Io`.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        let mut header = [0u8; HEADER_SIZE];
        let mut read = 0;
        while read < HEADER_SIZE {
            let n = self.inner.read(&mut header[read..]).await?;
            if n == 0 {
                if read == 0 {
                    return Ok(None);
                }
                return Err(CodecError::TruncatedHeader(read));
            }
            read += n;
        }

        let length = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
        if length > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(length));
        }
        let mut payload = vec![0u8; length];
        self.inner.read_exact(&mut payload).await?;

        Packet::decode(&header, payload).map(Some)
    }
}

/// Shared because service streams running on their own tasks (logcat
/// ticker, interactive shell) write back through the same transport the
/// reader loop uses; all writers serialize through this mutex so no two
/// packets' bytes ever interleave on the wire.
pub struct PacketWriter {
    inner: Mutex<OwnedWriteHalf>,
}

impl PacketWriter {
    pub fn new(inner: OwnedWriteHalf) -> Self {
        Self { inner: Mutex::new(inner) }
    }

    pub async fn write_packet(&self, packet: &Packet) -> Result<(), CodecError> {
        let bytes = packet.encode()?;
        let mut guard = self.inner.lock().await;
        guard.write_all(&bytes).await?;
        Ok(())
    }

    /// Writes every packet in `packets` while holding the lock for the
    /// whole sequence, so a segmented multi-packet send from one caller
    /// can't have another writer's packet land in the middle of it.
    pub async fn write_packets(&self, packets: &[Packet]) -> Result<(), CodecError> {
        let mut guard = self.inner.lock().await;
        for packet in packets {
            let bytes = packet.encode()?;
            guard.write_all(&bytes).await?;
        }
        Ok(())
    }
}
