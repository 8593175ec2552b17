//! The `logcat` service: a background ticker that feeds the device's
//! log ring to the peer until the stream closes.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ServiceStream, StreamSink};
use crate::backend::Device;

const TICK: std::time::Duration = std::time::Duration::from_millis(200);
const LINES_PER_TICK: usize = 5;
const SHUTDOWN_BOUND: std::time::Duration = std::time::Duration::from_secs(2);

pub struct LogcatStream {
    device: Device,
    worker: Option<JoinHandle<()>>,
    stop: Option<mpsc::Sender<()>>,
}

impl LogcatStream {
    pub fn new(device: Device) -> Self {
        Self { device, worker: None, stop: None }
    }
}

async fn run(device: Device, sink: StreamSink, mut stop: mpsc::Receiver<()>) {
    let mut ticker = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = stop.recv() => return,
            _ = ticker.tick() => {
                if sink.is_closed() {
                    return;
                }
                let lines = device.next_log_lines(LINES_PER_TICK);
                if !lines.is_empty() {
                    let mut chunk = String::new();
                    for line in lines {
                        chunk.push_str(&line);
                        chunk.push('\n');
                    }
                    sink.send(chunk.as_bytes()).await;
                }
            }
        }
    }
}

#[async_trait]
impl ServiceStream for LogcatStream {
    async fn start(&mut self, sink: StreamSink) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        self.stop = Some(stop_tx);
        self.worker = Some(tokio::spawn(run(self.device.clone(), sink, stop_rx)));
    }

    async fn on_data(&mut self, data: Vec<u8>, sink: &StreamSink) {
        // Ctrl-C stops the stream from the client side, same as a real
        // `adb logcat` session.
        if data.contains(&0x03) {
            sink.close().await;
        }
    }

    async fn on_close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(()).await;
        }
        if let Some(worker) = self.worker.take() {
            let _ = tokio::time::timeout(SHUTDOWN_BOUND, worker).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceMetadata;

    #[tokio::test]
    async fn on_close_without_start_is_a_no_op() {
        let mut stream = LogcatStream::new(Device::new(DeviceMetadata::default()));
        stream.on_close().await;
    }
}
