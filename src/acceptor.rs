//! The TCP acceptor: binds the listening socket and spawns one connection
//! context per accepted client, starting each in host-text mode.

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::backend::Device;

pub async fn run(host: &str, port: u16, device: Device) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(%host, port, "adbmockd listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let device = device.clone();
        tokio::spawn(async move {
            info!(%peer, "connection accepted");
            crate::host::serve(socket, device).await;
            info!(%peer, "connection closed");
        });
    }
}
