//! The host text protocol: a length-prefixed request/response language
//! spoken on the same port before a connection switches into the binary
//! transport with `transport:*`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::backend::Device;
use crate::error::HostError;
use crate::frame::{PacketReader, PacketWriter};
use crate::transport::Transport;

const ADB_VERSION: &str = "001f";

/// Drives the host-text side of a connection. Returns once the connection
/// either closes or hands itself off into binary transport mode.
pub async fn serve(socket: TcpStream, device: Device) {
    let mut socket = socket;
    loop {
        let request = match read_request(&mut socket).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(_) => return,
        };

        match handle(&request, &device) {
            Outcome::Reply(reply) => {
                if write_reply(&mut socket, &reply).await.is_err() {
                    return;
                }
            }
            Outcome::Fail(message) => {
                if write_fail(&mut socket, &message).await.is_err() {
                    return;
                }
            }
            Outcome::Kill => {
                let _ = write_reply(&mut socket, "").await;
                return;
            }
            Outcome::Transport => {
                if write_reply(&mut socket, "").await.is_err() {
                    return;
                }
                socket.set_nodelay(true).ok();
                let (read_half, write_half) = socket.into_split();
                let reader = PacketReader::new(read_half);
                let writer = std::sync::Arc::new(PacketWriter::new(write_half));
                Transport::from_halves(reader, writer, device).run().await;
                return;
            }
        }
    }
}

enum Outcome {
    Reply(String),
    Fail(String),
    Kill,
    Transport,
}

async fn read_request(socket: &mut TcpStream) -> Result<Option<String>, HostError> {
    let mut length_header = [0u8; 4];
    match socket.read_exact(&mut length_header).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(_) => return Ok(None),
    }
    let text = std::str::from_utf8(&length_header).map_err(|_| HostError::BadLengthHeader)?;
    let length = u32::from_str_radix(text, 16).map_err(|_| HostError::BadLengthHeader)? as usize;
    let mut payload = vec![0u8; length];
    socket.read_exact(&mut payload).await.map_err(|_| HostError::BadLengthHeader)?;
    Ok(Some(String::from_utf8_lossy(&payload).to_string()))
}

async fn write_reply(socket: &mut TcpStream, payload: &str) -> std::io::Result<()> {
    socket.write_all(b"OKAY").await?;
    socket.write_all(format!("{:04x}", payload.len()).as_bytes()).await?;
    socket.write_all(payload.as_bytes()).await?;
    Ok(())
}

async fn write_fail(socket: &mut TcpStream, message: &str) -> std::io::Result<()> {
    socket.write_all(b"FAIL").await?;
    socket.write_all(format!("{:04x}", message.len()).as_bytes()).await?;
    socket.write_all(message.as_bytes()).await?;
    Ok(())
}

fn handle(request: &str, device: &Device) -> Outcome {
    match request {
        "version" => Outcome::Reply(ADB_VERSION.to_string()),
        "devices" => Outcome::Reply(device_list_line(device, false)),
        "devices-l" => Outcome::Reply(device_list_line(device, true)),
        "get-state" => Outcome::Reply(device.state()),
        "get-serialno" => Outcome::Reply(device.serial()),
        "features" => Outcome::Reply(String::new()),
        "kill" => Outcome::Kill,
        "transport" | "transport-any" | "transport-usb" | "transport-local" => Outcome::Transport,
        other if other.starts_with("transport:") => Outcome::Transport,
        other if other.starts_with("host-serial:") => handle_host_serial(other, device),
        other if other.starts_with("forward:") || other.starts_with("forward:norebind:") => handle_forward(other, device),
        "forward-remove-all" => {
            Outcome::Reply(String::new())
        }
        other if other.starts_with("forward-remove:") => handle_forward_remove(other, device),
        "list-forward" => Outcome::Reply(list_forward(device)),
        other if other.starts_with("reboot") => {
            let device = device.clone();
            tokio::spawn(async move { device.reboot().await });
            Outcome::Reply(String::new())
        }
        other => Outcome::Fail(HostError::Unsupported(other.to_string()).to_string()),
    }
}

fn device_list_line(device: &Device, long: bool) -> String {
    if long {
        format!("{}\t{}\tproduct:{}\n", device.serial(), device.state(), device.model())
    } else {
        format!("{}\t{}\n", device.serial(), device.state())
    }
}

fn handle_host_serial(request: &str, device: &Device) -> Outcome {
    let rest = &request["host-serial:".len()..];
    let Some((serial, inner)) = rest.split_once(':') else {
        return Outcome::Fail(HostError::Unsupported(request.to_string()).to_string());
    };
    if serial != device.serial() {
        return Outcome::Fail(HostError::UnknownSerial(serial.to_string()).to_string());
    }
    handle(inner, device)
}

fn handle_forward(request: &str, device: &Device) -> Outcome {
    let spec = request.strip_prefix("forward:norebind:").or_else(|| request.strip_prefix("forward:")).unwrap_or(request);
    let Some((local, remote)) = spec.split_once(';') else {
        return Outcome::Fail(HostError::MalformedForward.to_string());
    };
    device.add_forward_rule(local, remote);
    Outcome::Reply(String::new())
}

fn handle_forward_remove(request: &str, device: &Device) -> Outcome {
    let local = &request["forward-remove:".len()..];
    if device.remove_forward_rule(local) {
        Outcome::Reply(String::new())
    } else {
        Outcome::Fail(HostError::ForwardNotFound.to_string())
    }
}

fn list_forward(device: &Device) -> String {
    let mut lines = String::new();
    for (local, remote) in device.list_forward_rules() {
        lines.push_str(&format!("{}\t{}\t{}\n", device.serial(), local, remote));
    }
    lines
}
