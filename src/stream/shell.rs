//! The `shell:` and `exec:` services.

use async_trait::async_trait;

use super::{ServiceStream, StreamSink};
use crate::backend::shell::Shell;
use crate::backend::Device;

pub struct ShellStream {
    shell: Shell,
    initial_command: Option<String>,
    interactive: bool,
    input_buffer: String,
}

impl ShellStream {
    pub fn new(device: Device, command: &str, interactive: bool) -> Self {
        let shell = Shell::new(device, "shell");
        let initial_command = if interactive { None } else { Some(command.to_string()) };
        Self { shell, initial_command, interactive, input_buffer: String::new() }
    }

    /// Shell output uses CR-LF only in interactive mode; a one-shot
    /// `shell:<cmd>`/`exec:<cmd>` stream sends raw stdout/stderr.
    fn normalize(&self, text: &str) -> String {
        if self.interactive { text.replace('\n', "\r\n") } else { text.to_string() }
    }
}

#[async_trait]
impl ServiceStream for ShellStream {
    async fn start(&mut self, sink: StreamSink) {
        if let Some(command) = self.initial_command.take() {
            let outcome = self.shell.execute(&command);
            let text = self.normalize(&outcome.as_text());
            sink.send(text.as_bytes()).await;
            sink.close().await;
            return;
        }
        if self.interactive {
            sink.send(self.shell.prompt().as_bytes()).await;
        }
    }

    async fn on_data(&mut self, data: Vec<u8>, sink: &StreamSink) {
        if !self.interactive {
            return;
        }
        for byte in data {
            match byte {
                0x03 => {
                    // Ctrl-C: discard the buffered line and reprint the prompt.
                    self.input_buffer.clear();
                    sink.send(b"^C\r\n").await;
                    sink.send(self.shell.prompt().as_bytes()).await;
                }
                0x04 => {
                    // Ctrl-D: close without echoing anything further.
                    sink.close().await;
                    return;
                }
                b'\r' | b'\n' => {
                    let command = self.input_buffer.trim().to_string();
                    self.input_buffer.clear();
                    if command.is_empty() {
                        sink.send(self.shell.prompt().as_bytes()).await;
                        continue;
                    }
                    if command == "exit" {
                        sink.send(b"exit\r\n").await;
                        sink.close().await;
                        return;
                    }
                    let outcome = self.shell.execute(&command);
                    let text = self.normalize(&outcome.as_text());
                    sink.send(text.as_bytes()).await;
                    sink.send(self.shell.prompt().as_bytes()).await;
                }
                other => self.input_buffer.push(other as char),
            }
        }
    }

    async fn on_close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceMetadata;

    fn device() -> Device {
        Device::new(DeviceMetadata::default())
    }

    #[test]
    fn one_shot_prepares_raw_stdout() {
        let mut stream = ShellStream::new(device(), "echo hi", false);
        let outcome = stream.shell.execute("echo hi");
        assert_eq!(outcome.as_text(), "hi\n");
        // One-shot mode must not translate newlines.
        assert_eq!(stream.normalize(&outcome.as_text()), "hi\n");
    }

    #[test]
    fn interactive_translates_newlines() {
        let stream = ShellStream::new(device(), "", true);
        assert_eq!(stream.normalize("a\nb\n"), "a\r\nb\r\n");
    }
}
