use super::launcher::ChildOutput;
use super::log_buffer::LogBuffer;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

/// Longest line relayed as one event; longer output is split into chunks.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forwards backend output into the host log, one event per line, and keeps
/// the most recent lines in a [`LogBuffer`].
#[derive(Clone)]
pub struct OutputRelay {
    buffer: Arc<LogBuffer>,
}

impl OutputRelay {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    /// Spawn one reader task per captured stream. The tasks end at EOF.
    pub fn attach(&self, output: ChildOutput) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = output.stdout {
            readers.push(self.relay(stdout, OutputStream::Stdout));
        }
        if let Some(stderr) = output.stderr {
            readers.push(self.relay(stderr, OutputStream::Stderr));
        }
        readers
    }

    fn relay<R>(&self, reader: R, stream: OutputStream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::clone(&self.buffer);
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut bytes = Vec::new();
            loop {
                bytes.clear();
                let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
                // EOF and read errors end the relay; output is best-effort.
                match limited.read_until(b'\n', &mut bytes).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let text = String::from_utf8_lossy(&bytes);
                let line = text.trim_end_matches('\n').trim_end_matches('\r');
                emit(stream, line);
                buffer.push(stream, line.to_string());
            }
        })
    }
}

fn emit(stream: OutputStream, line: &str) {
    match stream {
        OutputStream::Stdout => {
            tracing::info!(target: "backend", stream = "stdout", "[backend:stdout] {line}")
        }
        OutputStream::Stderr => {
            tracing::warn!(target: "backend", stream = "stderr", "[backend:stderr] {line}")
        }
    }
}
