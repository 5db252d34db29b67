//! Stream-based transport.
//!
//! Reads newline-delimited JSON payloads from an async byte stream: a
//! recorded log file, a TCP connection or stdin. Each non-empty line is
//! delivered as one message; decoding is left to the store so that
//! malformed lines are counted and reported like any other bad payload.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cellwatch_core::{Transport, TransportError, TransportEvent};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::AdapterError;

const CHANNEL_CAPACITY: usize = 64;

/// A transport that reads newline-delimited JSON from an async reader.
///
/// A background task emits `Connected` once, then one `Message` per
/// non-empty line, then `Closed` at end of stream.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use cellwatch_adapters::StreamTransport;
/// use cellwatch_core::{Transport, TransportEvent};
///
/// # tokio_test::block_on(async {
/// let data = b"{\"ctrl_temp\": 40.5}\n";
/// let mut transport = StreamTransport::spawn(Cursor::new(data.to_vec()), "example");
/// assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
/// # });
/// ```
#[derive(Debug)]
pub struct StreamTransport {
    receiver: mpsc::Receiver<TransportEvent>,
    task: JoinHandle<()>,
    description: String,
}

impl StreamTransport {
    /// Spawn a background task that reads from the given async reader.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::spawn_paced(reader, description, None)
    }

    /// Like [`spawn`](Self::spawn), waiting `pace` between lines. Useful for
    /// replaying a recorded session at roughly its original rate.
    pub fn spawn_paced<R>(reader: R, description: &str, pace: Option<Duration>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(read_lines(reader, tx, pace));

        Self {
            receiver: rx,
            task,
            description: format!("stream: {}", description),
        }
    }

    /// Replay a newline-delimited JSON file.
    pub async fn open_file(path: impl AsRef<Path>, pace: Option<Duration>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::spawn_paced(file, &path.display().to_string(), pace))
    }

    /// Read from a TCP peer that writes one JSON payload per line.
    pub async fn connect_tcp(addr: &str) -> Result<Self, AdapterError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| AdapterError::Connection(format!("{}: {}", addr, e)))?;
        Ok(Self::spawn(stream, &format!("tcp://{}", addr)))
    }

    /// Read from standard input.
    pub fn stdin() -> Self {
        Self::spawn(tokio::io::stdin(), "stdin")
    }

    /// Create a transport from a raw bytes channel.
    ///
    /// Each received buffer is delivered as one message. This is useful when
    /// payloads come from a client the caller already owns.
    pub fn from_bytes_channel(mut rx: mpsc::Receiver<Vec<u8>>, description: &str) -> Self {
        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            if tx.send(TransportEvent::Connected).await.is_err() {
                return;
            }
            while let Some(bytes) = rx.recv().await {
                if tx.send(TransportEvent::Message(bytes)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(TransportEvent::Closed).await;
        });

        Self {
            receiver: events,
            task,
            description: format!("channel: {}", description),
        }
    }
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<TransportEvent>, pace: Option<Duration>)
where
    R: AsyncRead + Unpin,
{
    if tx.send(TransportEvent::Connected).await.is_err() {
        return;
    }

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut first = true;

    loop {
        line.clear();
        // Raw bytes: invalid UTF-8 is a malformed payload, not a read failure.
        let event = match reader.read_until(b'\n', &mut line).await {
            // EOF
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_ascii();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(pace) = pace.filter(|_| !first) {
                    tokio::time::sleep(pace).await;
                }
                first = false;
                TransportEvent::Message(trimmed.to_vec())
            }
            Err(e) => {
                let _ = tx
                    .send(TransportEvent::Error(TransportError::Connection(format!(
                        "read error: {}",
                        e
                    ))))
                    .await;
                break;
            }
        };
        if tx.send(event).await.is_err() {
            // Receiver dropped
            return;
        }
    }

    debug!("stream ended");
    let _ = tx.send(TransportEvent::Closed).await;
}

#[async_trait]
impl Transport for StreamTransport {
    /// Streams carry a single feed; the topic is ignored.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        debug!(%topic, source = %self.description, "stream transports ignore topics");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.task.abort();
        self.receiver.close();
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    async fn drain(transport: &mut StreamTransport) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = transport.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stream_delivers_lines() {
        let data = b"{\"a\": 1}\n\n  {\"b\": 2}  \nnot json\n";
        let mut transport = StreamTransport::spawn(Cursor::new(data.to_vec()), "test");

        let events = drain(&mut transport).await;
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected,
                TransportEvent::Message(b"{\"a\": 1}".to_vec()),
                TransportEvent::Message(b"{\"b\": 2}".to_vec()),
                TransportEvent::Message(b"not json".to_vec()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_forwards_invalid_utf8_lines() {
        let data = b"{\"a\":1}\n\xff\xfe garbage\n{\"b\":2}\n";
        let mut transport = StreamTransport::spawn(Cursor::new(data.to_vec()), "binary");

        let events = drain(&mut transport).await;
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected,
                TransportEvent::Message(b"{\"a\":1}".to_vec()),
                TransportEvent::Message(b"\xff\xfe garbage".to_vec()),
                TransportEvent::Message(b"{\"b\":2}".to_vec()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_monitor_online() {
        use cellwatch_core::types::LinkStatus;
        use cellwatch_core::Monitor;

        use tokio::io::AsyncWriteExt;

        let (mut writer, peer) = tokio::io::duplex(1024);
        let transport = StreamTransport::spawn(peer, "binary");
        let handle = Monitor::builder().build().unwrap().start(transport);
        writer
            .write_all(b"{\"robot_mode\": 7}\n\xff\xfe\n{\"safety_mode\": 1}\n")
            .await
            .unwrap();

        let mut reader = handle.reader();
        let snapshot = reader
            .wait_for(|s| s.stats.applied == 2)
            .await
            .unwrap();
        assert_eq!(snapshot.stats.malformed, 1);
        assert_eq!(snapshot.stats.transport_errors, 0);
        assert_eq!(snapshot.liveness.status, LinkStatus::Online);
        assert!(reader.last_error().is_some());

        drop(writer);
        handle.join().await;
    }

    #[tokio::test]
    async fn test_stream_empty_input() {
        let mut transport = StreamTransport::spawn(Cursor::new(Vec::new()), "empty");
        assert_eq!(
            drain(&mut transport).await,
            vec![TransportEvent::Connected, TransportEvent::Closed]
        );
    }

    #[tokio::test]
    async fn test_description() {
        let transport = StreamTransport::spawn(Cursor::new(Vec::new()), "tcp://localhost:9090");
        assert_eq!(transport.description(), "stream: tcp://localhost:9090");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_replay_waits_between_lines() {
        let data = b"{}\n{}\n{}\n";
        let start = tokio::time::Instant::now();
        let mut transport = StreamTransport::spawn_paced(
            Cursor::new(data.to_vec()),
            "paced",
            Some(Duration::from_millis(500)),
        );

        let events = drain(&mut transport).await;
        assert_eq!(events.len(), 5);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"ctrl_temp\": 40.5}}").unwrap();
        file.flush().unwrap();

        let mut transport = StreamTransport::open_file(file.path(), None).await.unwrap();
        let events = drain(&mut transport).await;
        assert_eq!(events[1], TransportEvent::Message(b"{\"ctrl_temp\": 40.5}".to_vec()));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = StreamTransport::open_file("/nonexistent/cellwatch.jsonl", None).await;
        assert!(matches!(result, Err(AdapterError::Io(_))));
    }

    #[tokio::test]
    async fn test_from_bytes_channel() {
        let (tx, rx) = mpsc::channel(4);
        let mut transport = StreamTransport::from_bytes_channel(rx, "bridge");
        tx.send(b"{}".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(
            drain(&mut transport).await,
            vec![
                TransportEvent::Connected,
                TransportEvent::Message(b"{}".to_vec()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_stops_reader() {
        let (_tx, rx) = mpsc::channel::<Vec<u8>>(4);
        let mut transport = StreamTransport::from_bytes_channel(rx, "bridge");
        transport.disconnect().await.unwrap();
        let _ = drain(&mut transport).await;
    }
}
