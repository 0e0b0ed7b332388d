//! Media-plane seam
//!
//! The orchestrator never touches RTC transport directly: candidate audio
//! arrives as encoded chunks on an inbound channel and synthesized agent
//! audio leaves as frames on an outbound one. Whatever bridges those
//! channels to the room (a media gateway, a test harness, a pipe from an
//! external capture process) is interchangeable.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 100ms of 16kHz mono s16le audio
pub const AUDIO_FRAME_BYTES: usize = 3200;

/// Default channel depth; audio is real-time, deep buffers only add latency
pub const CHANNEL_BUFFER: usize = 64;

/// The orchestrator's end of the media plane
pub struct MediaLink {
    /// Candidate audio chunks, in capture order
    pub incoming: mpsc::Receiver<Bytes>,
    /// Synthesized agent audio frames
    pub outgoing: mpsc::Sender<Bytes>,
}

/// The bridge's end of the media plane
pub struct MediaEndpoints {
    pub incoming_tx: mpsc::Sender<Bytes>,
    pub outgoing_rx: mpsc::Receiver<Bytes>,
}

/// Create a connected link/endpoints pair
pub fn channel(buffer: usize) -> (MediaLink, MediaEndpoints) {
    let (incoming_tx, incoming) = mpsc::channel(buffer);
    let (outgoing, outgoing_rx) = mpsc::channel(buffer);
    (
        MediaLink { incoming, outgoing },
        MediaEndpoints {
            incoming_tx,
            outgoing_rx,
        },
    )
}

/// Bridge the media plane over stdio: candidate audio is read from stdin in
/// fixed-size chunks, agent audio is written to stdout. Logs go to stderr,
/// so a capture process can be piped in front and a playback process behind.
pub fn spawn_stdio_bridge(
    endpoints: MediaEndpoints,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let MediaEndpoints {
        incoming_tx,
        mut outgoing_rx,
    } = endpoints;

    let reader = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; AUDIO_FRAME_BYTES];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    debug!("stdin closed, candidate audio stream ended");
                    break;
                }
                Ok(n) => {
                    if incoming_tx
                        .send(Bytes::copy_from_slice(&buf[..n]))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed, stopping capture");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = outgoing_rx.recv().await {
            if let Err(e) = stdout.write_all(&frame).await {
                warn!(error = %e, "stdout write failed, stopping playback");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    (reader, writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_pair_connects() {
        let (mut link, mut endpoints) = channel(4);

        endpoints
            .incoming_tx
            .send(Bytes::from_static(b"chunk"))
            .await
            .unwrap();
        assert_eq!(link.incoming.recv().await.unwrap(), "chunk".as_bytes());

        link.outgoing
            .send(Bytes::from_static(b"frame"))
            .await
            .unwrap();
        assert_eq!(endpoints.outgoing_rx.recv().await.unwrap(), "frame".as_bytes());
    }

    #[tokio::test]
    async fn test_incoming_closes_when_bridge_dropped() {
        let (mut link, endpoints) = channel(4);
        drop(endpoints);
        assert!(link.incoming.recv().await.is_none());
    }
}
