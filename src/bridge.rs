// Copyright 2025 Gitship Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The exec session bridge: relays bytes between one WebSocket and one
//! remote interactive shell until either side closes.
//!
//! The bridge is generic over the socket halves so both serving modes (the
//! token-authenticated relay and the in-process console route) and the unit
//! tests share the same state machine.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::{ExecBackend, ExecStreams, ExecTarget};

/// Synthetic lines interleaved with shell output. On the wire they are
/// indistinguishable from real output; the terminal renderer just prints
/// them.
pub const CONNECTED_BANNER: &str = "\r\n[Gitship] Connected to container shell.\r\n";

/// How long to wait for the exit-status callback after the output channel
/// reaches EOF, so the disconnect notice can carry the real status.
const EXIT_STATUS_GRACE: Duration = Duration::from_secs(2);

/// Opens an exec session against `target` and relays it over the socket.
///
/// On open failure the client sees one error line and a non-normal close;
/// no relay channels are ever created. Errors never propagate out of the
/// session: this future always runs to completion.
pub async fn serve<T, R, E>(mut ws_tx: T, ws_rx: R, backend: Arc<dyn ExecBackend>, target: ExecTarget)
where
    T: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    info!(
        namespace = %target.namespace,
        pod = %target.pod,
        container = %target.container,
        "opening console session"
    );

    let streams = match backend.open(target).await {
        Ok(streams) => streams,
        Err(error) => {
            warn!(%error, "failed to open exec stream");
            let line = format!("\r\nError executing command: {error}\r\n");
            let _ = ws_tx.send(Message::Text(line.into())).await;
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "exec failed".into(),
                })))
                .await;
            return;
        }
    };

    let _ = ws_tx.send(Message::Text(CONNECTED_BANNER.into())).await;

    run(ws_tx, ws_rx, streams).await;
}

/// Relays an already-open exec session until either endpoint closes.
///
/// The two directions run concurrently and independently; each preserves
/// byte order and forwards verbatim (no line buffering, no framing beyond
/// the WebSocket message boundary, no text transformation). Either direction
/// ending cancels the other, after which exactly one disconnect notice is
/// sent best-effort and the backend resources are released exactly once.
pub async fn run<T, R, E>(ws_tx: T, ws_rx: R, streams: ExecStreams)
where
    T: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let ExecStreams {
        mut stdin,
        mut output,
        mut exit,
        mut releaser,
    } = streams;

    let cancel = CancellationToken::new();

    let client_to_remote = {
        let cancel = cancel.clone();
        let mut ws_rx = ws_rx;
        async move {
            loop {
                let msg = tokio::select! {
                    msg = ws_rx.next() => msg,
                    _ = cancel.cancelled() => break,
                };
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if stdin.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if stdin.write_all(text.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are transport keepalive, not shell input.
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
            // End-of-input to the remote shell.
            let _ = stdin.shutdown().await;
            cancel.cancel();
        }
    };

    let remote_to_client = {
        let cancel = cancel.clone();
        let mut ws_tx = ws_tx;
        async move {
            let mut buf = vec![0u8; 8192];
            let status = loop {
                // Biased: drain pending output before acting on the exit
                // callback or cancellation, so trailing shell output is not
                // dropped.
                tokio::select! {
                    biased;
                    read = output.read(&mut buf) => match read {
                        Ok(0) | Err(_) => {
                            // Output closed; the exit callback usually fires
                            // right behind it.
                            break tokio::time::timeout(EXIT_STATUS_GRACE, &mut exit).await.ok();
                        }
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            if ws_tx.send(Message::Binary(chunk)).await.is_err() {
                                break None;
                            }
                        }
                    },
                    status = &mut exit => break Some(status),
                    _ = cancel.cancelled() => break None,
                }
            };
            cancel.cancel();
            (ws_tx, status)
        }
    };

    let ((mut ws_tx, status), ()) = tokio::join!(remote_to_client, client_to_remote);

    let status = status.unwrap_or_else(|| "Unknown".to_string());
    debug!(%status, "console session closing");

    // Best effort: the socket may already be gone.
    let notice = format!("\r\n[Disconnected: {status}]\r\n");
    let _ = ws_tx.send(Message::Text(notice.into())).await;
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await;

    if let Some(release) = releaser.take() {
        release();
    }
}
