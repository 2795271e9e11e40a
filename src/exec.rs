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

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1 as corev1;
use kube::Api;
use kube::api::AttachParams;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

/// Every Gitship app deployment names its workload container `app`; consoles
/// attach there unless the client asks for a sidecar explicitly.
pub const DEFAULT_CONTAINER: &str = "app";

/// Interactive shell invocation. TERM is set so line editing and color
/// sequences work in the browser terminal.
pub const SHELL_COMMAND: [&str; 3] = ["/bin/sh", "-c", "TERM=xterm-256color /bin/sh"];

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("exec stream has no {} channel", channel))]
    ChannelUnavailable { channel: &'static str },
}

/// Coordinates of the container a console session attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>, container: Option<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
        }
    }
}

/// Invoked at most once when the session tears down; force-releases whatever
/// the backend holds open.
pub type Releaser = Box<dyn FnOnce() + Send>;

/// An open interactive exec session.
///
/// `output` carries combined stdout+stderr (the remote end runs with a TTY,
/// which merges them). `exit` resolves to the remote exit-status text once
/// the shell terminates.
pub struct ExecStreams {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    pub exit: BoxFuture<'static, String>,
    pub releaser: Option<Releaser>,
}

/// The "open interactive exec stream" collaborator contract. Both the
/// standalone relay and the in-process console route go through this seam,
/// and tests substitute it with in-memory pipes.
pub trait ExecBackend: Send + Sync {
    fn open(&self, target: ExecTarget) -> BoxFuture<'static, Result<ExecStreams, Error>>;
}

/// Opens shells through the Kubernetes pod-exec subresource.
pub struct PodExecBackend {
    client: kube::Client,
}

impl PodExecBackend {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

impl ExecBackend for PodExecBackend {
    fn open(&self, target: ExecTarget) -> BoxFuture<'static, Result<ExecStreams, Error>> {
        let client = self.client.clone();

        async move {
            let pods: Api<corev1::Pod> = Api::namespaced(client, &target.namespace);
            let params = AttachParams::interactive_tty().container(target.container.as_str());

            let mut attached = pods
                .exec(&target.pod, SHELL_COMMAND, &params)
                .await
                .context(KubeSnafu)?;

            let stdin = attached
                .stdin()
                .context(ChannelUnavailableSnafu { channel: "stdin" })?;
            let output = attached
                .stdout()
                .context(ChannelUnavailableSnafu { channel: "stdout" })?;
            let status = attached
                .take_status()
                .context(ChannelUnavailableSnafu { channel: "status" })?;

            let exit = async move {
                status
                    .await
                    .and_then(|s| s.status)
                    .unwrap_or_else(|| "Unknown".to_string())
            }
            .boxed();

            // Park the attached process until the session tears down, then
            // abort it. Abort stops kube's internal message loop and with it
            // the exec connection; merely dropping the handle detaches that
            // loop and leaves the connection open until the remote shell
            // exits on its own.
            let releaser = spawn_releaser(move || attached.abort());

            Ok(ExecStreams {
                stdin: Box::new(stdin),
                output: Box::new(output),
                exit,
                releaser: Some(releaser),
            })
        }
        .boxed()
    }
}

/// Parks `abort` in a background task and returns a releaser that fires it.
/// The abort also runs when the releaser is dropped uninvoked, so an
/// abandoned session never outlives its bridge.
fn spawn_releaser(abort: impl FnOnce() + Send + 'static) -> Releaser {
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        // Err means the releaser was dropped without being called.
        let _ = rx.await;
        abort();
    });
    Box::new(move || {
        let _ = tx.send(());
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn test_default_container() {
        let target = ExecTarget::new("gitship-user-alice", "web-7c9", None);
        assert_eq!(target.container, "app");

        let target = ExecTarget::new("gitship-user-alice", "web-7c9", Some("sidecar".into()));
        assert_eq!(target.container, "sidecar");
    }

    // Invoking the releaser runs the backend abort within bounded time, not
    // merely when the remote shell happens to exit.
    #[tokio::test]
    async fn test_releaser_runs_abort() {
        let (aborted_tx, aborted_rx) = oneshot::channel::<()>();
        let releaser = spawn_releaser(move || {
            let _ = aborted_tx.send(());
        });

        releaser();

        timeout(Duration::from_secs(5), aborted_rx)
            .await
            .unwrap()
            .unwrap();
    }

    // A releaser that is dropped without being called still aborts the
    // session it guards.
    #[tokio::test]
    async fn test_dropped_releaser_runs_abort() {
        let (aborted_tx, aborted_rx) = oneshot::channel::<()>();
        let releaser = spawn_releaser(move || {
            let _ = aborted_tx.send(());
        });

        drop(releaser);

        timeout(Duration::from_secs(5), aborted_rx)
            .await
            .unwrap()
            .unwrap();
    }
}
