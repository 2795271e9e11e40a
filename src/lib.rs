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

//! Gitship console relay: bridges browser terminals into interactive shell
//! sessions inside cluster pods.

use std::sync::Arc;

use crate::exec::PodExecBackend;
use crate::token::SigningSecret;

pub mod bridge;
pub mod console;
pub mod exec;
pub mod relay;
pub mod token;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();
}

/// Runs the standalone console relay process.
pub async fn run_relay(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let secret = SigningSecret::from_env()?;
    let client = kube::Client::try_default().await?;
    let backend = Arc::new(PodExecBackend::new(client));

    relay::run(port, secret, backend).await
}

/// Runs the authenticated console web tier with the in-process bridge.
pub async fn run_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let secret = SigningSecret::from_env()?;
    let client = kube::Client::try_default().await?;
    let backend = Arc::new(PodExecBackend::new(client));

    console::run(port, secret, backend).await
}
