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

use clap::{Parser, Subcommand};
use gitship_console::{run_relay, run_server};

#[derive(Parser)]
#[command(name = "gitship-console")]
#[command(about = "Gitship console relay CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the standalone token-authenticated console relay
    Relay {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8090)]
        port: u16,
    },

    /// Run the authenticated console web tier
    Server {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Relay { port } => run_relay(port).await?,
        Commands::Server { port } => run_server(port).await?,
    }

    Ok(())
}
