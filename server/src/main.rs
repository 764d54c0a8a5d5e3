//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Decoy server binary
//!
//! Capture records go to standard output or `--capture-log`; diagnostics go
//! to standard error, filtered by `RUST_LOG` (default `info`).

mod cli;

use clap::Parser;
use cli::Args;
use decoy_service::{CaptureSink, DecoyConfig, LifecycleController, Result, WriterSink};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.to_config();

    let result = match &args.capture_log {
        Some(path) => match WriterSink::append_file(path).await {
            Ok(sink) => serve(config, sink).await,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot open capture log");
                return ExitCode::FAILURE;
            }
        },
        None => serve(config, WriterSink::stdout()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Decoy server failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve<S: CaptureSink>(config: DecoyConfig, sink: S) -> Result<()> {
    let controller = LifecycleController::start(config, sink).await?;
    if let Some(ssh) = controller.ssh_listener() {
        info!(address = %ssh.bind_address(), "Secure shell decoy listening");
    }
    if let Some(plaintext) = controller.plaintext_listener() {
        info!(address = %plaintext.bind_address(), "Plaintext decoy listening");
    }
    controller.run_until_signal().await?;
    Ok(())
}
