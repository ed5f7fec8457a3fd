// Copyright 2025 Crrow
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

use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use retrieve_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use retrieve_transfer::{
    DEFAULT_BUFFER_SIZE, Destination, FileStreamProvider, LENGTH_HINT_OPTION, PercentComplete,
    TransferConfig, TransferController, TransferError, TransferObserver, TransferOptions,
    TransferRequest, TransferSession,
};
use snafu::{ResultExt, Whatever, whatever};
use tracing::info;

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "retrieve",
about = "Stream a file to a destination with pause, resume and cancel",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Fetch(FetchArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Copies SOURCE into DEST on a background worker, printing progress.
Ctrl-C cancels the transfer and releases both ends.
Examples:

retrieve fetch file:///var/log/syslog /tmp/syslog.copy
retrieve fetch ./big.iso ./out/big.iso --buffer-size 65536 --no-length

")]
struct FetchArgs {
    /// `file://` URL or local path to read from.
    source: String,

    /// File to write; missing parent directories are created.
    dest: PathBuf,

    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Level filter, e.g. `debug` or `info,retrieve_transfer=trace`.
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write rotated log files here in addition to stdout.
    #[arg(long)]
    log_dir: Option<String>,

    /// Hide the source length so progress is reported as a byte count.
    #[arg(long)]
    no_length: bool,
}

impl FetchArgs {
    fn logging_options(&self) -> LoggingOptions {
        LoggingOptions::builder()
            .maybe_level(self.log_level.clone())
            .log_format(self.log_format)
            .dir(self.log_dir.clone().unwrap_or_default())
            .build()
    }

    fn request(self) -> TransferRequest {
        let mut options = TransferOptions::new();
        if self.no_length {
            options.insert(LENGTH_HINT_OPTION.to_string(), serde_json::Value::Bool(false));
        }
        TransferRequest::builder()
            .locator(self.source)
            .destination(Destination::path(self.dest))
            .options(options)
            .observer(Arc::new(ProgressPrinter))
            .build()
    }

    async fn run(self) -> Result<(), Whatever> {
        let _guards = init_global_logging("retrieve", &self.logging_options());
        set_panic_hook();

        let config = TransferConfig::builder()
            .buffer_size(self.buffer_size)
            .build();
        let controller = Arc::new(TransferController::new(FileStreamProvider, config));

        let interrupt = controller.clone();
        ctrlc::set_handler(move || {
            if interrupt.cancel() {
                eprintln!("\ncancelling...");
            }
        })
        .whatever_context("failed to install Ctrl-C handler")?;

        controller
            .start(self.request())
            .await
            .whatever_context("failed to start transfer")?;

        let outcome = controller.wait().await;
        eprintln!();
        info!(
            transfer = %outcome.id,
            state = %outcome.state,
            bytes = outcome.bytes_received,
            "Transfer finished"
        );
        match outcome.error {
            None => {
                println!("retrieved {} bytes", outcome.bytes_received);
                Ok(())
            }
            Some(err) => whatever!(
                "transfer {} {} after {} bytes: {err}",
                outcome.id,
                outcome.state,
                outcome.bytes_received
            ),
        }
    }
}

/// Prints one overwriting progress line on stderr.
struct ProgressPrinter;

impl TransferObserver for ProgressPrinter {
    fn on_start(&self, session: &TransferSession) {
        let source = session
            .resolved_locator()
            .unwrap_or_else(|| session.locator().to_string());
        match session.total_length() {
            Some(total) => eprintln!("retrieving {source} ({total} bytes)"),
            None => eprintln!("retrieving {source}"),
        }
    }

    fn on_data(&self, session: &TransferSession, bytes_received: u64) {
        match session.percent_complete() {
            PercentComplete::Determinate(_) => eprint!(
                "\r{:>6} {bytes_received} bytes",
                session.percent_complete().to_string()
            ),
            PercentComplete::Indeterminate => eprint!("\r{bytes_received} bytes"),
        }
    }

    fn on_done(&self, _session: &TransferSession, error: Option<&TransferError>) {
        if let Some(err) = error {
            eprint!("\r{}", err.kind());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    match cli.commands {
        Commands::Fetch(args) => args.run().await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() { Cli::command().debug_assert(); }

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::try_parse_from(["retrieve", "fetch", "file:///tmp/a", "/tmp/b"]).unwrap();
        let Commands::Fetch(args) = cli.commands;
        assert_eq!(args.source, "file:///tmp/a");
        assert_eq!(args.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(!args.no_length);

        let logging = args.logging_options();
        assert!(logging.dir.is_empty());
        assert_eq!(logging.level, None);
    }

    #[test]
    fn test_fetch_flags() {
        let cli = Cli::try_parse_from([
            "retrieve",
            "fetch",
            "./in.bin",
            "./out.bin",
            "--buffer-size",
            "65536",
            "--log-format",
            "json",
            "--log-level",
            "debug",
            "--no-length",
        ])
        .unwrap();
        let Commands::Fetch(args) = cli.commands;
        assert_eq!(args.buffer_size, 65536);
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.logging_options().level.as_deref(), Some("debug"));

        let request = args.request();
        assert!(format!("{request:?}").contains("in.bin"));
    }
}
