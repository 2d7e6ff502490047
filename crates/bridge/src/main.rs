/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::metadata::LevelFilter;
use vbmc_bridge::Bridge;
use vbmc_config::Config;

#[derive(clap::Parser, Debug)]
#[clap(about = "Expose VMware VMs as IPMI/Redfish BMCs")]
struct Cli {
    #[clap(long, short, help = "Turn on debug logging (same as RUST_LOG=debug)")]
    debug: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Parser, Debug)]
enum Command {
    Run(RunCommand),
    #[clap(about = "Output an example JSON config file for use with run -c")]
    DefaultConfig,
}

#[derive(clap::Parser, Debug)]
struct RunCommand {
    #[clap(long, short, help = "Path to JSON configuration file")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli);

    match cli.command {
        Command::Run(run) => {
            let config = match Config::load(&run.config) {
                Ok(config) => config,
                Err(error) => {
                    tracing::error!("invalid configuration: {error}");
                    return ExitCode::from(1);
                }
            };
            match Bridge::spawn(config).await {
                Ok(bridge) => {
                    bridge.run_until_interrupted().await;
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    tracing::error!("startup failed: {error}");
                    ExitCode::from(error.exit_code() as u8)
                }
            }
        }
        Command::DefaultConfig => {
            println!("{}", Config::example_json());
            ExitCode::SUCCESS
        }
    }
}

fn setup_logging(cli: &Cli) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if cli.debug {
        Some(LevelFilter::DEBUG)
    } else {
        None
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::default().compact())
        .with(
            EnvFilter::builder()
                .with_default_directive(level.map(Into::into).unwrap_or(LevelFilter::INFO.into()))
                .from_env_lossy(),
        )
        .try_init()
    {
        panic!(
            "Failed to initialize trace logging. It's possible some earlier code path has \
            already set a global default log subscriber: {e}"
        );
    }
}
