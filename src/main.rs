// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use the_sluice::application::{Application, ApplicationReport};
use the_sluice::config::AppOptions;
use the_sluice::fragment::Fragment;
use the_sluice::observability::init_tracing;
use the_sluice::operators::{register_codecs, PingRx, PingTx};

const DEFAULT_PING_COUNT: u64 = 10;

/// Runs a two-fragment ping application locally or across processes.
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Ping between two fragments, in one process or many", long_about = None)]
struct Cli {
    /// Run the driver, which assigns fragments to workers.
    #[arg(long)]
    driver: bool,

    /// Run a worker, which executes the fragments the driver assigns.
    #[arg(long)]
    worker: bool,

    /// Driver address (`host`, `host:port`, `[v6]:port`, or `:port`).
    #[arg(long, default_value = "")]
    address: String,

    /// Address this worker binds its receivers on.
    #[arg(long = "worker-address", default_value = "")]
    worker_address: String,

    /// Comma-separated fragment names this worker asks for (`all` for any).
    #[arg(long, default_value = "")]
    fragments: String,

    /// YAML or TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> anyhow::Result<AppOptions> {
        let mut options = AppOptions::default()
            .with_driver_address(&self.address)?
            .with_worker_address(&self.worker_address)?
            .with_targets(&self.fragments);
        options.run_driver = self.driver;
        options.run_worker = self.worker;
        options.config_path = self.config.clone();
        Ok(options)
    }
}

fn ping_application(options: AppOptions) -> anyhow::Result<Application> {
    let mut app = Application::new("ping").with_options(options.clone());
    register_codecs(app.codecs_mut());
    if let Some(path) = &options.config_path {
        app.config(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    let count = app
        .from_config("tx")
        .value::<u64>("count")?
        .unwrap_or(DEFAULT_PING_COUNT);

    let mut tx = Fragment::new("fragment1");
    tx.add_operator(PingTx::operator("tx", count))?;
    let mut rx = Fragment::new("fragment2");
    let (rx_op, _received) = PingRx::operator("rx");
    rx.add_operator(rx_op)?;

    let tx = app.add_fragment(tx)?;
    let rx = app.add_fragment(rx)?;
    let pairs: BTreeSet<(&str, &str)> = [("tx.out", "rx.in")].into_iter().collect();
    app.add_flow(tx, rx, pairs)?;
    Ok(app)
}

fn summarize(report: &ApplicationReport) {
    for fragment in &report.fragments {
        tracing::info!(
            fragment = %fragment.fragment,
            reason = %fragment.stop_reason,
            ticks = fragment.ticks,
            "Fragment '{}' finished ({}) after {:?}",
            fragment.fragment,
            fragment.stop_reason,
            fragment.duration
        );
    }
    if let Some(driver) = &report.driver {
        for assignment in &driver.assignments {
            match &assignment.error {
                None => tracing::info!("{} ran on {}", assignment.fragment, assignment.worker),
                Some(error) => tracing::error!("{} failed on {}: {}", assignment.fragment, assignment.worker, error),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app = ping_application(cli.options()?)?;

    let report = app.run_async().await?;
    summarize(&report);

    if let Some(driver) = &report.driver {
        if !driver.is_success() {
            anyhow::bail!("{} fragment(s) failed", driver.failures().len());
        }
    }
    Ok(())
}
