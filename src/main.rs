//! scrapegen: one bounded generation-and-publish run per invocation.
//!
//! Exit status: 0 on success or nothing to do, 1 when the batch could not be
//! published or ledgered, 2 when configuration is unusable.

use std::process::ExitCode;

use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scrapegen::{config, Clients, Pipeline};

/// `RUST_LOG` wins; otherwise info for this crate and warn for the rest.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scrapegen=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match config::load_default() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = ?e, "configuration error");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return ExitCode::from(2);
        }
    };

    let clients = Clients::from_config(&cfg);
    let pipeline = Pipeline::new(cfg, clients);
    tracing::info!(
        sources = pipeline.config().sources.len(),
        batch_size = pipeline.config().limits.batch_size,
        max_links = pipeline.config().limits.max_links_per_run,
        "starting run"
    );
    match runtime.block_on(pipeline.run_once(Utc::now())) {
        Ok(report) => {
            tracing::info!(published = report.published, attempted = report.attempted, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::from(1)
        }
    }
}
