// plaid binary
//
// Loads configuration, installs logging and serves either the TodoMVC demo
// or a placeholder page until ctrl-c.

use anyhow::Result;
use clap::Parser;
use plaid::cli::{self, Cli};
use plaid::config::{Config, VERSION};
use plaid::stateful::Runtime;
use plaid::web::{self, Ctx, PageHub, PageResponse, Tag};
use plaid::{demo, logging};
use std::sync::Arc;

/// Print a config error in a box and exit
fn config_failure(err: &anyhow::Error) -> ! {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║                      CONFIG ERROR                            ║");
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
    eprintln!();
    eprintln!("  {err:#}");
    eprintln!();
    if let Some(path) = Config::config_path() {
        eprintln!("  Fix the file or reset it: plaid config --reset ({})", path.display());
    }
    eprintln!();
    std::process::exit(1);
}

fn placeholder_router(max_form_size: usize) -> axum::Router {
    let hub = PageHub::new(|_ctx: &Ctx| {
        Ok(PageResponse {
            page_title: "plaid".into(),
            body: Arc::new(Tag::h1().text("plaid is running; the demo is disabled")),
        })
    });
    web::router(Arc::new(Runtime::new()), hub, max_form_size)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli::handle_cli(&cli) {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => config_failure(&e),
    };

    // Keep the guard alive so file logs flush on exit
    let _file_guard = logging::init(&config.logging);

    tracing::info!(version = VERSION, "plaid starting");

    let app = if config.demo.enabled {
        tracing::info!("Serving TodoMVC demo");
        demo::router(config.server.max_form_size)?
    } else {
        placeholder_router(config.server.max_form_size)
    };

    web::serve(config.server.bind_addr, app).await
}
