//! Serve subcommand implementation.

use crate::config::Settings;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output;
use crate::server;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the HTTP API.
#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// Address to bind (overrides server.host)
    #[arg(long, value_name = "ADDR")]
    pub host: Option<IpAddr>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "TAPO_INVENTORY_PORT")]
    pub port: Option<u16>,
}

impl ServeCommand {
    pub async fn execute(&self, settings: Settings, quiet: bool) -> CliResult<()> {
        let addr = SocketAddr::new(
            self.host.unwrap_or(settings.server.host),
            self.port.unwrap_or(settings.server.port),
        );
        let context = AppContext::open(settings, None).await?;

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                on_signal.cancel();
            }
        });

        if !quiet {
            output::print_info(&format!("Serving device API on http://{}", addr));
        }

        server::serve(&context, addr, shutdown).await
    }
}
