//! SnowX demo host.
//!
//! Loads the plugins under `PLUGIN_DIR` (default `plugins/`) and runs until
//! a stop request arrives, either from the `auto_stop` plugin, a control
//! event, or Ctrl-C. A second Ctrl-C exits without waiting for the stop.
//!
//! # Usage
//!
//! ```bash
//! snowx-demo [config.json]
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use example::Interrupt;
use snowx_core_plugins::TracingPlugin;
use snowx_host::framework::Framework;
use snowx_host::module::StaticModules;
use snowx_system::config::DEFAULT_CONFIG_FILE;

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let Some(config) = example::startup_config(path) else {
        return ExitCode::FAILURE;
    };

    TracingPlugin::from_config(&config).init();
    let loader = example::loader(&config);
    let framework = match Framework::from_config(
        config,
        Arc::new(loader),
        Arc::new(StaticModules::new()),
    ) {
        Ok(framework) => framework,
        Err(error) => {
            tracing::error!(error = %error, "framework could not be built");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::clone(framework.state());
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match example::interrupt(&state) {
                Interrupt::Stop => tracing::info!("Ctrl-C received, stopping"),
                Interrupt::Exit => {
                    tracing::warn!("Ctrl-C received again, exiting without waiting for the stop");
                    std::process::exit(130);
                }
            }
        }
    });

    loop {
        match framework.run().await {
            Ok(request) if request.restart => {
                if request.update {
                    tracing::warn!(package = ?request.update_package, "update requested, restarting without installing it");
                }
                tracing::info!("Restarting.");
            }
            Ok(_) => return ExitCode::SUCCESS,
            Err(error) => {
                tracing::error!(error = %error, "framework failed");
                return ExitCode::FAILURE;
            }
        }
    }
}
