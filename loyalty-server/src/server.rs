//! loyalty-server/src/server.rs
//!
//! Starts the engine, the points award loop and (optionally) the console,
//! then waits for Ctrl-C.

use tokio::sync::watch;
use tracing::{error, info};

use loyalty_core::tasks::spawn_points_award_task;
use loyalty_core::Error;

use crate::console::run_console;
use crate::context::ServerContext;
use crate::Args;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let ctx = ServerContext::new(&args).await?;

    let status = ctx.engine.status().await;
    info!("Loyalty module started. enabled={}, working={}", status.enabled, status.working);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let award_task = spawn_points_award_task(
        ctx.engine.clone(),
        ctx.presence.clone(),
        ctx.activity.clone(),
        shutdown_rx.clone(),
    );

    let console_task = if args.console {
        Some(tokio::spawn(run_console(
            ctx.engine.clone(),
            ctx.presence.clone(),
            ctx.activity.clone(),
            shutdown_rx,
        )))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down.");

    let _ = shutdown_tx.send(true);
    if let Err(e) = award_task.await {
        error!("points award task ended abnormally: {:?}", e);
    }
    if let Some(task) = console_task {
        // stdin reads don't observe the shutdown flag until the next line.
        task.abort();
    }

    if let Err(e) = ctx.engine.close().await {
        error!("Error closing loyalty engine: {:?}", e);
    }
    ctx.hub.shutdown();
    ctx.hub.join().await;
    info!("Shutdown complete.");
    Ok(())
}
