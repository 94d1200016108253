//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Modules
//==================================================================================================
mod args;

//==================================================================================================
// Imports
//==================================================================================================
use anyhow::{
    Context,
    Result,
};
use args::Args;
use log::{
    debug,
    warn,
};
use sim_lib::Simulation;
use std::sync::atomic::Ordering;
use tokio::{
    runtime::Builder,
    signal,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Args = Args::parse(std::env::args().collect())?;
    let config = args.config();
    config.validate().context("invalid configuration")?;
    let sink = args.snapshot().open()?;

    let runtime = Builder::new_current_thread()
	.enable_all()
	.build()
	.context("building tokio runtime")?;

    runtime.block_on(async {
	let mut simulation = Simulation::new(config, sink)?;

	let interrupt = simulation.interrupt_handle();
	let watcher = tokio::spawn(async move {
	    match signal::ctrl_c().await {
		Ok(()) => {
		    warn!("[SIM] Interrupt received, shutting down");
		    interrupt.store(true, Ordering::SeqCst);
		},
		Err(e) => warn!("[SIM] Cannot listen for interrupts: {}", e),
	    }
	});

	let pool = simulation.spawn_producers()?;
	debug!("[SIM] {} user processes running", pool.running());
	let report = simulation.run(pool).await;
	watcher.abort();

	println!("{}", report?);
	Ok::<(), anyhow::Error>(())
    })
}
