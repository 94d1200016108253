//==================================================================================================
// Imports
//==================================================================================================
use log::{
    debug,
    info,
    warn,
};
use mem_lib::ProcessId;
use task_lib::{
    Poll,
    RequestChannel,
    RequestSender,
    UserProcess,
};
use tokio::task::JoinHandle;

//==================================================================================================
// Structures
//==================================================================================================
/// Owns the request channel and every running user process.
///
/// `shutdown` closes the channel and aborts the producers exactly once; it also runs on
/// drop, so the resources are released on every exit path of the simulation.
pub struct ProducerPool {
    channel	: Option<RequestChannel>,
    producers	: Vec<(ProcessId, JoinHandle<()>)>,
    released	: bool,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl ProducerPool {
    /// Creates an empty pool and the sender producers will use.
    pub fn new(capacity: usize) -> (RequestSender, Self) {
	let (sender, channel) = RequestChannel::new(capacity);
	debug!("[SIM] Request channel created (capacity {})", capacity);

	(sender, Self {
	    channel: Some(channel),
	    producers: Vec::new(),
	    released: false,
	})
    }

    /// Spawns every user process on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(processes: Vec<UserProcess>, capacity: usize) -> Self {
	let (sender, mut pool) = Self::new(capacity);

	for process in processes {
	    let pid = process.pid();
	    let handle = tokio::spawn(process.run(sender.clone()));
	    pool.track(pid, handle);
	}
	info!("[SIM] Spawned {} user processes", pool.producers.len());

	pool
    }

    /// Adds a running producer to the pool so it is torn down with it.
    pub fn track(&mut self, pid: ProcessId, handle: JoinHandle<()>) {
	self.producers.push((pid, handle));
    }

    /// Non-blocking read of the next request. A released pool is always `Closed`.
    pub fn poll(&mut self) -> Poll {
	match self.channel.as_mut() {
	    Some(channel) => channel.poll(),
	    None => Poll::Closed,
	}
    }

    pub fn running(&self) -> usize {
	self.producers
	    .iter()
	    .filter(|(_, handle)| !handle.is_finished())
	    .count()
    }

    pub fn is_released(&self) -> bool {
	self.released
    }

    /// Stops accepting requests, aborts every still-running producer and drops the channel.
    ///
    /// # Returns
    /// * Number of producers that had to be aborted. Zero on every call after the first.
    pub fn shutdown(&mut self) -> usize {
	if self.released {
	    return 0;
	}
	self.released = true;
	info!("[SIM] Cleaning up resources...");

	if let Some(channel) = self.channel.as_mut() {
	    channel.close();
	}

	let mut aborted = 0;
	for (pid, handle) in &self.producers {
	    if !handle.is_finished() {
		debug!("[SIM] Aborting {}", pid);
		handle.abort();
		aborted += 1;
	    }
	}

	self.channel = None;
	debug!("[SIM] Request channel removed");
	aborted
    }

    /// Waits for every producer to stop after `shutdown`, logging the ones that failed.
    ///
    /// Every handle is visited even if an earlier one reports a failure.
    pub async fn reap(&mut self) -> usize {
	let mut failures = 0;

	for (pid, handle) in self.producers.drain(..) {
	    match handle.await {
		Ok(()) => {},
		Err(e) if e.is_cancelled() => {},
		Err(e) => {
		    warn!("[SIM] User process {} did not stop cleanly: {}", pid, e);
		    failures += 1;
		},
	    }
	}

	failures
    }
}

impl Drop for ProducerPool {
    fn drop(&mut self) {
	self.shutdown();
    }
}

//==================================================================================================
// Tests
//==================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use mem_lib::{Action, PageNumber, Request};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_runs_once() {
	let (sender, mut pool) = ProducerPool::new(4);
	pool.track(ProcessId(1), tokio::spawn(std::future::pending::<()>()));
	pool.track(ProcessId(2), tokio::spawn(std::future::pending::<()>()));
	assert_eq!(pool.running(), 2);

	assert_eq!(pool.shutdown(), 2);
	assert_eq!(pool.shutdown(), 0);
	assert!(pool.is_released());
	assert_eq!(pool.poll(), Poll::Closed);
	assert!(sender.is_closed());

	assert_eq!(pool.reap().await, 0);
    }

    #[tokio::test]
    async fn test_drop_releases_resources() {
	let marker = Arc::new(());
	let (sender, mut pool) = ProducerPool::new(4);

	let held = Arc::clone(&marker);
	pool.track(ProcessId(1), tokio::spawn(async move {
	    let _held = held;
	    std::future::pending::<()>().await;
	}));
	tokio::task::yield_now().await;
	assert_eq!(Arc::strong_count(&marker), 2);

	drop(pool);
	assert!(sender.is_closed());
	for _ in 0..10 {
	    tokio::task::yield_now().await;
	}
	assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[tokio::test]
    async fn test_poll_reads_in_arrival_order() {
	let (sender, mut pool) = ProducerPool::new(4);
	let first = Request::access(ProcessId(1), PageNumber(1), Action::Read);
	let second = Request::access(ProcessId(1), PageNumber(2), Action::Write);
	sender.send(first).await.unwrap();
	sender.send(second).await.unwrap();

	assert_eq!(pool.poll(), Poll::Message(first));
	assert_eq!(pool.poll(), Poll::Message(second));
	assert_eq!(pool.poll(), Poll::Empty);
    }

    #[tokio::test]
    async fn test_reap_reports_panicked_producer() {
	let (_sender, mut pool) = ProducerPool::new(1);
	pool.track(ProcessId(9), tokio::spawn(async { panic!("producer crashed") }));
	pool.track(ProcessId(10), tokio::spawn(async {}));

	assert_eq!(pool.reap().await, 1);
	assert_eq!(pool.running(), 0);
    }
}
