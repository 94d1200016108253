//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Modules
//==================================================================================================
mod channel;

pub use channel::{
    Poll,
    RequestChannel,
    RequestSender,
};

//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    Action,
    ConfigError,
    PageNumber,
    ProcessId,
    Request,
};
use log::debug;
use rand::{
    rngs::StdRng,
    Rng,
    SeedableRng,
};
use std::ops::RangeInclusive;
use tokio::time::{
    sleep,
    Duration,
};

//==================================================================================================
// Structures
//==================================================================================================
/// Shape of the random workload every user process follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    /// Pages per process; requested pages are drawn from `0..page_count`.
    pub page_count		: usize,
    /// Simulated runtime budget. Each request consumes 1..=100 units.
    pub max_runtime		: u64,
    /// Chance (in percent) to terminate after each request.
    pub terminate_percent	: u8,
    /// Real delay between two requests, in milliseconds.
    pub delay_ms		: RangeInclusive<u64>,
}

/// Represents a simulated user process issuing random reads and writes.
#[derive(Clone, Debug)]
pub struct UserProcess
{
    /// Raw process id carried on every request (private field)
    up_pid		: ProcessId,
    /// Runtime consumed so far (private field)
    up_runtime		: u64,
    /// Page touched by the last request (private field)
    up_last_page	: PageNumber,
    /// Process decided to stop after its last request (private field)
    up_terminating	: bool,
    /// Termination request was already produced (private field)
    up_finished		: bool,
    /// Draws requests (private field)
    up_rng		: StdRng,
    /// Draws delays, kept apart so pacing never changes the request stream (private field)
    up_pacing		: StdRng,
    workload		: Workload,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl Workload {
    pub const RUNTIME_STEP: RangeInclusive<u64> = 1..=100;

    pub fn validate(&self) -> Result<(), ConfigError> {
	if self.page_count == 0 {
	    return Err(ConfigError::ZeroPages);
	}
	if self.max_runtime == 0 {
	    return Err(ConfigError::InvalidWorkload("runtime budget must be positive".to_string()));
	}
	if self.terminate_percent > 100 {
	    return Err(ConfigError::InvalidWorkload(format!(
		"termination chance {}% is above 100%",
		self.terminate_percent,
	    )));
	}
	if self.delay_ms.is_empty() {
	    return Err(ConfigError::InvalidWorkload(format!(
		"empty delay range {}..={}",
		self.delay_ms.start(),
		self.delay_ms.end(),
	    )));
	}
	Ok(())
    }
}

impl Default for Workload {
    fn default() -> Self {
	Self {
	    page_count: 32,
	    max_runtime: 5000,
	    terminate_percent: 10,
	    delay_ms: 1..=100,
	}
    }
}

impl UserProcess
{
    /// Creates a new user process.
    ///
    /// # Arguments
    /// * `pid`      - Raw process id put on every request;
    /// * `seed`     - Seed of the process's own random generator;
    /// * `workload` - Request pattern to follow;
    pub fn new(pid: ProcessId, seed: u64, workload: Workload) -> Self
    {
	debug!("[{}] Creating user process (seed {})", pid, seed);

	Self {
	    up_pid: pid,
	    up_runtime: 0,
	    up_last_page: PageNumber(0),
	    up_terminating: false,
	    up_finished: false,
	    up_rng: StdRng::seed_from_u64(seed),
	    up_pacing: StdRng::seed_from_u64(!seed),
	    workload,
	}
    }

    pub fn pid(&self) -> ProcessId {
	self.up_pid
    }

    pub fn runtime(&self) -> u64 {
	self.up_runtime
    }

    /// Produces the next request of this process.
    ///
    /// Reads and writes are drawn uniformly over the page range. Once the process decides
    /// to stop, or its runtime budget is spent, a single `Terminate` is produced.
    ///
    /// # Returns
    /// * `Some(Request)` - the next request
    /// * `None`          - after the termination request
    pub fn next_request(&mut self) -> Option<Request> {
	if self.up_finished {
	    return None;
	}
	if self.up_terminating || self.up_runtime >= self.workload.max_runtime {
	    self.up_finished = true;
	    return Some(Request::terminate(self.up_pid, self.up_last_page));
	}

	self.up_runtime += self.up_rng.gen_range(Workload::RUNTIME_STEP);
	let page = PageNumber(self.up_rng.gen_range(0..self.workload.page_count));
	let action = if self.up_rng.gen_bool(0.5) { Action::Write } else { Action::Read };
	self.up_terminating = self.up_rng.gen_range(0..100u8) < self.workload.terminate_percent;
	self.up_last_page = page;

	Some(Request::access(self.up_pid, page, action))
    }

    /// Real delay before the next request.
    pub fn next_delay(&mut self) -> Duration {
	Duration::from_millis(self.up_pacing.gen_range(self.workload.delay_ms.clone()))
    }

    /// Sends requests until the process terminates or the channel is closed.
    pub async fn run(mut self, sender: RequestSender) {
	debug!("[{}] Started", self.up_pid);

	while let Some(request) = self.next_request() {
	    if sender.send(request).await.is_err() {
		debug!("[{}] Request channel closed, stopping.", self.up_pid);
		return;
	    }
	    match request.action {
		Action::Terminate => debug!("[{}] Terminating", self.up_pid),
		action => {
		    debug!("[{}] {} page {}", self.up_pid, action, request.page_number);
		    sleep(self.next_delay()).await;
		},
	    }
	}

	debug!(
	    "[{}] Finished execution (runtime {})",
	    self.up_pid,
	    self.up_runtime,
	);
    }
}
