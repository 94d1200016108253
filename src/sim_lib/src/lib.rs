//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Modules
//==================================================================================================
mod config;
mod pool;
mod sink;

pub use config::{
    Preset,
    SimConfig,
};
pub use pool::ProducerPool;
pub use sink::{
    SinkTarget,
    SnapshotSink,
};

//==================================================================================================
// Imports
//==================================================================================================
use anyhow::{
    Context,
    Result,
};
use log::{
    debug,
    error,
    info,
    trace,
    warn,
};
use mem_lib::{
    Action,
    ConfigError,
    LogicalTime,
    ProcessId,
    Request,
};
use mmu_lib::{
    AccessOutcome,
    MemoryManager,
    MemoryStats,
    ReleaseSummary,
};
use task_lib::{
    Poll,
    UserProcess,
};
use std::{
    fmt,
    sync::{
	atomic::{
	    AtomicBool,
	    Ordering,
	},
	Arc,
    },
};
use tokio::time::sleep;

//==================================================================================================
// Enum
//==================================================================================================
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimState {
    Running,
    Draining,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    TimeLimit,
    AllTerminated,
    Interrupted,
}

//==================================================================================================
// Structures
//==================================================================================================
/// Outcome of a whole run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimReport {
    pub reason			: ExitReason,
    pub ticks			: u64,
    pub final_time		: LogicalTime,
    pub stats			: MemoryStats,
    pub released		: Vec<ReleaseSummary>,
    pub producers_aborted	: usize,
}

/// Drives the memory manager from the request channel, one message per tick at most.
pub struct Simulation
{
    config	: SimConfig,
    memory	: MemoryManager,
    sink	: SnapshotSink,
    state	: SimState,
    interrupt	: Arc<AtomicBool>,
    ticks	: u64,
    released	: Vec<ReleaseSummary>,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let reason = match self {
	    ExitReason::TimeLimit => "time limit reached",
	    ExitReason::AllTerminated => "all processes terminated",
	    ExitReason::Interrupted => "interrupted",
	};
	f.write_str(reason)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(
	    f,
	    "Simulation finished ({}) after {} ticks at {} ns: {}, processes released={}, producers aborted={}",
	    self.reason,
	    self.ticks,
	    self.final_time,
	    self.stats,
	    self.released.len(),
	    self.producers_aborted,
	)
    }
}

impl Simulation
{
    /// Creates a simulation with empty memory.
    ///
    /// # Returns
    /// * `Ok(Simulation)`   - if `config` is valid
    /// * `Err(ConfigError)` - otherwise; nothing has been spawned yet
    pub fn new(config: SimConfig, sink: SnapshotSink) -> Result<Self, ConfigError> {
	config.validate()?;
	let memory = MemoryManager::new(
	    config.frame_count,
	    config.page_count,
	    config.max_processes,
	    config.time_increment,
	)?;

	Ok(Self {
	    config,
	    memory,
	    sink,
	    state: SimState::Running,
	    interrupt: Arc::new(AtomicBool::new(false)),
	    ticks: 0,
	    released: Vec::new(),
	})
    }

    /// Flag that, once set, makes the loop drain at the next tick boundary.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
	Arc::clone(&self.interrupt)
    }

    pub fn memory(&self) -> &MemoryManager {
	&self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryManager {
	&mut self.memory
    }

    pub fn state(&self) -> SimState {
	self.state
    }

    pub fn config(&self) -> &SimConfig {
	&self.config
    }

    /// Registers and spawns one user process per slot.
    ///
    /// Process `i` gets id `first_pid + i` and seed `seed + i`. Must be called from within
    /// a tokio runtime.
    pub fn spawn_producers(&mut self) -> Result<ProducerPool> {
	let workload = self.config.workload();
	let mut processes = Vec::with_capacity(self.config.max_processes);

	for i in 0..self.config.max_processes {
	    let offset = u32::try_from(i).context("process index overflows u32")?;
	    let pid = ProcessId(self.config.first_pid + offset);
	    self.memory
		.register_process(pid)
		.with_context(|| format!("registering {}", pid))?;
	    processes.push(UserProcess::new(pid, self.config.seed.wrapping_add(i as u64), workload.clone()));
	}

	Ok(ProducerPool::spawn(processes, self.config.channel_capacity))
    }

    /// Runs ticks until the time limit, the last termination or an interrupt, then drains.
    ///
    /// The pool is owned for the duration of the run, so it is released on every return
    /// path, including errors.
    pub async fn run(&mut self, mut pool: ProducerPool) -> Result<SimReport> {
	info!(
	    "[SIM] Starting simulation: {} frames, {} pages, {} processes",
	    self.config.frame_count,
	    self.config.page_count,
	    self.memory.active_processes(),
	);

	let reason = loop {
	    if let Some(reason) = self.exit_reason() {
		break reason;
	    }
	    self.step(&mut pool)?;
	    sleep(self.config.tick_interval).await;
	};
	info!("[SIM] Stopping: {}", reason);

	self.transition(SimState::Draining);
	let producers_aborted = pool.shutdown();
	let failures = pool.reap().await;
	if failures > 0 {
	    warn!("[SIM] {} user processes failed during teardown", failures);
	}
	self.sink.flush().context("flushing snapshot output")?;
	self.transition(SimState::Terminated);

	Ok(SimReport {
	    reason,
	    ticks: self.ticks,
	    final_time: self.memory.now(),
	    stats: self.memory.stats(),
	    released: self.released.clone(),
	    producers_aborted,
	})
    }

    /// One tick: advance the clock, take at most one request, dispatch it, emit a snapshot.
    pub fn step(&mut self, pool: &mut ProducerPool) -> Result<()> {
	let now = self.memory.tick();
	self.ticks += 1;

	match pool.poll() {
	    Poll::Message(request) => self.dispatch(request),
	    Poll::Empty | Poll::Closed => trace!("[SIM] Idle tick at {} ns", now),
	}

	for event in self.memory.drain_events() {
	    trace!("[SIM] {:?}", event);
	}

	if self.sink.is_enabled() {
	    let snapshot = self.memory.snapshot();
	    self.sink.emit(&snapshot).context("writing memory snapshot")?;
	}
	Ok(())
    }

    /// Routes a request to the memory manager. Contract breaches are reported and skipped.
    pub fn dispatch(&mut self, request: Request) {
	let pid = request.process_id;
	let page = request.page_number;

	match request.action {
	    Action::Read | Action::Write => {
		match self.memory.handle_request(pid, page, request.action) {
		    Ok(outcome) => Self::log_outcome(pid, &outcome),
		    Err(e) => error!("[SIM] Protocol violation from {}: {}", pid, e),
		}
	    },
	    Action::Terminate => match self.memory.release_process(pid) {
		Some(summary) => {
		    info!(
			"[SIM] {} released {} frames, {} processes still active",
			pid,
			summary.frames_released,
			self.memory.active_processes(),
		    );
		    self.released.push(summary);
		},
		None => warn!("[SIM] Terminate from inactive process {} ignored", pid),
	    },
	}
    }

    fn log_outcome(pid: ProcessId, outcome: &AccessOutcome) {
	match outcome {
	    AccessOutcome::Hit { frame, action } => {
		debug!("[SIM] {} {} hit in frame {}", pid, action, frame)
	    },
	    AccessOutcome::Loaded { frame, action } => {
		debug!("[SIM] {} {} fault served by free frame {}", pid, action, frame)
	    },
	    AccessOutcome::Replaced { frame, action, victim } => debug!(
		"[SIM] {} {} fault evicted {} page {} from frame {}{}",
		pid,
		action,
		victim.owner,
		victim.page,
		frame,
		if victim.written_back { " after writeback" } else { "" },
	    ),
	}
    }

    fn exit_reason(&self) -> Option<ExitReason> {
	if self.interrupt.load(Ordering::SeqCst) {
	    Some(ExitReason::Interrupted)
	} else if self.memory.now() >= self.config.time_limit {
	    Some(ExitReason::TimeLimit)
	} else if self.memory.active_processes() == 0 {
	    Some(ExitReason::AllTerminated)
	} else {
	    None
	}
    }

    fn transition(&mut self, next: SimState) {
	info!("[SIM] {:?} -> {:?}", self.state, next);
	self.state = next;
    }
}

//==================================================================================================
// Tests
//==================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use mem_lib::PageNumber;
    use std::time::Duration;

    const P1: ProcessId = ProcessId(1);
    const P2: ProcessId = ProcessId(2);

    fn config() -> SimConfig {
	SimConfig {
	    max_processes: 2,
	    frame_count: 2,
	    page_count: 4,
	    time_increment: 100,
	    time_limit: 1_000,
	    tick_interval: Duration::from_millis(1),
	    ..SimConfig::default()
	}
    }

    /// Simulation with P1 and P2 registered but no producer tasks.
    fn scripted(config: SimConfig) -> (Simulation, task_lib::RequestSender, ProducerPool) {
	let mut sim = Simulation::new(config, SnapshotSink::Discard).unwrap();
	sim.memory_mut().register_process(P1).unwrap();
	sim.memory_mut().register_process(P2).unwrap();
	let (sender, pool) = ProducerPool::new(16);
	(sim, sender, pool)
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
	let config = SimConfig { frame_count: 0, ..config() };
	assert!(matches!(
	    Simulation::new(config, SnapshotSink::Discard),
	    Err(ConfigError::ZeroFrames)
	));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit_bounds_the_run() {
	let (mut sim, _sender, pool) = scripted(config());
	let report = sim.run(pool).await.unwrap();

	assert_eq!(report.reason, ExitReason::TimeLimit);
	assert_eq!(report.ticks, 10);
	assert_eq!(report.final_time, 1_000);
	assert_eq!(sim.state(), SimState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_message_per_tick() {
	let (mut sim, sender, pool) = scripted(SimConfig { time_limit: 300, ..config() });
	for page in 0..4 {
	    sender.send(Request::access(P1, PageNumber(page), Action::Read)).await.unwrap();
	}

	let report = sim.run(pool).await.unwrap();
	assert_eq!(report.ticks, 3);
	assert_eq!(report.stats.faults, 3);
	assert_eq!(report.stats.evictions, 1);
	assert_eq!(sim.memory().resident_frame(P1, PageNumber(0)), None);
	assert_eq!(sim.memory().resident_frame(P1, PageNumber(2)), Some(mem_lib::FrameIndex(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_terminated_ends_the_run() {
	let (mut sim, sender, pool) = scripted(config());
	sender.send(Request::access(P1, PageNumber(0), Action::Write)).await.unwrap();
	sender.send(Request::terminate(P1, PageNumber(0))).await.unwrap();
	sender.send(Request::terminate(P1, PageNumber(0))).await.unwrap();
	sender.send(Request::terminate(P2, PageNumber(0))).await.unwrap();

	let report = sim.run(pool).await.unwrap();
	assert_eq!(report.reason, ExitReason::AllTerminated);
	assert_eq!(report.ticks, 4);
	assert_eq!(report.released.len(), 2);
	assert_eq!(report.released[0].frames_released, 1);
	assert_eq!(report.released[0].dirty_discarded, 1);
	assert_eq!(sim.memory().active_processes(), 0);
	assert_eq!(sim.memory().frames().occupied_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_violations_are_skipped() {
	let (mut sim, sender, pool) = scripted(SimConfig { time_limit: 300, ..config() });
	sender.send(Request::access(ProcessId(77), PageNumber(0), Action::Read)).await.unwrap();
	sender.send(Request::access(P1, PageNumber(9), Action::Read)).await.unwrap();
	sender.send(Request::access(P1, PageNumber(1), Action::Read)).await.unwrap();

	let report = sim.run(pool).await.unwrap();
	assert_eq!(report.stats.rejected, 2);
	assert_eq!(report.stats.faults, 1);
	assert!(sim.memory().check_invariants().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_drains_and_aborts_producers() {
	let (mut sim, _sender, mut pool) = scripted(config());
	pool.track(P1, tokio::spawn(std::future::pending::<()>()));
	sim.interrupt_handle().store(true, Ordering::SeqCst);

	let report = sim.run(pool).await.unwrap();
	assert_eq!(report.reason, ExitReason::Interrupted);
	assert_eq!(report.ticks, 0);
	assert_eq!(report.producers_aborted, 1);
	assert_eq!(sim.state(), SimState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_with_user_processes() {
	let config = SimConfig {
	    max_processes: 4,
	    frame_count: 8,
	    page_count: 32,
	    time_increment: 100_000,
	    time_limit: 2_000_000,
	    delay_ms: 1..=3,
	    seed: 5,
	    ..SimConfig::default()
	};
	let max_ticks = config.max_ticks();
	let mut sim = Simulation::new(config, SnapshotSink::Discard).unwrap();
	let pool = sim.spawn_producers().unwrap();
	assert_eq!(sim.memory().active_processes(), 4);

	let report = sim.run(pool).await.unwrap();
	assert!(report.ticks <= max_ticks);
	assert!(report.final_time <= 2_000_000);
	assert!(report.stats.hits + report.stats.faults + report.stats.rejected <= report.ticks);
	assert_eq!(report.stats.rejected, 0);
	assert!(sim.memory().check_invariants().is_ok());
	if report.reason == ExitReason::AllTerminated {
	    assert_eq!(report.released.len(), 4);
	}
    }
}
