//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Modules
//==================================================================================================
mod registry;
mod snapshot;

pub use registry::ProcessRegistry;
pub use snapshot::{
    FrameView,
    MemorySnapshot,
    PageTableView,
};

//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    Action,
    ConfigError,
    FrameIndex,
    LogicalTime,
    PageNumber,
    ProcessId,
    ProcessSlot,
    ProtocolError,
};
use ram_lib::{
    FrameTable,
    PageTable,
    PageTables,
};
use log::{
    debug,
    info,
};
use std::{
    collections::HashMap,
    fmt,
};
use thiserror::Error;

//==================================================================================================
// Structures
//==================================================================================================
/// Discrete clock advanced once per simulation tick by a fixed increment.
#[derive(Clone, Copy, Debug)]
pub struct LogicalClock {
    now		: LogicalTime,
    increment	: LogicalTime,
}

/// Page that was pushed out of a frame to make room for a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Victim {
    pub owner		: ProcessId,
    pub page		: PageNumber,
    pub last_used	: LogicalTime,
    /// The frame was dirty and a writeback was issued before reuse.
    pub written_back	: bool,
}

/// Result of a successful `handle_request`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Page was already resident.
    Hit { frame: FrameIndex, action: Action },
    /// Page fault served by a free frame.
    Loaded { frame: FrameIndex, action: Action },
    /// Page fault served by evicting the LRU frame.
    Replaced { frame: FrameIndex, action: Action, victim: Victim },
}

/// Result of releasing an active process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub pid		: ProcessId,
    pub frames_released	: usize,
    pub dirty_discarded	: usize,
}

/// Journal of everything the manager did, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryEvent {
    Hit { pid: ProcessId, page: PageNumber, frame: FrameIndex, action: Action },
    Fault { pid: ProcessId, page: PageNumber },
    Writeback { frame: FrameIndex, owner: ProcessId, page: PageNumber },
    Evict { frame: FrameIndex, owner: ProcessId, page: PageNumber },
    Load { frame: FrameIndex, pid: ProcessId, page: PageNumber, action: Action },
    Release { pid: ProcessId, frames: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub hits		: u64,
    pub faults		: u64,
    pub evictions	: u64,
    pub writebacks	: u64,
    pub releases	: u64,
    pub rejected	: u64,
}

/// Breach of one of the frame/page table invariants. Always a bug in the manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("frame {0} is dirty but not occupied")]
    DirtyEmptyFrame(FrameIndex),
    #[error("{pid} page {page} is resident in both frame {first} and frame {second}")]
    DuplicateResidency {
	pid: ProcessId,
	page: PageNumber,
	first: FrameIndex,
	second: FrameIndex,
    },
    #[error("frame {frame} is owned by unregistered process {pid}")]
    OrphanFrame { frame: FrameIndex, pid: ProcessId },
    #[error("frame {frame} holds {pid} page {page} but the page table does not point back")]
    MissingBackReference { frame: FrameIndex, pid: ProcessId, page: PageNumber },
    #[error("slot {slot} page {page} points at frame {frame} which does not hold it")]
    StaleEntry { slot: ProcessSlot, page: PageNumber, frame: FrameIndex },
    #[error("frame {frame} was used at {last_used}, after the current time {now}")]
    FutureTimestamp { frame: FrameIndex, last_used: LogicalTime, now: LogicalTime },
}

/// Owns the frame table, the page tables, the process registry and the logical clock.
///
/// It is the only mutator of those structures; producers reach it exclusively through
/// request messages.
#[derive(Clone, Debug)]
pub struct MemoryManager {
    frames	: FrameTable,
    page_tables	: PageTables,
    registry	: ProcessRegistry,
    clock	: LogicalClock,
    events	: Vec<MemoryEvent>,
    stats	: MemoryStats,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl LogicalClock {
    pub fn new(increment: LogicalTime) -> Result<Self, ConfigError> {
	if increment == 0 {
	    return Err(ConfigError::ZeroTimeIncrement);
	}
	Ok(Self { now: 0, increment })
    }

    pub fn now(&self) -> LogicalTime {
	self.now
    }

    pub fn increment(&self) -> LogicalTime {
	self.increment
    }

    pub fn advance(&mut self) -> LogicalTime {
	self.now = self.now.saturating_add(self.increment);
	self.now
    }
}

impl AccessOutcome {
    pub fn frame(&self) -> FrameIndex {
	match self {
	    AccessOutcome::Hit { frame, .. }
	    | AccessOutcome::Loaded { frame, .. }
	    | AccessOutcome::Replaced { frame, .. } => *frame,
	}
    }

    pub fn is_hit(&self) -> bool {
	matches!(self, AccessOutcome::Hit { .. })
    }

    pub fn victim(&self) -> Option<Victim> {
	match self {
	    AccessOutcome::Replaced { victim, .. } => Some(*victim),
	    _ => None,
	}
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(
	    f,
	    "hits={}, faults={}, evictions={}, writebacks={}, releases={}, rejected={}",
	    self.hits,
	    self.faults,
	    self.evictions,
	    self.writebacks,
	    self.releases,
	    self.rejected,
	)
    }
}

impl MemoryManager {
    /// Creates a memory manager with empty tables at logical time zero.
    ///
    /// # Arguments
    /// * `frame_count`    - Number of physical frames;
    /// * `page_count`     - Pages per process;
    /// * `max_processes`  - Number of process slots (and page tables);
    /// * `time_increment` - Logical time added by every `tick`;
    ///
    /// # Returns
    /// * `Ok(MemoryManager)` - if every value is positive
    /// * `Err(ConfigError)`  - otherwise
    pub fn new(
	frame_count: usize,
	page_count: usize,
	max_processes: usize,
	time_increment: LogicalTime,
    ) -> Result<Self, ConfigError> {
	debug!(
	    "[MMU] Creating memory manager: {} frames, {} pages, {} processes",
	    frame_count,
	    page_count,
	    max_processes,
	);

	Ok(Self {
	    frames: FrameTable::new(frame_count)?,
	    page_tables: PageTables::new(max_processes, page_count)?,
	    registry: ProcessRegistry::new(max_processes),
	    clock: LogicalClock::new(time_increment)?,
	    events: Vec::new(),
	    stats: MemoryStats::default(),
	})
    }

    /// Advances the logical clock by one increment and returns the new time.
    pub fn tick(&mut self) -> LogicalTime {
	self.clock.advance()
    }

    pub fn now(&self) -> LogicalTime {
	self.clock.now()
    }

    /// Registers a process so it may issue requests.
    pub fn register_process(&mut self, pid: ProcessId) -> Result<ProcessSlot, ProtocolError> {
	let slot = self.registry.register(pid)?;
	debug!("[MMU] Registered {} in slot {}", pid, slot);
	Ok(slot)
    }

    /// Serves a read or write of `page` by `pid`.
    ///
    /// A resident page is a hit and only refreshes recency (and the dirty bit on a write).
    /// Otherwise the page is loaded into the first free frame or, when memory is full,
    /// into the least recently used frame after writing it back if dirty.
    ///
    /// # Returns
    /// * `Ok(AccessOutcome)`  - which frame now holds the page and how it got there
    /// * `Err(ProtocolError)` - if `pid` is unknown, `page` is out of range or `action` is
    ///                          not a read or write. No state is changed in that case.
    pub fn handle_request(
	&mut self,
	pid: ProcessId,
	page: PageNumber,
	action: Action,
    ) -> Result<AccessOutcome, ProtocolError> {
	let slot = match self.validate(pid, page, action) {
	    Ok(slot) => slot,
	    Err(e) => {
		self.stats.rejected += 1;
		debug!("[MMU] Rejected request: {}", e);
		return Err(e);
	    },
	};
	let now = self.clock.now();

	let outcome = match self.page_tables.lookup(slot, page) {
	    Some(frame) => self.serve_hit(pid, page, frame, action, now),
	    None => self.serve_fault(pid, slot, page, action, now),
	};

	debug_assert_eq!(self.check_invariants(), Ok(()));
	Ok(outcome)
    }

    /// Frees every frame owned by `pid` and unregisters it.
    ///
    /// # Returns
    /// * `Some(ReleaseSummary)` - if `pid` was active
    /// * `None`                 - if `pid` is unknown or already released (nothing changes)
    pub fn release_process(&mut self, pid: ProcessId) -> Option<ReleaseSummary> {
	let Some(slot) = self.registry.unregister(pid) else {
	    debug!("[MMU] Release of inactive process {} ignored", pid);
	    return None;
	};

	let mut summary = ReleaseSummary {
	    pid,
	    frames_released: 0,
	    dirty_discarded: 0,
	};
	for frame in self.frames.owned_by(pid) {
	    if let Some(record) = self.frames.get_mut(frame) {
		summary.frames_released += 1;
		summary.dirty_discarded += usize::from(record.dirty());
		record.clear();
	    }
	}
	if let Some(table) = self.page_tables.table_mut(slot) {
	    table.reset();
	}

	self.stats.releases += 1;
	self.events.push(MemoryEvent::Release { pid, frames: summary.frames_released });
	info!(
	    "[MMU] Process {} terminating and releasing all frames ({} released, {} dirty discarded)",
	    pid,
	    summary.frames_released,
	    summary.dirty_discarded,
	);

	debug_assert_eq!(self.check_invariants(), Ok(()));
	Some(summary)
    }

    pub fn active_processes(&self) -> usize {
	self.registry.active()
    }

    pub fn is_registered(&self, pid: ProcessId) -> bool {
	self.registry.slot_of(pid).is_some()
    }

    pub fn frames(&self) -> &FrameTable {
	&self.frames
    }

    pub fn page_table(&self, pid: ProcessId) -> Option<&PageTable> {
	self.registry
	    .slot_of(pid)
	    .and_then(|slot| self.page_tables.table(slot))
    }

    pub fn resident_frame(&self, pid: ProcessId, page: PageNumber) -> Option<FrameIndex> {
	self.registry
	    .slot_of(pid)
	    .and_then(|slot| self.page_tables.lookup(slot, page))
    }

    pub fn page_count(&self) -> usize {
	self.page_tables.page_count()
    }

    pub fn stats(&self) -> MemoryStats {
	self.stats
    }

    /// Takes the event journal accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<MemoryEvent> {
	std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
	let frames = self.frames
	    .iter()
	    .map(|(index, record)| FrameView {
		index,
		resident: record.resident(),
		dirty: record.dirty(),
		last_used: record.last_used(),
	    })
	    .collect();

	let page_tables = self.page_tables
	    .iter()
	    .map(|(slot, table)| PageTableView {
		slot,
		pid: self.registry.pid_at(slot),
		frames: table.entries().iter().map(|entry| entry.frame).collect(),
	    })
	    .collect();

	MemorySnapshot {
	    time: self.clock.now(),
	    frames,
	    page_tables,
	}
    }

    /// Checks every frame/page table invariant.
    ///
    /// # Returns
    /// * `Ok(())`                    - if the tables are consistent
    /// * `Err(InvariantViolation)`   - the first breach found
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
	let now = self.clock.now();
	let mut seen: HashMap<(ProcessId, PageNumber), FrameIndex> = HashMap::new();

	for (index, record) in self.frames.iter() {
	    let Some((pid, page)) = record.resident() else {
		if record.dirty() {
		    return Err(InvariantViolation::DirtyEmptyFrame(index));
		}
		continue;
	    };

	    if let Some(&first) = seen.get(&(pid, page)) {
		return Err(InvariantViolation::DuplicateResidency {
		    pid,
		    page,
		    first,
		    second: index,
		});
	    }
	    seen.insert((pid, page), index);

	    let slot = self.registry
		.slot_of(pid)
		.ok_or(InvariantViolation::OrphanFrame { frame: index, pid })?;
	    if self.page_tables.lookup(slot, page) != Some(index) {
		return Err(InvariantViolation::MissingBackReference { frame: index, pid, page });
	    }

	    if record.last_used() > now {
		return Err(InvariantViolation::FutureTimestamp {
		    frame: index,
		    last_used: record.last_used(),
		    now,
		});
	    }
	}

	for (slot, table) in self.page_tables.iter() {
	    let pid = self.registry.pid_at(slot);
	    for (page, entry) in table.entries().iter().enumerate() {
		let Some(frame) = entry.frame else {
		    continue;
		};
		let page = PageNumber(page);
		let holder = self.frames.get(frame).and_then(|record| record.resident());
		if pid.is_none() || holder != pid.map(|pid| (pid, page)) {
		    return Err(InvariantViolation::StaleEntry { slot, page, frame });
		}
	    }
	}

	Ok(())
    }

    fn validate(
	&self,
	pid: ProcessId,
	page: PageNumber,
	action: Action,
    ) -> Result<ProcessSlot, ProtocolError> {
	if action == Action::Terminate {
	    return Err(ProtocolError::NotAnAccess(action));
	}
	let slot = self.registry
	    .slot_of(pid)
	    .ok_or(ProtocolError::UnknownProcess(pid))?;

	let page_count = self.page_tables.page_count();
	if page.0 >= page_count {
	    return Err(ProtocolError::PageOutOfRange { pid, page, page_count });
	}

	Ok(slot)
    }

    fn serve_hit(
	&mut self,
	pid: ProcessId,
	page: PageNumber,
	frame: FrameIndex,
	action: Action,
	now: LogicalTime,
    ) -> AccessOutcome {
	if let Some(record) = self.frames.get_mut(frame) {
	    record.touch(now, action.is_write());
	}
	self.stats.hits += 1;
	self.events.push(MemoryEvent::Hit { pid, page, frame, action });
	debug!(
	    "[MMU] Address {} already in frame {}, granting {} access to {}",
	    page,
	    frame,
	    action,
	    pid,
	);

	AccessOutcome::Hit { frame, action }
    }

    fn serve_fault(
	&mut self,
	pid: ProcessId,
	slot: ProcessSlot,
	page: PageNumber,
	action: Action,
	now: LogicalTime,
    ) -> AccessOutcome {
	self.stats.faults += 1;
	self.events.push(MemoryEvent::Fault { pid, page });

	let (frame, victim) = match self.frames.find_free() {
	    Some(frame) => (frame, None),
	    None => match self.frames.lru_victim() {
		Some(frame) => (frame, self.evict(frame)),
		None => unreachable!("[MMU] Frame table has neither a free nor an occupied frame."),
	    },
	};

	if let Some(record) = self.frames.get_mut(frame) {
	    record.load(pid, page, action.is_write(), now);
	}
	if let Some(table) = self.page_tables.table_mut(slot) {
	    table.set(page, Some(frame));
	}
	self.events.push(MemoryEvent::Load { frame, pid, page, action });
	debug!(
	    "[MMU] Address {} loaded into frame {} for {} ({})",
	    page,
	    frame,
	    pid,
	    action,
	);

	match victim {
	    Some(victim) => AccessOutcome::Replaced { frame, action, victim },
	    None => AccessOutcome::Loaded { frame, action },
	}
    }

    /// Empties `frame`, writing it back first if dirty, and clears its old page table entry.
    fn evict(&mut self, frame: FrameIndex) -> Option<Victim> {
	let record = self.frames.get_mut(frame)?;
	let (owner, page) = record.resident()?;
	let victim = Victim {
	    owner,
	    page,
	    last_used: record.last_used(),
	    written_back: record.dirty(),
	};
	debug!("[MMU] Replacing frame {} ({}, page {})", frame, owner, page);

	// Writeback must be recorded before the frame is reused.
	if victim.written_back {
	    self.stats.writebacks += 1;
	    self.events.push(MemoryEvent::Writeback { frame, owner, page });
	    info!("[MMU] Dirty bit set for frame {}, writing back to memory", frame);
	}
	record.clear();

	if let Some(old_slot) = self.registry.slot_of(owner) {
	    if let Some(table) = self.page_tables.table_mut(old_slot) {
		table.set(page, None);
	    }
	}
	self.stats.evictions += 1;
	self.events.push(MemoryEvent::Evict { frame, owner, page });

	Some(victim)
    }
}
