//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    ConfigError,
    LogicalTime,
};
use task_lib::Workload;
use std::{
    ops::RangeInclusive,
    str::FromStr,
    time::Duration,
};

//==================================================================================================
// Structures
//==================================================================================================
/// Known deployments. Both share the control logic and differ only in frame count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// 256 frames, 32 pages per process.
    Large,
    /// 8 frames, 32 pages per process.
    Small,
}

/// Runtime configuration of a simulation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// User processes spawned, and process slots in the memory manager
    pub max_processes		: usize,
    pub frame_count		: usize,
    /// Pages per process
    pub page_count		: usize,
    /// Logical time added by every tick
    pub time_increment		: LogicalTime,
    /// Logical time at which the run stops
    pub time_limit		: LogicalTime,
    /// Real time the loop yields between two ticks
    pub tick_interval		: Duration,
    /// Base seed. User process `i` is seeded with `seed + i`
    pub seed			: u64,
    /// Raw id of the first user process; the others follow consecutively
    pub first_pid		: u32,
    pub channel_capacity	: usize,
    pub max_runtime		: u64,
    pub terminate_percent	: u8,
    pub delay_ms		: RangeInclusive<u64>,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl Preset {
    pub fn frame_count(&self) -> usize {
	match self {
	    Preset::Large => 256,
	    Preset::Small => 8,
	}
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
	match s {
	    "large" => Ok(Preset::Large),
	    "small" => Ok(Preset::Small),
	    other => Err(format!("unknown preset '{}' (expected 'large' or 'small')", other)),
	}
    }
}

impl SimConfig {
    pub fn from_preset(preset: Preset) -> Self {
	Self {
	    frame_count: preset.frame_count(),
	    ..Self::default()
	}
    }

    /// Request pattern handed to every user process.
    pub fn workload(&self) -> Workload {
	Workload {
	    page_count: self.page_count,
	    max_runtime: self.max_runtime,
	    terminate_percent: self.terminate_percent,
	    delay_ms: self.delay_ms.clone(),
	}
    }

    /// Upper bound on the number of ticks a run can take.
    pub fn max_ticks(&self) -> u64 {
	self.time_limit.div_ceil(self.time_increment.max(1))
    }

    /// Checks every value before anything is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
	if self.frame_count == 0 {
	    return Err(ConfigError::ZeroFrames);
	}
	if self.page_count == 0 {
	    return Err(ConfigError::ZeroPages);
	}
	if self.max_processes == 0 {
	    return Err(ConfigError::ZeroProcesses);
	}
	if self.time_increment == 0 {
	    return Err(ConfigError::ZeroTimeIncrement);
	}
	if self.time_limit == 0 {
	    return Err(ConfigError::ZeroTimeLimit);
	}
	let last_pid = u32::try_from(self.max_processes)
	    .ok()
	    .and_then(|count| self.first_pid.checked_add(count));
	if last_pid.is_none() {
	    return Err(ConfigError::InvalidWorkload(format!(
		"{} processes starting at id {} overflow the id space",
		self.max_processes,
		self.first_pid,
	    )));
	}
	self.workload().validate()
    }
}

impl Default for SimConfig {
    fn default() -> Self {
	Self {
	    max_processes: 18,
	    frame_count: 256,
	    page_count: 32,
	    time_increment: 100_000,
	    time_limit: 20_000_000,
	    tick_interval: Duration::from_millis(1),
	    seed: 1,
	    first_pid: 1000,
	    channel_capacity: 64,
	    max_runtime: 5000,
	    terminate_percent: 10,
	    delay_ms: 1..=100,
	}
    }
}
