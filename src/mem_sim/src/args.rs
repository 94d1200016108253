//==================================================================================================
// Structures
//==================================================================================================
use anyhow::{
    anyhow,
    Context,
    Result,
};
use sim_lib::{
    Preset,
    SimConfig,
    SinkTarget,
};
use std::{
    str::FromStr,
    time::Duration,
};

pub struct Args {
    /// Base deployment the other options override
    preset: Preset,
    /// Number of user processes (and process slots)
    max_processes: Option<usize>,
    /// Number of physical frames
    frames: Option<usize>,
    /// Pages per process
    pages: Option<usize>,
    /// Logical time added per tick
    time_increment: Option<u64>,
    /// Logical time at which the simulation stops
    time_limit: Option<u64>,
    /// Real milliseconds between two ticks
    tick_ms: Option<u64>,
    /// Runtime budget of every user process
    runtime: Option<u64>,
    /// Chance (percent) a user process terminates after a request
    terminate_pct: Option<u8>,
    /// Upper bound of the real delay between two requests
    max_delay_ms: Option<u64>,
    seed: u64,
    /// Where per-tick snapshots are written
    snapshot: SinkTarget,
}

//==================================================================================================
// Implementation
//==================================================================================================
impl Args {
    const OPT_HELP: &'static str = "--help";
    const OPT_PRESET: &'static str = "--preset";
    const OPT_MAX_PROCESSES: &'static str = "--max_processes";
    const OPT_FRAMES: &'static str = "--frames";
    const OPT_PAGES: &'static str = "--pages";
    const OPT_TIME_INCREMENT: &'static str = "--time_increment";
    const OPT_TIME_LIMIT: &'static str = "--time_limit";
    const OPT_TICK_MS: &'static str = "--tick_ms";
    const OPT_RUNTIME: &'static str = "--runtime";
    const OPT_TERMINATE_PCT: &'static str = "--terminate_pct";
    const OPT_MAX_DELAY_MS: &'static str = "--max_delay_ms";
    const OPT_SEED: &'static str = "--seed";
    const OPT_SNAPSHOT: &'static str = "--snapshot";

    pub fn parse(args: Vec<String>) -> Result<Self> {
	let mut parsed = Self {
	    preset: Preset::Large,
	    max_processes: None,
	    frames: None,
	    pages: None,
	    time_increment: None,
	    time_limit: None,
	    tick_ms: None,
	    runtime: None,
	    terminate_pct: None,
	    max_delay_ms: None,
	    seed: 1,
	    snapshot: SinkTarget::Log,
	};
	let program_name = args.first().map(String::as_str).unwrap_or("mem_sim");

	let mut i: usize = 1;
	while i < args.len() {
	    let option = args[i].as_str();
	    if option == Self::OPT_HELP {
		Self::usage(program_name);
		return Err(anyhow!("wrong usage"));
	    }

	    i += 1;
	    let value = args
		.get(i)
		.ok_or_else(|| anyhow!("missing value for {}", option))?
		.as_str();

	    match option {
		Self::OPT_PRESET => parsed.preset = Self::value(option, value)?,
		Self::OPT_MAX_PROCESSES => parsed.max_processes = Some(Self::value(option, value)?),
		Self::OPT_FRAMES => parsed.frames = Some(Self::value(option, value)?),
		Self::OPT_PAGES => parsed.pages = Some(Self::value(option, value)?),
		Self::OPT_TIME_INCREMENT => parsed.time_increment = Some(Self::value(option, value)?),
		Self::OPT_TIME_LIMIT => parsed.time_limit = Some(Self::value(option, value)?),
		Self::OPT_TICK_MS => parsed.tick_ms = Some(Self::value(option, value)?),
		Self::OPT_RUNTIME => parsed.runtime = Some(Self::value(option, value)?),
		Self::OPT_TERMINATE_PCT => parsed.terminate_pct = Some(Self::value(option, value)?),
		Self::OPT_MAX_DELAY_MS => parsed.max_delay_ms = Some(Self::value(option, value)?),
		Self::OPT_SEED => parsed.seed = Self::value(option, value)?,
		Self::OPT_SNAPSHOT => parsed.snapshot = Self::value(option, value)?,
		_ => {
		    return Err(anyhow!("invalid argument {}", option));
		}
	    }

	    i += 1;
	}

	Ok(parsed)
    }

    fn value<T>(option: &str, value: &str) -> Result<T>
    where
	T: FromStr,
	T::Err: std::fmt::Display,
    {
	value
	    .parse::<T>()
	    .map_err(|e| anyhow!("{}", e))
	    .with_context(|| format!("invalid value '{}' for {}", value, option))
    }

    pub fn usage(program_name: &str) {
	println!(
	    "Usage: {} [{} <large|small>] [{} <n>] [{} <n>] [{} <n>] [{} <n>] [{} <n>] [{} <ms>] [{} <n>] [{} <0-100>] [{} <ms>] [{} <seed>] [{} <log|stdout|none|path>]",
	    program_name,
	    Self::OPT_PRESET,
	    Self::OPT_MAX_PROCESSES,
	    Self::OPT_FRAMES,
	    Self::OPT_PAGES,
	    Self::OPT_TIME_INCREMENT,
	    Self::OPT_TIME_LIMIT,
	    Self::OPT_TICK_MS,
	    Self::OPT_RUNTIME,
	    Self::OPT_TERMINATE_PCT,
	    Self::OPT_MAX_DELAY_MS,
	    Self::OPT_SEED,
	    Self::OPT_SNAPSHOT,
	);
    }

    /// Preset defaults with every explicit option applied on top. Not validated yet.
    pub fn config(&self) -> SimConfig {
	let mut config = SimConfig::from_preset(self.preset);

	if let Some(max_processes) = self.max_processes {
	    config.max_processes = max_processes;
	}
	if let Some(frames) = self.frames {
	    config.frame_count = frames;
	}
	if let Some(pages) = self.pages {
	    config.page_count = pages;
	}
	if let Some(time_increment) = self.time_increment {
	    config.time_increment = time_increment;
	}
	if let Some(time_limit) = self.time_limit {
	    config.time_limit = time_limit;
	}
	if let Some(tick_ms) = self.tick_ms {
	    config.tick_interval = Duration::from_millis(tick_ms);
	}
	if let Some(runtime) = self.runtime {
	    config.max_runtime = runtime;
	}
	if let Some(terminate_pct) = self.terminate_pct {
	    config.terminate_percent = terminate_pct;
	}
	if let Some(max_delay_ms) = self.max_delay_ms {
	    config.delay_ms = 1..=max_delay_ms;
	}
	config.seed = self.seed;

	config
    }

    pub fn snapshot(&self) -> &SinkTarget {
	&self.snapshot
    }
}
