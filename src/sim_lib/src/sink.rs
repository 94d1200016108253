//==================================================================================================
// Imports
//==================================================================================================
use anyhow::{
    Context,
    Result,
};
use log::{
    debug,
    log_enabled,
    Level,
};
use mmu_lib::MemorySnapshot;
use std::{
    fs::File,
    io::{
	self,
	BufWriter,
	Write,
    },
    path::PathBuf,
    str::FromStr,
};

//==================================================================================================
// Enum
//==================================================================================================
/// Where per-tick snapshots go, as chosen on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkTarget {
    Log,
    Stdout,
    File(PathBuf),
    Discard,
}

/// Opened snapshot destination.
pub enum SnapshotSink {
    /// `debug!` lines through the logger.
    Log,
    Writer(Box<dyn Write + Send>),
    Discard,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl FromStr for SinkTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
	match s {
	    "log" => Ok(SinkTarget::Log),
	    "stdout" => Ok(SinkTarget::Stdout),
	    "none" => Ok(SinkTarget::Discard),
	    "" => Err("empty snapshot target".to_string()),
	    path => Ok(SinkTarget::File(PathBuf::from(path))),
	}
    }
}

impl SinkTarget {
    pub fn open(&self) -> Result<SnapshotSink> {
	let sink = match self {
	    SinkTarget::Log => SnapshotSink::Log,
	    SinkTarget::Stdout => SnapshotSink::Writer(Box::new(io::stdout())),
	    SinkTarget::File(path) => {
		let file = File::create(path)
		    .with_context(|| format!("creating snapshot file {}", path.display()))?;
		SnapshotSink::Writer(Box::new(BufWriter::new(file)))
	    },
	    SinkTarget::Discard => SnapshotSink::Discard,
	};
	Ok(sink)
    }
}

impl SnapshotSink {
    /// Whether a snapshot would actually be written. Lets the caller skip building one.
    pub fn is_enabled(&self) -> bool {
	match self {
	    SnapshotSink::Log => log_enabled!(Level::Debug),
	    SnapshotSink::Writer(_) => true,
	    SnapshotSink::Discard => false,
	}
    }

    pub fn emit(&mut self, snapshot: &MemorySnapshot) -> io::Result<()> {
	match self {
	    SnapshotSink::Log => {
		debug!("{}", snapshot);
		Ok(())
	    },
	    SnapshotSink::Writer(writer) => writeln!(writer, "{}", snapshot),
	    SnapshotSink::Discard => Ok(()),
	}
    }

    pub fn flush(&mut self) -> io::Result<()> {
	match self {
	    SnapshotSink::Writer(writer) => writer.flush(),
	    _ => Ok(()),
	}
    }
}
