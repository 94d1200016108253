//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    FrameIndex,
    LogicalTime,
    PageNumber,
    ProcessId,
    ProcessSlot,
};
use std::fmt;

//==================================================================================================
// Structures
//==================================================================================================
/// Copy of one frame at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameView {
    pub index		: FrameIndex,
    pub resident	: Option<(ProcessId, PageNumber)>,
    pub dirty		: bool,
    pub last_used	: LogicalTime,
}

/// Copy of one process slot's page table at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTableView {
    pub slot	: ProcessSlot,
    pub pid	: Option<ProcessId>,
    pub frames	: Vec<Option<FrameIndex>>,
}

/// Full memory layout at one logical time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub time		: LogicalTime,
    pub frames		: Vec<FrameView>,
    pub page_tables	: Vec<PageTableView>,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl MemorySnapshot {
    pub fn occupied_frames(&self) -> usize {
	self.frames.iter().filter(|f| f.resident.is_some()).count()
    }
}

impl fmt::Display for FrameView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self.resident {
	    Some((pid, page)) => write!(
		f,
		"Frame {}: {}, Page {}, Dirty: {}, LastUsed: {}",
		self.index,
		pid,
		page,
		u8::from(self.dirty),
		self.last_used,
	    ),
	    None => write!(f, "Frame {}: Empty", self.index),
	}
    }
}

impl fmt::Display for PageTableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self.pid {
	    Some(pid) => write!(f, "Slot {} ({}):", self.slot, pid)?,
	    None => write!(f, "Slot {} (free):", self.slot)?,
	}
	// -1 marks a page that is not resident
	for frame in &self.frames {
	    match frame {
		Some(index) => write!(f, " {}", index)?,
		None => f.write_str(" -1")?,
	    }
	}
	Ok(())
    }
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	writeln!(f, "Current memory layout at time {} ns:", self.time)?;
	writeln!(f, "Frame Table:")?;
	for frame in &self.frames {
	    writeln!(f, "{}", frame)?;
	}
	writeln!(f)?;
	writeln!(f, "Page Tables:")?;
	for table in &self.page_tables {
	    writeln!(f, "{}", table)?;
	}
	Ok(())
    }
}
