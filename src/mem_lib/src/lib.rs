//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Imports
//==================================================================================================
use std::fmt;
use thiserror::Error;

//==================================================================================================
// Aliases
//==================================================================================================
/// Logical clock value. Only used as an LRU recency marker, never as wall-clock time.
pub type LogicalTime = u64;

/// Dense index assigned to a registered process. Page tables are indexed by it.
pub type ProcessSlot = usize;

//==================================================================================================
// Structures
//==================================================================================================
/// Raw process identifier, as carried by a request message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

/// Page number inside a process address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNumber(pub usize);

/// Index of a physical frame in the frame table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIndex(pub usize);

/// Message class. There is a single channel carrying a single class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    MemoryRequest,
}

/// Operation requested by a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Terminate,
}

/// Fixed-shape message sent by a producer to the memory manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request
{
    pub kind		: MessageKind,
    pub process_id	: ProcessId,
    pub page_number	: PageNumber,
    pub action		: Action,
}

//==================================================================================================
// Errors
//==================================================================================================
/// Fatal configuration problems, detected before the simulation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("frame count must be positive")]
    ZeroFrames,
    #[error("page count must be positive")]
    ZeroPages,
    #[error("maximum process count must be positive")]
    ZeroProcesses,
    #[error("time increment must be positive")]
    ZeroTimeIncrement,
    #[error("simulation time limit must be positive")]
    ZeroTimeLimit,
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),
}

/// Breach of the producer/manager contract. Never coerced into a valid index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("process {0} is not registered")]
    UnknownProcess(ProcessId),
    #[error("page {page} of process {pid} is outside 0..{page_count}")]
    PageOutOfRange {
	pid: ProcessId,
	page: PageNumber,
	page_count: usize,
    },
    #[error("unknown action code {0}")]
    UnknownAction(u8),
    #[error("{0} is not a memory access")]
    NotAnAccess(Action),
    #[error("process {0} is already registered")]
    AlreadyRegistered(ProcessId),
    #[error("no free process slot for {pid} (capacity {capacity})")]
    RegistryFull {
	pid: ProcessId,
	capacity: usize,
    },
}

//==================================================================================================
// Implementations
//==================================================================================================
impl Action {
    pub const READ_CODE: u8 = 1;
    pub const WRITE_CODE: u8 = 2;
    pub const TERMINATE_CODE: u8 = 3;

    pub fn is_write(&self) -> bool {
	matches!(self, Action::Write)
    }

    /// Wire code used by the request generators (1 = Read, 2 = Write, 3 = Terminate).
    pub fn code(&self) -> u8 {
	match self {
	    Action::Read => Self::READ_CODE,
	    Action::Write => Self::WRITE_CODE,
	    Action::Terminate => Self::TERMINATE_CODE,
	}
    }
}

impl TryFrom<u8> for Action {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
	match code {
	    Self::READ_CODE => Ok(Action::Read),
	    Self::WRITE_CODE => Ok(Action::Write),
	    Self::TERMINATE_CODE => Ok(Action::Terminate),
	    other => Err(ProtocolError::UnknownAction(other)),
	}
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let name = match self {
	    Action::Read => "read",
	    Action::Write => "write",
	    Action::Terminate => "terminate",
	};
	f.write_str(name)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "P{}", self.0)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.0)
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.0)
    }
}

impl Request {
    /// Creates a read or write request.
    ///
    /// # Arguments
    /// * `process_id`  - Sending process;
    /// * `page_number` - Page being accessed;
    /// * `action`      - `Read` or `Write`;
    pub fn access(process_id: ProcessId, page_number: PageNumber, action: Action) -> Self {
	Self {
	    kind: MessageKind::MemoryRequest,
	    process_id,
	    page_number,
	    action,
	}
    }

    /// Creates a termination request. The page number is carried but ignored.
    pub fn terminate(process_id: ProcessId, page_number: PageNumber) -> Self {
	Self {
	    kind: MessageKind::MemoryRequest,
	    process_id,
	    page_number,
	    action: Action::Terminate,
	}
    }

    /// Decodes a message from its raw wire fields.
    ///
    /// # Returns
    /// * `Ok(Request)`                       - if `action_code` is known
    /// * `Err(ProtocolError::UnknownAction)` - otherwise
    pub fn from_raw(pid: u32, page_number: usize, action_code: u8) -> Result<Self, ProtocolError> {
	let action = Action::try_from(action_code)?;
	Ok(Self {
	    kind: MessageKind::MemoryRequest,
	    process_id: ProcessId(pid),
	    page_number: PageNumber(page_number),
	    action,
	})
    }
}
