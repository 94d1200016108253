//==================================================================================================
// Configuration
//==================================================================================================
#![deny(clippy::all)]

//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    ConfigError,
    FrameIndex,
    LogicalTime,
    PageNumber,
    ProcessId,
    ProcessSlot,
};
use log::debug;

//==================================================================================================
// Structures
//==================================================================================================
/// Represents one physical frame.
///
/// The `(owner, page)` pair is kept as a single optional value, so a frame is occupied
/// exactly when it has an owner and a page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameRecord {
    resident	: Option<(ProcessId, PageNumber)>,
    dirty	: bool,
    last_used	: LogicalTime,
}

/// Fixed-size table of physical frames. Authoritative map of frame -> (process, page).
#[derive(Clone, Debug)]
pub struct FrameTable {
    frames: Vec<FrameRecord>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    pub frame: Option<FrameIndex>,
}

/// Page table of a single process: page number -> frame or "not resident".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

/// Page tables for every process slot, pre-allocated for `max_processes x page_count`.
#[derive(Clone, Debug)]
pub struct PageTables {
    tables: Vec<PageTable>,
    page_count: usize,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl FrameRecord {
    pub fn occupied(&self) -> bool {
	self.resident.is_some()
    }

    pub fn owner(&self) -> Option<ProcessId> {
	self.resident.map(|(pid, _)| pid)
    }

    pub fn page(&self) -> Option<PageNumber> {
	self.resident.map(|(_, page)| page)
    }

    pub fn resident(&self) -> Option<(ProcessId, PageNumber)> {
	self.resident
    }

    pub fn dirty(&self) -> bool {
	self.dirty
    }

    pub fn last_used(&self) -> LogicalTime {
	self.last_used
    }

    /// Installs a page in this frame, replacing whatever was there.
    pub fn load(&mut self, owner: ProcessId, page: PageNumber, dirty: bool, now: LogicalTime) {
	self.resident = Some((owner, page));
	self.dirty = dirty;
	self.last_used = now;
    }

    /// Refreshes recency on a hit. A write marks the frame dirty, a read never clears it.
    pub fn touch(&mut self, now: LogicalTime, write: bool) {
	self.last_used = now;
	self.dirty |= write;
    }

    /// Empties the frame. `last_used` is kept, it is only meaningful while occupied.
    pub fn clear(&mut self) {
	self.resident = None;
	self.dirty = false;
    }
}

impl FrameTable {
    /// Creates a frame table with `frame_count` empty frames.
    ///
    /// # Returns
    /// * `Ok(FrameTable)`             - if `frame_count` is positive
    /// * `Err(ConfigError::ZeroFrames)` - otherwise
    pub fn new(frame_count: usize) -> Result<Self, ConfigError> {
	if frame_count == 0 {
	    return Err(ConfigError::ZeroFrames);
	}
	debug!("[RAM] Creating frame table with {} frames", frame_count);

	Ok(Self {
	    frames: vec![FrameRecord::default(); frame_count],
	})
    }

    pub fn len(&self) -> usize {
	self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
	self.frames.is_empty()
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&FrameRecord> {
	self.frames.get(frame.0)
    }

    pub fn get_mut(&mut self, frame: FrameIndex) -> Option<&mut FrameRecord> {
	self.frames.get_mut(frame.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &FrameRecord)> {
	self.frames
	    .iter()
	    .enumerate()
	    .map(|(i, record)| (FrameIndex(i), record))
    }

    pub fn occupied_count(&self) -> usize {
	self.frames.iter().filter(|f| f.occupied()).count()
    }

    /// First unoccupied frame in table order.
    pub fn find_free(&self) -> Option<FrameIndex> {
	self.frames
	    .iter()
	    .position(|f| !f.occupied())
	    .map(FrameIndex)
    }

    /// Strict LRU victim: the occupied frame with the smallest `last_used`.
    ///
    /// A later frame only replaces the current candidate on a strictly smaller timestamp,
    /// so ties go to the lowest frame index.
    ///
    /// # Returns
    /// * `Some(FrameIndex)` - the victim
    /// * `None`             - if no frame is occupied
    pub fn lru_victim(&self) -> Option<FrameIndex> {
	let mut victim: Option<(usize, LogicalTime)> = None;

	for (i, frame) in self.frames.iter().enumerate() {
	    if !frame.occupied() {
		continue;
	    }
	    match victim {
		Some((_, oldest)) if frame.last_used >= oldest => {},
		_ => victim = Some((i, frame.last_used)),
	    }
	}

	victim.map(|(i, _)| FrameIndex(i))
    }

    /// Frames currently owned by `pid`, in table order.
    pub fn owned_by(&self, pid: ProcessId) -> Vec<FrameIndex> {
	self.frames
	    .iter()
	    .enumerate()
	    .filter(|(_, f)| f.owner() == Some(pid))
	    .map(|(i, _)| FrameIndex(i))
	    .collect()
    }
}

impl PageTableEntry {
    pub fn is_resident(&self) -> bool {
	self.frame.is_some()
    }
}

impl PageTable {
    pub fn new(page_count: usize) -> Self {
	Self {
	    entries: vec![PageTableEntry::default(); page_count],
	}
    }

    pub fn len(&self) -> usize {
	self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
	self.entries.is_empty()
    }

    pub fn get(&self, page: PageNumber) -> Option<PageTableEntry> {
	self.entries.get(page.0).copied()
    }

    pub fn entries(&self) -> &[PageTableEntry] {
	&self.entries
    }

    /// Points `page` at `frame` (or at nothing). Returns `false` if `page` is out of range.
    pub fn set(&mut self, page: PageNumber, frame: Option<FrameIndex>) -> bool {
	match self.entries.get_mut(page.0) {
	    Some(entry) => {
		entry.frame = frame;
		true
	    },
	    None => false,
	}
    }

    /// Marks every page as not resident.
    pub fn reset(&mut self) {
	self.entries
	    .iter_mut()
	    .for_each(|entry| entry.frame = None);
    }

    pub fn resident_count(&self) -> usize {
	self.entries.iter().filter(|e| e.is_resident()).count()
    }
}

impl PageTables {
    /// Pre-allocates `max_processes` page tables of `page_count` entries each.
    pub fn new(max_processes: usize, page_count: usize) -> Result<Self, ConfigError> {
	if page_count == 0 {
	    return Err(ConfigError::ZeroPages);
	}
	if max_processes == 0 {
	    return Err(ConfigError::ZeroProcesses);
	}
	debug!(
	    "[RAM] Creating {} page tables of {} pages",
	    max_processes,
	    page_count,
	);

	Ok(Self {
	    tables: vec![PageTable::new(page_count); max_processes],
	    page_count,
	})
    }

    pub fn page_count(&self) -> usize {
	self.page_count
    }

    pub fn slots(&self) -> usize {
	self.tables.len()
    }

    pub fn table(&self, slot: ProcessSlot) -> Option<&PageTable> {
	self.tables.get(slot)
    }

    pub fn table_mut(&mut self, slot: ProcessSlot) -> Option<&mut PageTable> {
	self.tables.get_mut(slot)
    }

    pub fn lookup(&self, slot: ProcessSlot, page: PageNumber) -> Option<FrameIndex> {
	self.tables
	    .get(slot)
	    .and_then(|table| table.get(page))
	    .and_then(|entry| entry.frame)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcessSlot, &PageTable)> {
	self.tables.iter().enumerate()
    }
}

//==================================================================================================
// Tests
//==================================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const P1: ProcessId = ProcessId(1);
    const P2: ProcessId = ProcessId(2);

    #[test]
    fn test_zero_frames_rejected() {
	assert_eq!(FrameTable::new(0).unwrap_err(), ConfigError::ZeroFrames);
	assert_eq!(PageTables::new(4, 0).unwrap_err(), ConfigError::ZeroPages);
	assert_eq!(PageTables::new(0, 4).unwrap_err(), ConfigError::ZeroProcesses);
    }

    #[test]
    fn test_frame_record_lifecycle() {
	let mut frame = FrameRecord::default();
	assert!(!frame.occupied());
	assert_eq!(frame.owner(), None);

	frame.load(P1, PageNumber(3), false, 100);
	assert!(frame.occupied());
	assert_eq!(frame.resident(), Some((P1, PageNumber(3))));
	assert!(!frame.dirty());

	frame.touch(200, false);
	assert_eq!(frame.last_used(), 200);
	assert!(!frame.dirty());

	frame.touch(300, true);
	frame.touch(400, false);
	assert!(frame.dirty());
	assert_eq!(frame.last_used(), 400);

	frame.clear();
	assert!(!frame.occupied());
	assert!(!frame.dirty());
	assert_eq!(frame.page(), None);
    }

    #[test]
    fn test_find_free_is_first_in_table_order() {
	let mut table = FrameTable::new(3).unwrap();
	assert_eq!(table.find_free(), Some(FrameIndex(0)));

	table.get_mut(FrameIndex(0)).unwrap().load(P1, PageNumber(0), false, 1);
	assert_eq!(table.find_free(), Some(FrameIndex(1)));

	table.get_mut(FrameIndex(1)).unwrap().load(P1, PageNumber(1), false, 2);
	table.get_mut(FrameIndex(2)).unwrap().load(P1, PageNumber(2), false, 3);
	assert_eq!(table.find_free(), None);

	table.get_mut(FrameIndex(1)).unwrap().clear();
	assert_eq!(table.find_free(), Some(FrameIndex(1)));
    }

    #[test]
    fn test_lru_victim_smallest_timestamp() {
	let mut table = FrameTable::new(3).unwrap();
	assert_eq!(table.lru_victim(), None);

	table.get_mut(FrameIndex(0)).unwrap().load(P1, PageNumber(0), false, 300);
	table.get_mut(FrameIndex(1)).unwrap().load(P1, PageNumber(1), false, 100);
	table.get_mut(FrameIndex(2)).unwrap().load(P2, PageNumber(0), false, 200);

	assert_eq!(table.lru_victim(), Some(FrameIndex(1)));
    }

    #[test]
    fn test_lru_victim_tie_breaks_on_lowest_index() {
	let mut table = FrameTable::new(4).unwrap();
	table.get_mut(FrameIndex(0)).unwrap().load(P1, PageNumber(0), false, 500);
	table.get_mut(FrameIndex(1)).unwrap().load(P1, PageNumber(1), false, 200);
	table.get_mut(FrameIndex(2)).unwrap().load(P2, PageNumber(0), false, 200);
	table.get_mut(FrameIndex(3)).unwrap().load(P2, PageNumber(1), false, 200);

	assert_eq!(table.lru_victim(), Some(FrameIndex(1)));
    }

    #[test]
    fn test_lru_victim_ignores_empty_frames() {
	let mut table = FrameTable::new(3).unwrap();
	table.get_mut(FrameIndex(2)).unwrap().load(P1, PageNumber(0), false, 700);
	assert_eq!(table.lru_victim(), Some(FrameIndex(2)));
    }

    #[test]
    fn test_owned_by() {
	let mut table = FrameTable::new(4).unwrap();
	table.get_mut(FrameIndex(0)).unwrap().load(P1, PageNumber(0), false, 1);
	table.get_mut(FrameIndex(1)).unwrap().load(P2, PageNumber(0), false, 1);
	table.get_mut(FrameIndex(3)).unwrap().load(P1, PageNumber(5), true, 1);

	assert_eq!(table.owned_by(P1), vec![FrameIndex(0), FrameIndex(3)]);
	assert_eq!(table.owned_by(P2), vec![FrameIndex(1)]);
	assert!(table.owned_by(ProcessId(9)).is_empty());
	assert_eq!(table.occupied_count(), 3);
    }

    #[test]
    fn test_page_tables() {
	let mut tables = PageTables::new(2, 4).unwrap();
	assert_eq!(tables.slots(), 2);
	assert_eq!(tables.page_count(), 4);
	assert_eq!(tables.lookup(0, PageNumber(1)), None);

	let table = tables.table_mut(1).unwrap();
	assert!(table.set(PageNumber(2), Some(FrameIndex(7))));
	assert!(!table.set(PageNumber(4), Some(FrameIndex(0))));
	assert_eq!(table.resident_count(), 1);

	assert_eq!(tables.lookup(1, PageNumber(2)), Some(FrameIndex(7)));
	assert_eq!(tables.lookup(0, PageNumber(2)), None);
	assert_eq!(tables.lookup(5, PageNumber(2)), None);

	tables.table_mut(1).unwrap().reset();
	assert_eq!(tables.lookup(1, PageNumber(2)), None);
    }
}
