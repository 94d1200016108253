//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::{
    ProcessId,
    ProcessSlot,
    ProtocolError,
};
use std::collections::HashMap;

//==================================================================================================
// Structures
//==================================================================================================
/// Maps raw process ids onto a dense slot space.
///
/// Slots are handed out explicitly on registration, so two ids can never alias the same
/// page table the way a `pid % capacity` mapping would.
#[derive(Clone, Debug)]
pub struct ProcessRegistry {
    slots	: Vec<Option<ProcessId>>,
    index	: HashMap<ProcessId, ProcessSlot>,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl ProcessRegistry {
    pub fn new(capacity: usize) -> Self {
	Self {
	    slots: vec![None; capacity],
	    index: HashMap::with_capacity(capacity),
	}
    }

    /// Assigns the lowest free slot to `pid`.
    ///
    /// # Returns
    /// * `Ok(ProcessSlot)`                      - the assigned slot
    /// * `Err(ProtocolError::AlreadyRegistered)` - if `pid` is already active
    /// * `Err(ProtocolError::RegistryFull)`      - if every slot is taken
    pub fn register(&mut self, pid: ProcessId) -> Result<ProcessSlot, ProtocolError> {
	if self.index.contains_key(&pid) {
	    return Err(ProtocolError::AlreadyRegistered(pid));
	}

	let slot = self.slots
	    .iter()
	    .position(Option::is_none)
	    .ok_or(ProtocolError::RegistryFull {
		pid,
		capacity: self.slots.len(),
	    })?;

	self.slots[slot] = Some(pid);
	self.index.insert(pid, slot);
	Ok(slot)
    }

    /// Frees the slot of `pid`. Returns `None` if `pid` was not active.
    pub fn unregister(&mut self, pid: ProcessId) -> Option<ProcessSlot> {
	let slot = self.index.remove(&pid)?;
	if let Some(entry) = self.slots.get_mut(slot) {
	    *entry = None;
	}
	Some(slot)
    }

    pub fn slot_of(&self, pid: ProcessId) -> Option<ProcessSlot> {
	self.index.get(&pid).copied()
    }

    pub fn pid_at(&self, slot: ProcessSlot) -> Option<ProcessId> {
	self.slots.get(slot).copied().flatten()
    }

    pub fn active(&self) -> usize {
	self.index.len()
    }

    pub fn capacity(&self) -> usize {
	self.slots.len()
    }
}

//==================================================================================================
// Tests
//==================================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_dense_slots() {
	let mut registry = ProcessRegistry::new(3);
	assert_eq!(registry.register(ProcessId(4021)), Ok(0));
	assert_eq!(registry.register(ProcessId(19)), Ok(1));
	assert_eq!(registry.slot_of(ProcessId(19)), Some(1));
	assert_eq!(registry.pid_at(0), Some(ProcessId(4021)));
	assert_eq!(registry.active(), 2);
    }

    #[test]
    fn test_ids_that_would_alias_under_modulo_get_distinct_slots() {
	let mut registry = ProcessRegistry::new(18);
	let a = registry.register(ProcessId(18)).unwrap();
	let b = registry.register(ProcessId(36)).unwrap();
	assert_ne!(a, b);
    }

    #[test]
    fn test_register_errors() {
	let mut registry = ProcessRegistry::new(1);
	registry.register(ProcessId(1)).unwrap();
	assert_eq!(
	    registry.register(ProcessId(1)),
	    Err(ProtocolError::AlreadyRegistered(ProcessId(1)))
	);
	assert_eq!(
	    registry.register(ProcessId(2)),
	    Err(ProtocolError::RegistryFull { pid: ProcessId(2), capacity: 1 })
	);
    }

    #[test]
    fn test_unregister_frees_slot_and_is_idempotent() {
	let mut registry = ProcessRegistry::new(2);
	registry.register(ProcessId(1)).unwrap();
	registry.register(ProcessId(2)).unwrap();

	assert_eq!(registry.unregister(ProcessId(1)), Some(0));
	assert_eq!(registry.unregister(ProcessId(1)), None);
	assert_eq!(registry.active(), 1);
	assert_eq!(registry.pid_at(0), None);

	assert_eq!(registry.register(ProcessId(3)), Ok(0));
    }
}
