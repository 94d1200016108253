use mem_lib::{Action, PageNumber, ProcessId};
use mmu_lib::{MemoryEvent, MemoryManager};
use proptest::prelude::*;
use std::collections::HashSet;

const FRAMES: usize = 4;
const PAGES: usize = 8;
const PROCESSES: u32 = 3;

#[derive(Clone, Debug)]
enum Step {
    Access { pid: u32, page: usize, write: bool },
    Release { pid: u32 },
    Idle,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
	8 => (0..PROCESSES, 0..PAGES, any::<bool>())
	    .prop_map(|(pid, page, write)| Step::Access { pid, page, write }),
	1 => (0..PROCESSES).prop_map(|pid| Step::Release { pid }),
	1 => Just(Step::Idle),
    ]
}

fn fresh_manager() -> MemoryManager {
    let mut mm = MemoryManager::new(FRAMES, PAGES, PROCESSES as usize, 100).unwrap();
    for pid in 0..PROCESSES {
	mm.register_process(ProcessId(pid)).unwrap();
    }
    mm
}

proptest! {
    #[test]
    fn prop_tables_stay_consistent(steps in prop::collection::vec(step(), 1..200)) {
	let mut mm = fresh_manager();

	for step in steps {
	    mm.tick();
	    match step {
		Step::Access { pid, page, write } => {
		    let action = if write { Action::Write } else { Action::Read };
		    let result = mm.handle_request(ProcessId(pid), PageNumber(page), action);
		    prop_assert_eq!(result.is_ok(), mm.is_registered(ProcessId(pid)));
		},
		Step::Release { pid } => {
		    mm.release_process(ProcessId(pid));
		    prop_assert!(mm.frames().owned_by(ProcessId(pid)).is_empty());
		},
		Step::Idle => {},
	    }

	    prop_assert_eq!(mm.check_invariants(), Ok(()));

	    let mut residents = HashSet::new();
	    for (_, frame) in mm.frames().iter() {
		if let Some(resident) = frame.resident() {
		    prop_assert!(residents.insert(resident), "duplicate residency {:?}", resident);
		}
	    }
	}
    }

    #[test]
    fn prop_victim_is_least_recently_used(steps in prop::collection::vec(
	(0..PROCESSES, 0..PAGES, any::<bool>()),
	1..200,
    )) {
	let mut mm = fresh_manager();

	for (pid, page, write) in steps {
	    mm.tick();
	    let before = mm.frames().clone();
	    let action = if write { Action::Write } else { Action::Read };
	    let outcome = mm.handle_request(ProcessId(pid), PageNumber(page), action).unwrap();

	    if let Some(victim) = outcome.victim() {
		let oldest = before.iter()
		    .map(|(_, frame)| frame.last_used())
		    .min()
		    .unwrap();
		prop_assert_eq!(victim.last_used, oldest);

		let first_oldest = before.iter()
		    .find(|(_, frame)| frame.last_used() == oldest)
		    .map(|(index, _)| index)
		    .unwrap();
		prop_assert_eq!(outcome.frame(), first_oldest);
	    }
	}
    }

    #[test]
    fn prop_writeback_precedes_overwrite(steps in prop::collection::vec(
	(0..PROCESSES, 0..PAGES, any::<bool>()),
	1..200,
    )) {
	let mut mm = fresh_manager();

	for (pid, page, write) in steps {
	    mm.tick();
	    let dirty_before: Vec<bool> = mm.frames().iter().map(|(_, f)| f.dirty()).collect();
	    let action = if write { Action::Write } else { Action::Read };
	    mm.handle_request(ProcessId(pid), PageNumber(page), action).unwrap();

	    let events = mm.drain_events();
	    let evicted = events.iter().position(|e| matches!(e, MemoryEvent::Evict { .. }));
	    let Some(evict_at) = evicted else { continue };
	    let MemoryEvent::Evict { frame, .. } = events[evict_at] else { unreachable!() };

	    let writeback_at = events.iter()
		.position(|e| matches!(e, MemoryEvent::Writeback { frame: f, .. } if *f == frame));
	    let load_at = events.iter()
		.position(|e| matches!(e, MemoryEvent::Load { frame: f, .. } if *f == frame))
		.unwrap();

	    if dirty_before[frame.0] {
		let writeback_at = writeback_at.unwrap();
		prop_assert!(writeback_at < evict_at);
		prop_assert!(writeback_at < load_at);
	    } else {
		prop_assert!(writeback_at.is_none());
	    }
	}
    }
}

