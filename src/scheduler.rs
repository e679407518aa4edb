//! Unit-Event Scheduler (4.J): turns raw `UnitEventNotification`s from the
//! live store into batched calls against the Store-Unit Repo, serialised
//! process-wide so multiple open index instances can't saturate CPU/IO.

use crate::delegate::AsyncDelegate;
use crate::error::ImportResult;
use crate::types::UnitName;
use crate::unit_repo::{StoreUnitRepo, UnitRepoDelegate};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Gates the actual import work across every open index in this process
/// (§5: "a single process-wide serial FIFO"). Each scheduler keeps its own
/// event queue; this lock only serialises the batches that drain them.
static PROCESS_WIDE_IMPORT_LOCK: Mutex<()> = Mutex::new(());

pub const BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEventKind {
    Added,
    Modified,
    Removed,
    DirectoryDeleted,
}

#[derive(Debug, Clone)]
pub struct UnitEventInfo {
    pub kind: UnitEventKind,
    pub name: UnitName,
    pub is_initial_scan: bool,
    pub is_dependency: bool,
}

pub struct UnitEventNotification {
    pub events: Vec<(UnitEventKind, UnitName)>,
    pub is_initial: bool,
}

/// Forwards `Store-Unit Repo` callbacks to the async delegate and, for
/// explicit-output dependency propagation, back into the scheduler's own
/// queue (§4.I step 7).
struct SchedulerDelegate<'a> {
    async_delegate: &'a AsyncDelegate,
    queue: &'a Mutex<VecDeque<UnitEventInfo>>,
}

impl UnitRepoDelegate for SchedulerDelegate<'_> {
    fn processed_store_unit(&self, name: &UnitName) {
        self.async_delegate.processed_store_unit(name.clone());
    }

    fn unit_out_of_date(&self, name: &UnitName) {
        self.async_delegate.unit_out_of_date(name.clone());
    }

    fn enqueue_dependency(&self, name: UnitName) {
        let mut queue = self.queue.lock().expect("scheduler queue lock poisoned");
        if queue.iter().any(|e| e.name == name) {
            return;
        }
        queue.push_back(UnitEventInfo {
            kind: UnitEventKind::Added,
            name,
            is_initial_scan: false,
            is_dependency: true,
        });
    }
}

pub struct UnitEventScheduler<'a> {
    repo: &'a StoreUnitRepo<'a>,
    delegate: &'a AsyncDelegate,
    queue: Mutex<VecDeque<UnitEventInfo>>,
    explicit_output_units: Option<HashSet<UnitName>>,
    batch_size: usize,
}

impl<'a> UnitEventScheduler<'a> {
    pub fn new(repo: &'a StoreUnitRepo<'a>, delegate: &'a AsyncDelegate, explicit_output_units: Option<HashSet<UnitName>>) -> Self {
        Self {
            repo,
            delegate,
            queue: Mutex::new(VecDeque::new()),
            explicit_output_units,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn enqueue_notification(&self, notification: UnitEventNotification) {
        if notification.is_initial {
            self.delegate.initial_pending_units(notification.events.len());
        }
        self.delegate.processing_added_pending(notification.events.len());

        let mut queue = self.queue.lock().expect("scheduler queue lock poisoned");
        for (kind, name) in notification.events {
            queue.push_back(UnitEventInfo {
                kind,
                name,
                is_initial_scan: notification.is_initial,
                is_dependency: false,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().expect("scheduler queue lock poisoned").is_empty()
    }

    /// Drains the queue in batches of at most `batch_size`, serialised
    /// against every other open index via [`PROCESS_WIDE_IMPORT_LOCK`].
    pub fn process_all(&self) -> ImportResult<()> {
        loop {
            let batch: Vec<UnitEventInfo> = {
                let mut queue = self.queue.lock().expect("scheduler queue lock poisoned");
                if queue.is_empty() {
                    return Ok(());
                }
                (0..self.batch_size).filter_map(|_| queue.pop_front()).collect()
            };
            self.process_batch(&batch)?;
        }
    }

    fn process_batch(&self, batch: &[UnitEventInfo]) -> ImportResult<()> {
        let _gate = PROCESS_WIDE_IMPORT_LOCK.lock().expect("process-wide import lock poisoned");
        let scheduler_delegate = SchedulerDelegate { async_delegate: self.delegate, queue: &self.queue };

        for event in batch {
            if self.should_skip(event) {
                continue;
            }
            match event.kind {
                UnitEventKind::Removed => {
                    self.repo.remove_unit(&event.name)?;
                }
                // Recovery for a deleted directory is left to a higher layer
                // (4.J open question a): no trigger path, no unit removal,
                // just a hint that the unit may be stale.
                UnitEventKind::DirectoryDeleted => {
                    self.delegate.unit_out_of_date(event.name.clone());
                }
                UnitEventKind::Added | UnitEventKind::Modified => {
                    self.repo.register_unit(&event.name, &scheduler_delegate)?;
                }
            }
        }
        self.delegate.processing_completed(batch.len());
        Ok(())
    }

    fn should_skip(&self, event: &UnitEventInfo) -> bool {
        if event.is_dependency {
            return false;
        }
        match &self.explicit_output_units {
            Some(units) => !units.contains(&event.name),
            None => false,
        }
    }

    /// Testing / explicit-scan variant: diffs `current_listing` against
    /// `previous_snapshot`, synthesises events and processes them
    /// synchronously to completion. `previous_snapshot` is updated in
    /// place so the caller can call this repeatedly.
    pub fn poll_for_unit_changes_and_wait(
        &self,
        previous_snapshot: &mut HashMap<UnitName, u64>,
        current_listing: HashMap<UnitName, u64>,
    ) -> ImportResult<()> {
        let mut events = Vec::new();
        for (name, mod_time) in &current_listing {
            match previous_snapshot.get(name) {
                None => events.push((UnitEventKind::Added, name.clone())),
                Some(prev) if prev != mod_time => events.push((UnitEventKind::Modified, name.clone())),
                _ => {}
            }
        }
        for name in previous_snapshot.keys() {
            if !current_listing.contains_key(name) {
                events.push((UnitEventKind::Removed, name.clone()));
            }
        }

        *previous_snapshot = current_listing;

        self.enqueue_notification(UnitEventNotification { events, is_initial: false });
        self.process_all()
    }
}
