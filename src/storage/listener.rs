// Copyright 2025 Rowdex Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Change notification bus for index observers
//!
//! A single-thread reentrancy pattern, not concurrent mutation: slots
//! are `Option`s so a listener can detach itself (or a peer) from
//! inside its own handler. Removal nulls the slot immediately; the
//! vector is compacted only once no dispatch is in progress, tracked by
//! a live-reader counter. Listeners added during a dispatch are not
//! visited by that dispatch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Positional change event fired by an index
///
/// A move is distinguished from a change by whether the record's rank
/// actually shifted. `Reset` means every cached position is invalid;
/// observers re-derive from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    /// A record entered the index at `position`
    ItemAdded { position: usize },
    /// The record at `position` left the index
    ItemDeleted { position: usize },
    /// The record at `position` changed without moving
    ItemChanged { position: usize },
    /// The record at `from` is now at `to`
    ItemMoved { from: usize, to: usize },
    /// Wholesale change; discard all cached positions
    Reset,
}

/// Observer of one index's positional changes
pub trait IndexListener {
    /// Called once per structural change, after the index has mutated
    fn index_changed(&self, event: &IndexEvent);
}

/// Listener collection with safe mutation-during-dispatch semantics
pub struct ListenerList {
    slots: RefCell<Vec<Option<Rc<dyn IndexListener>>>>,
    live_readers: Cell<usize>,
}

impl ListenerList {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            live_readers: Cell::new(0),
        }
    }

    /// Number of attached listeners
    pub fn len(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no listeners are attached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach a listener
    ///
    /// A listener attached while a dispatch is running is not visited
    /// by that dispatch.
    pub fn add(&self, listener: Rc<dyn IndexListener>) {
        self.slots.borrow_mut().push(Some(listener));
    }

    /// Detach a listener (by identity)
    ///
    /// Safe to call from inside a handler: the slot is nulled at once
    /// so the listener is not visited again, and physical compaction
    /// waits until the outermost dispatch finishes.
    pub fn remove(&self, listener: &Rc<dyn IndexListener>) {
        {
            let mut slots = self.slots.borrow_mut();
            for slot in slots.iter_mut() {
                let matches = slot
                    .as_ref()
                    .is_some_and(|l| Rc::ptr_eq(l, listener));
                if matches {
                    *slot = None;
                    break;
                }
            }
        }
        if self.live_readers.get() == 0 {
            self.compact();
        }
    }

    /// Dispatch an event to every listener attached before this call
    pub fn notify(&self, event: &IndexEvent) {
        let snapshot_len = self.slots.borrow().len();
        let _guard = ReadGuard::enter(self);

        for i in 0..snapshot_len {
            // Re-borrow per step so a handler can add/remove listeners.
            let listener = self.slots.borrow().get(i).and_then(|s| s.clone());
            if let Some(listener) = listener {
                listener.index_changed(event);
            }
        }
    }

    fn compact(&self) {
        self.slots.borrow_mut().retain(|s| s.is_some());
    }
}

impl Default for ListenerList {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a dispatch in progress; compacts on the way out of the
/// outermost one
struct ReadGuard<'a> {
    list: &'a ListenerList,
}

impl<'a> ReadGuard<'a> {
    fn enter(list: &'a ListenerList) -> Self {
        list.live_readers.set(list.live_readers.get() + 1);
        Self { list }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let readers = self.list.live_readers.get() - 1;
        self.list.live_readers.set(readers);
        if readers == 0 {
            self.list.compact();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        events: RefCell<Vec<IndexEvent>>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                events: RefCell::new(Vec::new()),
            })
        }
    }

    impl IndexListener for Recorder {
        fn index_changed(&self, event: &IndexEvent) {
            self.events.borrow_mut().push(*event);
        }
    }

    #[test]
    fn test_notify_reaches_all_listeners() {
        let list = ListenerList::new();
        let a = Recorder::new();
        let b = Recorder::new();
        list.add(a.clone());
        list.add(b.clone());

        list.notify(&IndexEvent::ItemAdded { position: 3 });

        assert_eq!(a.events.borrow().len(), 1);
        assert_eq!(b.events.borrow().len(), 1);
        assert_eq!(
            a.events.borrow()[0],
            IndexEvent::ItemAdded { position: 3 }
        );
    }

    #[test]
    fn test_removed_listener_not_notified() {
        let list = ListenerList::new();
        let a = Recorder::new();
        list.add(a.clone());
        let handle: Rc<dyn IndexListener> = a.clone();
        list.remove(&handle);

        list.notify(&IndexEvent::Reset);
        assert!(a.events.borrow().is_empty());
        assert_eq!(list.len(), 0);
    }

    // Detaches itself from the list on the first event it sees.
    struct SelfRemover {
        list: Rc<ListenerList>,
        me: RefCell<Option<Rc<dyn IndexListener>>>,
        calls: Cell<usize>,
    }

    impl IndexListener for SelfRemover {
        fn index_changed(&self, _event: &IndexEvent) {
            self.calls.set(self.calls.get() + 1);
            if let Some(me) = self.me.borrow_mut().take() {
                self.list.remove(&me);
            }
        }
    }

    #[test]
    fn test_remove_during_dispatch() {
        let list = Rc::new(ListenerList::new());
        let remover = Rc::new(SelfRemover {
            list: list.clone(),
            me: RefCell::new(None),
            calls: Cell::new(0),
        });
        let handle: Rc<dyn IndexListener> = remover.clone();
        *remover.me.borrow_mut() = Some(handle.clone());

        let tail = Recorder::new();
        list.add(handle);
        list.add(tail.clone());

        list.notify(&IndexEvent::Reset);
        // The remover ran once and detached; the tail listener still ran.
        assert_eq!(remover.calls.get(), 1);
        assert_eq!(tail.events.borrow().len(), 1);

        list.notify(&IndexEvent::Reset);
        assert_eq!(remover.calls.get(), 1);
        assert_eq!(tail.events.borrow().len(), 2);
        assert_eq!(list.len(), 1);
    }

    // Adds a fresh listener from inside a dispatch.
    struct Adder {
        list: Rc<ListenerList>,
        added: RefCell<Option<Rc<Recorder>>>,
    }

    impl IndexListener for Adder {
        fn index_changed(&self, _event: &IndexEvent) {
            let recorder = Recorder::new();
            self.list.add(recorder.clone());
            *self.added.borrow_mut() = Some(recorder);
        }
    }

    #[test]
    fn test_added_during_dispatch_waits_for_next() {
        let list = Rc::new(ListenerList::new());
        let adder = Rc::new(Adder {
            list: list.clone(),
            added: RefCell::new(None),
        });
        list.add(adder.clone());

        list.notify(&IndexEvent::Reset);
        let recorder = adder.added.borrow().clone().unwrap();
        // Not visited by the dispatch that added it
        assert!(recorder.events.borrow().is_empty());

        list.notify(&IndexEvent::Reset);
        assert_eq!(recorder.events.borrow().len(), 1);
    }
}
