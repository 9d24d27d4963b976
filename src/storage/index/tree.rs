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

//! Order-statistics red-black tree over record entries
//!
//! The tree stores one node per indexed record handle. Every node
//! carries its subtree size, which turns rank and select into O(log n)
//! walks; in-order iteration runs through parent pointers in O(1)
//! amortized per step with no allocation.
//!
//! The tree itself knows nothing about keys. Every ordering decision is
//! delegated to a caller-supplied comparator closure, which is how the
//! index layer routes comparisons through row slots and the record
//! store. The comparator must be a strict total order: two distinct
//! nodes comparing equal means a broken tiebreak, which is surfaced as
//! a fatal internal error rather than tolerated.
//!
//! Nodes live in an arena `Vec`; slot 0 is the shared nil sentinel.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::core::{Error, RecordId, RecordVersion, Result, NO_RECORD};
use crate::storage::row::DataRow;

/// The nil sentinel lives in arena slot 0.
pub(crate) const NIL: u32 = 0;

/// One indexed record: the cached handle, the owning row and the
/// version slot the handle was taken from
#[derive(Clone)]
pub struct IndexEntry {
    /// Record handle as cached at insert time
    pub record: RecordId,
    /// Owning row; comparators read the live slot through it
    pub row: Rc<DataRow>,
    /// Which slot of the row this entry covers
    pub version: RecordVersion,
}

impl IndexEntry {
    /// Create an entry for one (row, version) pair
    pub fn new(record: RecordId, row: Rc<DataRow>, version: RecordVersion) -> Self {
        Self {
            record,
            row,
            version,
        }
    }
}

impl fmt::Debug for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexEntry")
            .field("record", &self.record)
            .field("row", &self.row.id())
            .field("version", &self.version)
            .finish()
    }
}

struct Node {
    left: u32,
    right: u32,
    parent: u32,
    red: bool,
    /// Nodes in the subtree rooted here, self included; 0 at the sentinel
    size: u32,
    entry: IndexEntry,
}

/// Self-balancing search tree with subtree-size augmentation
pub struct RecordTree {
    nodes: Vec<Node>,
    free: Vec<u32>,
    root: u32,
    /// Placeholder row for the sentinel and freed slots
    dummy_row: Rc<DataRow>,
}

impl RecordTree {
    /// Create an empty tree
    pub fn new() -> Self {
        let dummy_row = Rc::new(DataRow::new(u64::MAX));
        let sentinel = Node {
            left: NIL,
            right: NIL,
            parent: NIL,
            red: false,
            size: 0,
            entry: IndexEntry::new(NO_RECORD, dummy_row.clone(), RecordVersion::Current),
        };
        Self {
            nodes: vec![sentinel],
            free: Vec::new(),
            root: NIL,
            dummy_row,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.nodes[self.root as usize].size as usize
    }

    /// Returns true if the tree holds no entries
    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    // =========================================================================
    // Node plumbing
    // =========================================================================

    #[inline]
    fn left(&self, n: u32) -> u32 {
        self.nodes[n as usize].left
    }

    #[inline]
    fn right(&self, n: u32) -> u32 {
        self.nodes[n as usize].right
    }

    #[inline]
    fn parent(&self, n: u32) -> u32 {
        self.nodes[n as usize].parent
    }

    #[inline]
    fn size(&self, n: u32) -> u32 {
        self.nodes[n as usize].size
    }

    #[inline]
    fn is_red(&self, n: u32) -> bool {
        self.nodes[n as usize].red
    }

    #[inline]
    pub(crate) fn entry_ref(&self, n: u32) -> &IndexEntry {
        &self.nodes[n as usize].entry
    }

    fn alloc(&mut self, entry: IndexEntry) -> u32 {
        let node = Node {
            left: NIL,
            right: NIL,
            parent: NIL,
            red: true,
            size: 1,
            entry,
        };
        match self.free.pop() {
            Some(n) => {
                self.nodes[n as usize] = node;
                n
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, n: u32) -> IndexEntry {
        let dummy = IndexEntry::new(NO_RECORD, self.dummy_row.clone(), RecordVersion::Current);
        let node = &mut self.nodes[n as usize];
        let entry = std::mem::replace(&mut node.entry, dummy);
        node.left = NIL;
        node.right = NIL;
        node.parent = NIL;
        node.size = 0;
        self.free.push(n);
        entry
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert an entry under a strict total order
    ///
    /// `cmp(new, existing)` orders the incoming entry against a node
    /// already in the tree. Returns the 0-based rank the entry landed
    /// at. Equality against any existing node is a comparator bug
    /// (the secondary tiebreak must make every pair distinct) and
    /// poisons nothing: the tree is left exactly as it was.
    pub fn insert(
        &mut self,
        entry: IndexEntry,
        mut cmp: impl FnMut(&IndexEntry, &IndexEntry) -> Ordering,
    ) -> Result<usize> {
        let mut parent = NIL;
        let mut go_left = false;
        let mut n = self.root;
        let mut rank = 0usize;

        while n != NIL {
            match cmp(&entry, self.entry_ref(n)) {
                Ordering::Less => {
                    parent = n;
                    go_left = true;
                    n = self.left(n);
                }
                Ordering::Greater => {
                    rank += self.size(self.left(n)) as usize + 1;
                    parent = n;
                    go_left = false;
                    n = self.right(n);
                }
                Ordering::Equal => {
                    warn!(
                        record = entry.record,
                        row = entry.row.id(),
                        "duplicate tiebreak collision during index insert"
                    );
                    return Err(Error::internal(
                        "two index entries compare equal under the full ordering",
                    ));
                }
            }
        }

        let z = self.alloc(entry);
        self.nodes[z as usize].parent = parent;
        if parent == NIL {
            self.root = z;
        } else if go_left {
            self.nodes[parent as usize].left = z;
        } else {
            self.nodes[parent as usize].right = z;
        }

        let mut p = parent;
        while p != NIL {
            self.nodes[p as usize].size += 1;
            p = self.parent(p);
        }

        self.insert_fixup(z);
        Ok(rank)
    }

    fn insert_fixup(&mut self, mut z: u32) {
        while self.is_red(self.parent(z)) {
            let p = self.parent(z);
            let g = self.parent(p);
            if p == self.left(g) {
                let y = self.right(g);
                if self.is_red(y) {
                    self.nodes[p as usize].red = false;
                    self.nodes[y as usize].red = false;
                    self.nodes[g as usize].red = true;
                    z = g;
                } else {
                    if z == self.right(p) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.nodes[p as usize].red = false;
                    self.nodes[g as usize].red = true;
                    self.rotate_right(g);
                }
            } else {
                let y = self.left(g);
                if self.is_red(y) {
                    self.nodes[p as usize].red = false;
                    self.nodes[y as usize].red = false;
                    self.nodes[g as usize].red = true;
                    z = g;
                } else {
                    if z == self.left(p) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.nodes[p as usize].red = false;
                    self.nodes[g as usize].red = true;
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.nodes[root as usize].red = false;
        self.nodes[NIL as usize].red = false;
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove and return the entry at `rank`
    pub fn delete_at(&mut self, rank: usize) -> Option<IndexEntry> {
        let z = self.node_at_rank(rank);
        if z == NIL {
            return None;
        }

        let y_was_red;
        let x;
        let zl = self.left(z);
        let zr = self.right(z);

        if zl == NIL {
            self.dec_sizes_above(z);
            y_was_red = self.is_red(z);
            x = zr;
            self.transplant(z, zr);
        } else if zr == NIL {
            self.dec_sizes_above(z);
            y_was_red = self.is_red(z);
            x = zl;
            self.transplant(z, zl);
        } else {
            // Splice out the in-order successor and move it into z's spot.
            let y = self.minimum(zr);
            self.dec_sizes_above(y);
            y_was_red = self.is_red(y);
            x = self.right(y);
            if self.parent(y) == z {
                self.nodes[x as usize].parent = y;
            } else {
                self.transplant(y, x);
                let new_right = self.right(z);
                self.nodes[y as usize].right = new_right;
                self.nodes[new_right as usize].parent = y;
            }
            self.transplant(z, y);
            let new_left = self.left(z);
            self.nodes[y as usize].left = new_left;
            self.nodes[new_left as usize].parent = y;
            self.nodes[y as usize].red = self.is_red(z);
            self.nodes[y as usize].size = self.size(self.left(y)) + self.size(self.right(y)) + 1;
        }

        if !y_was_red {
            self.delete_fixup(x);
        }
        // The fixup may scribble on the sentinel; keep it canonical.
        self.nodes[NIL as usize].red = false;
        self.nodes[NIL as usize].parent = NIL;

        Some(self.release(z))
    }

    fn dec_sizes_above(&mut self, n: u32) {
        let mut p = self.parent(n);
        while p != NIL {
            self.nodes[p as usize].size -= 1;
            p = self.parent(p);
        }
    }

    fn transplant(&mut self, u: u32, v: u32) {
        let up = self.parent(u);
        if up == NIL {
            self.root = v;
        } else if u == self.left(up) {
            self.nodes[up as usize].left = v;
        } else {
            self.nodes[up as usize].right = v;
        }
        self.nodes[v as usize].parent = up;
    }

    fn delete_fixup(&mut self, mut x: u32) {
        while x != self.root && !self.is_red(x) {
            let xp = self.parent(x);
            if x == self.left(xp) {
                let mut w = self.right(xp);
                if self.is_red(w) {
                    self.nodes[w as usize].red = false;
                    self.nodes[xp as usize].red = true;
                    self.rotate_left(xp);
                    w = self.right(self.parent(x));
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.nodes[w as usize].red = true;
                    x = self.parent(x);
                } else {
                    if !self.is_red(self.right(w)) {
                        let wl = self.left(w);
                        self.nodes[wl as usize].red = false;
                        self.nodes[w as usize].red = true;
                        self.rotate_right(w);
                        w = self.right(self.parent(x));
                    }
                    let xp = self.parent(x);
                    self.nodes[w as usize].red = self.is_red(xp);
                    self.nodes[xp as usize].red = false;
                    let wr = self.right(w);
                    self.nodes[wr as usize].red = false;
                    self.rotate_left(xp);
                    x = self.root;
                }
            } else {
                let mut w = self.left(xp);
                if self.is_red(w) {
                    self.nodes[w as usize].red = false;
                    self.nodes[xp as usize].red = true;
                    self.rotate_right(xp);
                    w = self.left(self.parent(x));
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.nodes[w as usize].red = true;
                    x = self.parent(x);
                } else {
                    if !self.is_red(self.left(w)) {
                        let wr = self.right(w);
                        self.nodes[wr as usize].red = false;
                        self.nodes[w as usize].red = true;
                        self.rotate_left(w);
                        w = self.left(self.parent(x));
                    }
                    let xp = self.parent(x);
                    self.nodes[w as usize].red = self.is_red(xp);
                    self.nodes[xp as usize].red = false;
                    let wl = self.left(w);
                    self.nodes[wl as usize].red = false;
                    self.rotate_right(xp);
                    x = self.root;
                }
            }
        }
        self.nodes[x as usize].red = false;
    }

    // =========================================================================
    // Rotations (size-preserving)
    // =========================================================================

    fn rotate_left(&mut self, x: u32) {
        let y = self.right(x);
        let yl = self.left(y);
        self.nodes[x as usize].right = yl;
        if yl != NIL {
            self.nodes[yl as usize].parent = x;
        }
        let xp = self.parent(x);
        self.nodes[y as usize].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.left(xp) {
            self.nodes[xp as usize].left = y;
        } else {
            self.nodes[xp as usize].right = y;
        }
        self.nodes[y as usize].left = x;
        self.nodes[x as usize].parent = y;

        self.nodes[y as usize].size = self.size(x);
        self.nodes[x as usize].size = self.size(self.left(x)) + self.size(self.right(x)) + 1;
    }

    fn rotate_right(&mut self, x: u32) {
        let y = self.left(x);
        let yr = self.right(y);
        self.nodes[x as usize].left = yr;
        if yr != NIL {
            self.nodes[yr as usize].parent = x;
        }
        let xp = self.parent(x);
        self.nodes[y as usize].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.left(xp) {
            self.nodes[xp as usize].left = y;
        } else {
            self.nodes[xp as usize].right = y;
        }
        self.nodes[y as usize].right = x;
        self.nodes[x as usize].parent = y;

        self.nodes[y as usize].size = self.size(x);
        self.nodes[x as usize].size = self.size(self.left(x)) + self.size(self.right(x)) + 1;
    }

    // =========================================================================
    // Rank / select / search
    // =========================================================================

    pub(crate) fn node_at_rank(&self, rank: usize) -> u32 {
        if rank >= self.len() {
            return NIL;
        }
        let mut n = self.root;
        let mut r = rank;
        loop {
            let ls = self.size(self.left(n)) as usize;
            if r < ls {
                n = self.left(n);
            } else if r == ls {
                return n;
            } else {
                r -= ls + 1;
                n = self.right(n);
            }
        }
    }

    /// Entry at `rank`, or None when out of range
    pub fn get(&self, rank: usize) -> Option<&IndexEntry> {
        let n = self.node_at_rank(rank);
        if n == NIL {
            None
        } else {
            Some(self.entry_ref(n))
        }
    }

    /// Swap the cached record handle of the entry at `rank` in place
    ///
    /// Only valid when the caller knows the new record sorts identically
    /// (a key-equal update); the tree is not re-balanced.
    pub fn replace_record_at(&mut self, rank: usize, record: RecordId) -> Option<RecordId> {
        let n = self.node_at_rank(rank);
        if n == NIL {
            return None;
        }
        let old = self.nodes[n as usize].entry.record;
        self.nodes[n as usize].entry.record = record;
        Some(old)
    }

    /// Rank of the node matching the target, searching by comparison
    ///
    /// `cmp_to(entry)` orders an existing entry against the target.
    /// Requires the same strict total order the tree was built under.
    pub fn position_of(&self, mut cmp_to: impl FnMut(&IndexEntry) -> Ordering) -> Option<usize> {
        let mut n = self.root;
        let mut rank = 0usize;
        while n != NIL {
            match cmp_to(self.entry_ref(n)) {
                Ordering::Equal => return Some(rank + self.size(self.left(n)) as usize),
                Ordering::Less => {
                    rank += self.size(self.left(n)) as usize + 1;
                    n = self.right(n);
                }
                Ordering::Greater => n = self.left(n),
            }
        }
        None
    }

    /// First rank whose entry does not order below the target
    pub fn lower_bound(&self, mut cmp_to: impl FnMut(&IndexEntry) -> Ordering) -> usize {
        let mut n = self.root;
        let mut rank = 0usize;
        let mut result = self.len();
        while n != NIL {
            let ls = self.size(self.left(n)) as usize;
            if cmp_to(self.entry_ref(n)) == Ordering::Less {
                rank += ls + 1;
                n = self.right(n);
            } else {
                result = rank + ls;
                n = self.left(n);
            }
        }
        result
    }

    /// First rank whose entry orders above the target
    pub fn upper_bound(&self, mut cmp_to: impl FnMut(&IndexEntry) -> Ordering) -> usize {
        let mut n = self.root;
        let mut rank = 0usize;
        let mut result = self.len();
        while n != NIL {
            let ls = self.size(self.left(n)) as usize;
            if cmp_to(self.entry_ref(n)) == Ordering::Greater {
                result = rank + ls;
                n = self.left(n);
            } else {
                rank += ls + 1;
                n = self.right(n);
            }
        }
        result
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    fn minimum(&self, mut n: u32) -> u32 {
        while self.left(n) != NIL {
            n = self.left(n);
        }
        n
    }

    pub(crate) fn successor(&self, mut n: u32) -> u32 {
        if self.right(n) != NIL {
            return self.minimum(self.right(n));
        }
        let mut p = self.parent(n);
        while p != NIL && n == self.right(p) {
            n = p;
            p = self.parent(p);
        }
        p
    }

    /// Forward cursor starting at `rank`
    ///
    /// The cursor borrows the tree; it cannot outlive a structural
    /// mutation, which the borrow checker (or the index's cell borrow)
    /// turns into a loud failure rather than silent corruption.
    pub fn cursor_from(&self, rank: usize) -> TreeCursor<'_> {
        TreeCursor {
            tree: self,
            node: self.node_at_rank(rank),
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Structural verification walk: red-black and subtree-size
    /// invariants
    ///
    /// Corruption here is unrecoverable for the index; callers rebuild
    /// from a full scan instead of patching.
    pub fn verify(&self) -> Result<()> {
        if self.is_red(self.root) {
            return Err(Error::internal("red root"));
        }
        self.verify_node(self.root).map(|_| ())
    }

    /// Returns the black height of the subtree
    fn verify_node(&self, n: u32) -> Result<usize> {
        if n == NIL {
            return Ok(1);
        }
        let l = self.left(n);
        let r = self.right(n);

        if self.is_red(n) && (self.is_red(l) || self.is_red(r)) {
            return Err(Error::internal("red node with red child"));
        }
        if self.size(n) != self.size(l) + self.size(r) + 1 {
            return Err(Error::internal("subtree size mismatch"));
        }
        if l != NIL && self.parent(l) != n || r != NIL && self.parent(r) != n {
            return Err(Error::internal("parent pointer mismatch"));
        }

        let lh = self.verify_node(l)?;
        let rh = self.verify_node(r)?;
        if lh != rh {
            return Err(Error::internal("black height mismatch"));
        }
        Ok(lh + usize::from(!self.is_red(n)))
    }
}

impl Default for RecordTree {
    fn default() -> Self {
        Self::new()
    }
}

/// In-order forward cursor over a tree
pub struct TreeCursor<'a> {
    tree: &'a RecordTree,
    node: u32,
}

impl<'a> Iterator for TreeCursor<'a> {
    type Item = &'a IndexEntry;

    fn next(&mut self) -> Option<&'a IndexEntry> {
        if self.node == NIL {
            return None;
        }
        let entry = self.tree.entry_ref(self.node);
        self.node = self.tree.successor(self.node);
        Some(entry)
    }
}
