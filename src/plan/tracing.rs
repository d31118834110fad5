//! Stacks used while tracing: the mark stack of a marking task and the stack of discovered
//! weak references.

use crate::util::ObjectReference;

/// This trait represents an object queue to enqueue objects during tracing.
pub trait ObjectQueue {
    /// Enqueue an object into the queue.
    fn enqueue(&mut self, object: ObjectReference);
}

/// A mark stack. Entries may be marked or unmarked; marking decides whether an entry is scanned.
///
/// A stack can be split: the newest entries are moved to a new stack that another worker drains.
#[derive(Default, Debug)]
pub struct WorkStack {
    buffer: Vec<ObjectReference>,
}

impl WorkStack {
    /// Reserve a capacity of this on first push to avoid frequent resizing.
    const CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn from_vec(buffer: Vec<ObjectReference>) -> Self {
        Self { buffer }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline(always)]
    pub fn push(&mut self, object: ObjectReference) {
        if self.buffer.capacity() == 0 {
            self.buffer.reserve(Self::CAPACITY);
        }
        self.buffer.push(object);
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Option<ObjectReference> {
        self.buffer.pop()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectReference> {
        self.buffer.iter()
    }

    /// Move the `n` newest entries into a new stack. Takes everything if `n` exceeds the length.
    pub fn split_off_newest(&mut self, n: usize) -> WorkStack {
        let at = self.buffer.len().saturating_sub(n);
        WorkStack {
            buffer: self.buffer.split_off(at),
        }
    }

    /// Split into at most `parts` non-empty stacks of roughly equal size.
    pub fn split_into(mut self, parts: usize) -> Vec<WorkStack> {
        let parts = parts.clamp(1, self.len().max(1));
        let mut result = Vec::with_capacity(parts);
        for remaining in (1..=parts).rev() {
            let n = self.len() / remaining;
            result.push(self.split_off_newest(n));
        }
        result.retain(|s| !s.is_empty());
        result
    }

    /// Move all entries of `other` onto this stack.
    pub fn append(&mut self, other: &mut WorkStack) {
        self.buffer.append(&mut other.buffer);
    }

    /// Return the contents of the underlying vector.  It will empty the stack.
    pub fn take(&mut self) -> Vec<ObjectReference> {
        std::mem::take(&mut self.buffer)
    }

    pub fn into_vec(self) -> Vec<ObjectReference> {
        self.buffer
    }
}

impl ObjectQueue for WorkStack {
    #[inline(always)]
    fn enqueue(&mut self, object: ObjectReference) {
        self.push(object);
    }
}

impl Extend<ObjectReference> for WorkStack {
    fn extend<I: IntoIterator<Item = ObjectReference>>(&mut self, iter: I) {
        self.buffer.extend(iter);
    }
}

/// A weak reference discovered while scanning `holder`. The referent is not traced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WeakRef {
    pub holder: ObjectReference,
    pub referent: ObjectReference,
}

/// Weak references discovered during a cycle. Each marking task fills its own stack and merges it
/// into the cycle's global stack when it finishes.
#[derive(Default, Debug)]
pub struct WeakStack {
    refs: Vec<WeakRef>,
}

impl WeakStack {
    pub fn push(&mut self, weak_ref: WeakRef) {
        self.refs.push(weak_ref);
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Move all entries of `other` into this stack.
    pub fn merge(&mut self, other: &mut WeakStack) {
        self.refs.append(&mut other.refs);
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeakRef> {
        self.refs.iter()
    }

    pub fn into_vec(self) -> Vec<WeakRef> {
        self.refs
    }
}
