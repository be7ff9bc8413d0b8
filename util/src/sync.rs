use std::{
    cell::RefCell,
    sync::{Arc, Condvar, Mutex},
    thread::{self, ThreadId},
};

#[derive(Default)]
struct Inner {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

/// Logical lock on a game object.
///
/// A logic thread takes the lock before it trusts or mutates state that
/// other logic threads may touch, and keeps every lock it has taken until it
/// calls [`release_all`] at the end of its work cycle. Locking is reentrant
/// for the owning thread.
#[derive(Clone, Default)]
pub struct SyncObject(Arc<Inner>);

thread_local! {
    static HELD: RefCell<Vec<SyncObject>> = const { RefCell::new(Vec::new()) };
}

impl SyncObject {
    /// Block until the current thread owns this object.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut owner = self.0.owner.lock().unwrap();
        loop {
            match *owner {
                Some(id) if id == me => return,
                None => break,
                Some(_) => owner = self.0.released.wait(owner).unwrap(),
            }
        }
        *owner = Some(me);
        drop(owner);

        HELD.with(|h| h.borrow_mut().push(self.clone()));
    }

    /// Whether the current thread holds this lock.
    pub fn is_held(&self) -> bool {
        *self.0.owner.lock().unwrap() == Some(thread::current().id())
    }

    /// Whether any thread holds this lock.
    pub fn is_locked(&self) -> bool {
        self.0.owner.lock().unwrap().is_some()
    }

    fn release(&self) {
        *self.0.owner.lock().unwrap() = None;
        self.0.released.notify_all();
    }
}

/// Release every sync lock the current thread holds, return how many there
/// were.
pub fn release_all() -> usize {
    let held = HELD.with(|h| std::mem::take(&mut *h.borrow_mut()));
    for obj in &held {
        obj.release();
    }
    held.len()
}

/// Copy of a shared collection tagged with the version counter of the
/// collection at the time of copying.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Snapshot<T> {
    pub version: u64,
    pub items: T,
}

impl<T: PartialEq> Snapshot<T> {
    /// Snapshot-then-verify.
    ///
    /// Take a snapshot with `read`, run `lock` on its contents, then read the
    /// collection again. If the version or the contents moved while the locks
    /// were being acquired, the first snapshot is discarded and the whole
    /// procedure recurses.
    pub fn verified(
        read: &mut impl FnMut() -> Snapshot<T>,
        lock: &mut impl FnMut(&T),
    ) -> Snapshot<T> {
        let snap = read();
        lock(&snap.items);

        if read() != snap {
            return Self::verified(read, lock);
        }

        snap
    }
}
