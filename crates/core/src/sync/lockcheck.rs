//! Per-thread lock-order verification.
//!
//! With the `lock-check` feature enabled, every line-lock acquisition is
//! pushed on a thread-local stack and every release must pop the same lock:
//! unlock order must mirror lock order. A violation aborts with the offending
//! lock identity, which localizes protocol bugs in multithreaded drivers far
//! earlier than the eventual deadlock would.

use std::cell::RefCell;

thread_local! {
    static LOCK_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Records a lock acquisition on the current thread.
pub fn push(lock: usize) {
    LOCK_STACK.with(|s| s.borrow_mut().push(lock));
}

/// Records a lock release; aborts if it violates stack discipline.
pub fn pop(lock: usize) {
    LOCK_STACK.with(|s| {
        let mut stack = s.borrow_mut();
        match stack.pop() {
            Some(top) if top == lock => {}
            Some(top) => panic!(
                "line-lock release violates LIFO order: released {lock:#x}, top of stack is {top:#x}"
            ),
            None => panic!("line-lock release with an empty lock stack"),
        }
    });
}

/// Asserts that the current thread holds no line locks.
///
/// Drivers call this between operations; a non-empty stack means some path
/// leaked a lock.
pub fn check_clear() {
    LOCK_STACK.with(|s| {
        let stack = s.borrow();
        assert!(
            stack.is_empty(),
            "thread still holds {} line lock(s) between driver operations",
            stack.len()
        );
    });
}
