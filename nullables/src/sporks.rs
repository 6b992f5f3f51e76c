//! Nullable sporks: switches flipped by the test.

use mx_types::{Spork, Sporks};
use std::collections::HashSet;
use std::sync::Mutex;

/// All sporks start inactive.
#[derive(Default)]
pub struct NullSporks {
    active: Mutex<HashSet<Spork>>,
}

impl NullSporks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, spork: Spork) {
        self.active.lock().unwrap().insert(spork);
    }

    pub fn deactivate(&self, spork: Spork) {
        self.active.lock().unwrap().remove(&spork);
    }
}

impl Sporks for NullSporks {
    fn is_active(&self, spork: Spork) -> bool {
        self.active.lock().unwrap().contains(&spork)
    }
}
