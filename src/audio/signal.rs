use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A latching flag that threads can block on until it is set.
///
/// Setting wakes every waiter; the flag stays set until cleared, so a
/// `wait` that starts after `set` returns immediately.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub fn new(initial: bool) -> Self {
        Self {
            flag: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.condvar.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Block until the flag is set.
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.condvar.wait(&mut flag);
        }
    }

    /// Block until the flag is set or `timeout` elapses. Returns the flag.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if !*flag {
            self.condvar.wait_while_for(&mut flag, |set| !*set, timeout);
        }
        *flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_immediately_when_set() {
        let signal = Signal::new(true);
        signal.wait();
        assert!(signal.is_set());
    }

    #[test]
    fn set_wakes_a_blocked_waiter() {
        let signal = Arc::new(Signal::new(false));
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait())
        };
        thread::sleep(Duration::from_millis(20));
        signal.set();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_timeout_reports_unset_flag() {
        let signal = Signal::new(false);
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        signal.clear();
        assert!(!signal.is_set());
    }
}
