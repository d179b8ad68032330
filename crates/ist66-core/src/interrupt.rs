//! The priority interrupt controller (§4.4).
//!
//! State lives behind one mutex shared by the CPU thread and every device
//! worker thread; a condition variable wakes the CPU when it is halted and
//! waiting for an unmasked interrupt. Lock ordering is `device -> CPU`
//! (§5): devices call [`InterruptController::assert`]/`release` without
//! holding their own lock across the call.

use std::sync::{Condvar, Mutex};

/// Number of interrupt lines. Only 1..=14 are assertable by devices; 0 is
/// reserved for exception entry and 15 for the IOCPU's asynchronous entry.
const IRQ_COUNT: usize = 16;

/// Sentinel meaning "no IRQ pending", used as the value of `min_pending`.
pub const NO_IRQ: u8 = 15;

struct State {
    counters: [u16; IRQ_COUNT],
    mask: u16,
    min_pending: u8,
    running: bool,
    exit: bool,
}

impl State {
    fn recompute_min_pending(&mut self) {
        self.min_pending = NO_IRQ;
        for n in 1..15u8 {
            if self.counters[n as usize] > 0 && (self.mask & (1 << n)) != 0 {
                self.min_pending = n;
                break;
            }
        }
    }
}

/// Shared interrupt controller: per-IRQ pending counters, a 16-bit mask,
/// and the cached lowest pending enabled IRQ.
pub struct InterruptController {
    state: Mutex<State>,
    cv: Condvar,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                counters: [0; IRQ_COUNT],
                mask: 0,
                min_pending: NO_IRQ,
                running: false,
                exit: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Assert IRQ `n` (1..=14). Wakes the CPU if this is now the lowest
    /// pending enabled IRQ.
    pub fn assert(&self, n: u8) {
        let mut st = self.state.lock().unwrap();
        st.counters[n as usize] = st.counters[n as usize].saturating_add(1);
        if n < st.min_pending && (st.mask & (1 << n)) != 0 {
            st.min_pending = n;
            st.running = true;
            self.cv.notify_all();
        }
    }

    /// Release one pending assertion of IRQ `n` (clamped at zero), then
    /// recompute the lowest pending enabled IRQ.
    pub fn release(&self, n: u8) {
        let mut st = self.state.lock().unwrap();
        st.counters[n as usize] = st.counters[n as usize].saturating_sub(1);
        st.recompute_min_pending();
    }

    /// Replace the interrupt mask and recompute the lowest pending enabled
    /// IRQ.
    pub fn set_mask(&self, mask: u16) {
        let mut st = self.state.lock().unwrap();
        st.mask = mask;
        st.recompute_min_pending();
    }

    #[must_use]
    pub fn mask(&self) -> u16 {
        self.state.lock().unwrap().mask
    }

    /// The lowest pending, enabled IRQ in `[1, 15]`; `15` means none.
    #[must_use]
    pub fn min_pending(&self) -> u8 {
        self.state.lock().unwrap().min_pending
    }

    #[must_use]
    pub fn pending_count(&self, n: u8) -> u16 {
        self.state.lock().unwrap().counters[n as usize]
    }

    /// Mark the CPU running (free-run) or halted. Setting `true` wakes any
    /// thread blocked in [`InterruptController::wait_while_idle`].
    pub fn set_running(&self, running: bool) {
        let mut st = self.state.lock().unwrap();
        st.running = running;
        if running {
            self.cv.notify_all();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Request shutdown of the CPU's execution loop.
    pub fn request_exit(&self) {
        let mut st = self.state.lock().unwrap();
        st.exit = true;
        self.cv.notify_all();
    }

    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.state.lock().unwrap().exit
    }

    /// Block until the CPU has something to do: it has been marked running
    /// again, or shutdown was requested.
    pub fn wait_while_idle(&self) {
        let mut st = self.state.lock().unwrap();
        while !st.running && !st.exit {
            st = self.cv.wait(st).unwrap();
        }
    }
}
