use core::sync::atomic::{AtomicBool, Ordering};

/// Falling-edge latch shared between the platform interrupt vector and the
/// transport pump.
///
/// The vector only calls [`IrqLatch::signal`]; all bus work happens in the
/// pump. Disarming models detaching the interrupt: edges seen while disarmed
/// are dropped.
#[derive(Debug)]
pub struct IrqLatch {
    armed: AtomicBool,
    pending: AtomicBool,
}

impl IrqLatch {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    /// Records an edge. Safe to call from interrupt context.
    pub fn signal(&self) {
        if self.armed.load(Ordering::Acquire) {
            self.pending.store(true, Ordering::Release);
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Consumes a latched edge.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for IrqLatch {
    fn default() -> Self {
        Self::new()
    }
}
