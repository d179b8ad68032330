//! The generic I/O device contract (§4.7).
//!
//! Every device implements a single operation over `(acc_in, ctl, transfer)`
//! plus whatever teardown `Drop` needs; devices are looked up by id in a
//! `DeviceTable` shared between the CPU and the IOCPU (each with its own
//! table and id space).

use std::fmt;

/// `transfer` values for [`Device::op`].
pub mod transfer {
    /// Highest even input-transfer code (device → accumulator).
    pub const MAX_INPUT: u8 = 12;
    /// Highest odd output-transfer code (accumulator → device).
    pub const MAX_OUTPUT: u8 = 13;
    /// Status query: result's low two bits are `{done, busy}`.
    pub const STATUS: u8 = 14;
}

/// `ctl` values for a status query ([`transfer::STATUS`]).
pub mod status_ctl {
    pub const SKIP_IF_BUSY: u8 = 0;
    pub const SKIP_IF_NOT_BUSY: u8 = 1;
    pub const SKIP_IF_DONE: u8 = 2;
    pub const SKIP_IF_NOT_DONE: u8 = 3;
}

/// `ctl` values for a non-status transfer.
pub mod xfer_ctl {
    pub const NONE: u8 = 0;
    pub const START: u8 = 1;
    pub const STOP: u8 = 2;
}

/// A peripheral reachable through the uniform device contract.
///
/// `transfer` is even and `<= 12` for an input transfer (device data is
/// OR-merged into the caller's accumulator), odd and `<= 13` for an output
/// transfer (the caller's accumulator value is delivered to the device and
/// the return value is ignored), `14` for a status query (the low two
/// result bits are `{done, busy}`), and `15` is reserved.
pub trait Device: Send {
    /// Perform one device operation. See the module docs for `transfer`
    /// and `ctl` semantics.
    fn op(&mut self, acc_in: u64, ctl: u8, transfer: u8) -> u64;
}

/// Raised when an instruction addresses a device id with no registered
/// device (§7: `DEVX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError;

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no device registered at this id")
    }
}

impl std::error::Error for DeviceError {}

/// A table of devices indexed by id, shared between the CPU (up to 4096
/// ids) and the IOCPU (up to 128 ids).
pub struct DeviceTable {
    slots: Vec<Option<Box<dyn Device>>>,
}

impl DeviceTable {
    /// Create an empty table with room for `capacity` device ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Register a device at `id`, replacing whatever was there before.
    pub fn register(&mut self, id: usize, device: Box<dyn Device>) {
        self.slots[id] = Some(device);
    }

    /// Remove (and drop) the device at `id`, if any.
    pub fn unregister(&mut self, id: usize) {
        self.slots[id] = None;
    }

    /// Returns whether a device is registered at `id`.
    #[must_use]
    pub fn is_registered(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(Option::is_some)
    }

    /// Perform an operation against the device at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] if `id` is out of range or has no device
    /// registered.
    pub fn io(&mut self, id: usize, acc_in: u64, ctl: u8, transfer: u8) -> Result<u64, DeviceError> {
        match self.slots.get_mut(id).and_then(Option::as_mut) {
            Some(dev) => Ok(dev.op(acc_in, ctl, transfer)),
            None => Err(DeviceError),
        }
    }

    /// Destroy all registered devices in ascending id order.
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Device for Echo {
        fn op(&mut self, acc_in: u64, _ctl: u8, _transfer: u8) -> u64 {
            acc_in
        }
    }

    #[test]
    fn missing_device_is_devx() {
        let mut table = DeviceTable::new(16);
        assert_eq!(table.io(5, 0, 0, 0), Err(DeviceError));
    }

    #[test]
    fn registered_device_responds() {
        let mut table = DeviceTable::new(16);
        table.register(5, Box::new(Echo));
        assert!(table.is_registered(5));
        assert_eq!(table.io(5, 0o42, 0, 0), Ok(0o42));
    }

    #[test]
    fn unregister_raises_devx_again() {
        let mut table = DeviceTable::new(16);
        table.register(3, Box::new(Echo));
        table.unregister(3);
        assert_eq!(table.io(3, 0, 0, 0), Err(DeviceError));
    }
}
