//! Scoped hardware sessions

use std::ops::{Deref, DerefMut};

/// An open connection to a signing device
pub trait Device {
    /// Release the connection; called exactly once per opened session
    fn close(&mut self);
}

/// Owns an open device connection and closes it when dropped
///
/// Every signing operation opens one of these right before use, so the
/// device is released on success, on address mismatch and on any error
/// propagated with `?`.
pub struct DeviceSession<D: Device + ?Sized> {
    device: Box<D>,
    backend: &'static str,
}

impl<D: Device + ?Sized> DeviceSession<D> {
    pub fn new(device: Box<D>, backend: &'static str) -> Self {
        log::debug!("Opened {} session", backend);
        Self { device, backend }
    }
}

impl<D: Device + ?Sized> Deref for DeviceSession<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: Device + ?Sized> DerefMut for DeviceSession<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: Device + ?Sized> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        self.device.close();
        log::debug!("Closed {} session", self.backend);
    }
}
