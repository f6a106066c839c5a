/// Reports the lock state of the device.
///
/// Keys are created with an unlocked-device requirement, so the bridge refuses to create or
/// use them while the device is locked.
#[uniffi::export(with_foreign)]
pub trait DeviceStateGuard: Send + Sync {
    /// Returns `true` if the device is currently locked.
    fn is_locked(&self) -> bool;
}
