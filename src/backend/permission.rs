//! Host permission negotiation
//!
//! Some hosts require the user to approve access to a USB device. The request
//! is fire-and-forget; the answer arrives later as a host event. This module
//! tracks the single outstanding request and decides what each answer means:
//!
//! - answer for the pending device → granted or denied
//! - answer without a device id (a known host quirk) → the caller refreshes
//!   the catalog and resolves against it with [`PermissionNegotiator::resolve_after_lookup`]
//! - answer for another device → stale, ignored
//!
//! A new request replaces the pending one; nothing is queued and nothing
//! times out.

use crate::types::DeviceId;

/// The device awaiting a permission answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPermission {
    pub device_id: DeviceId,
    /// Baud text captured when connect was requested; re-validated on grant
    pub baud_text: String,
}

/// What a permission-result event means for the pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// No pending request, or the event was for another device
    Ignored,
    /// Proceed to open the device
    Granted(PendingPermission),
    /// The user refused
    Denied(PendingPermission),
    /// The device vanished while we were waiting
    Unavailable(PendingPermission),
    /// The event carried no device id; refresh the catalog and call
    /// [`PermissionNegotiator::resolve_after_lookup`]
    NeedsLookup { device_id: DeviceId, granted: bool },
}

/// State machine for the single pending permission request
#[derive(Debug, Default)]
pub struct PermissionNegotiator {
    pending: Option<PendingPermission>,
}

impl PermissionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingPermission> {
        self.pending.as_ref()
    }

    pub fn is_requesting(&self) -> bool {
        self.pending.is_some()
    }

    /// Start waiting for `device_id`, returning the request it supersedes
    pub fn request(
        &mut self,
        device_id: DeviceId,
        baud_text: impl Into<String>,
    ) -> Option<PendingPermission> {
        let superseded = self.pending.replace(PendingPermission {
            device_id,
            baud_text: baud_text.into(),
        });
        if let Some(old) = &superseded {
            tracing::debug!(
                "Permission request for {} superseded by {}",
                old.device_id,
                device_id
            );
        }
        superseded
    }

    /// Interpret a permission-result event
    pub fn on_result(&mut self, device_id: Option<DeviceId>, granted: bool) -> PermissionOutcome {
        let Some(pending) = &self.pending else {
            tracing::debug!("Permission result with no pending request, ignoring");
            return PermissionOutcome::Ignored;
        };

        match device_id {
            Some(id) if id == pending.device_id => self.resolve(granted),
            Some(id) => {
                tracing::debug!(
                    "Stale permission result for {} (waiting for {}), ignoring",
                    id,
                    pending.device_id
                );
                PermissionOutcome::Ignored
            }
            None => PermissionOutcome::NeedsLookup {
                device_id: pending.device_id,
                granted,
            },
        }
    }

    /// Finish an unattributed result once the catalog has been refreshed
    pub fn resolve_after_lookup(&mut self, granted: bool, still_available: bool) -> PermissionOutcome {
        if self.pending.is_none() {
            return PermissionOutcome::Ignored;
        }
        if !still_available {
            return match self.pending.take() {
                Some(pending) => PermissionOutcome::Unavailable(pending),
                None => PermissionOutcome::Ignored,
            };
        }
        self.resolve(granted)
    }

    /// Drop the pending request
    pub fn clear(&mut self) -> Option<PendingPermission> {
        self.pending.take()
    }

    fn resolve(&mut self, granted: bool) -> PermissionOutcome {
        match self.pending.take() {
            Some(pending) if granted => PermissionOutcome::Granted(pending),
            Some(pending) => PermissionOutcome::Denied(pending),
            None => PermissionOutcome::Ignored,
        }
    }
}
