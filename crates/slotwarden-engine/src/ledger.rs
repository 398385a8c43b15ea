//! Usage counters and last-access metadata.
//!
//! Within the engine these are the only functions that touch `usage_count`
//! and `last_access`.
//! Policy evaluation calls [`record`]; the explicit reset command calls
//! [`reset`].

use slotwarden_core::{LastAccess, Slot};
use slotwarden_device::AccessEvent;

/// Record an evaluated attempt. Returns the new usage count.
pub(crate) fn record(slot: &mut Slot, event: &AccessEvent, granted: bool) -> u32 {
    slot.last_access = Some(LastAccess {
        timestamp: event.timestamp,
        method: event.method,
    });
    if granted {
        slot.usage_count = slot.usage_count.saturating_add(1);
    }
    slot.usage_count
}

pub(crate) fn reset(slot: &mut Slot) {
    slot.usage_count = 0;
}
