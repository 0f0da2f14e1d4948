//! Secure-acknowledgement retry queue.
//!
//! Occupancy reports are fire-and-forget unless the secure-ack feature is
//! enabled, in which case each report stays in a bounded pool until the host
//! echoes it back as a mirrored confirmation. Unconfirmed reports are
//! retransmitted on a timeout, a bounded number of times, then silently
//! given up - the pool never grows and never blocks.

use tracing::debug;

use crate::protocol::{Message, MessageType};

/// Number of in-flight report slots.
pub const MAX_PENDING: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Pending {
    active: bool,
    message: Message,
    sent_at: u32,
    retries: u8,
}

/// Bounded pool of reports awaiting mirrored confirmation.
#[derive(Debug)]
pub struct SecureAckQueue {
    slots: [Option<Pending>; MAX_PENDING],
    timeout_ms: u32,
    max_retries: u8,
}

impl SecureAckQueue {
    /// Create an empty pool with the given retransmission policy.
    #[must_use]
    pub fn new(timeout_ms: u32, max_retries: u8) -> Self {
        Self {
            slots: [None; MAX_PENDING],
            timeout_ms,
            max_retries,
        }
    }

    /// Track a report about to be transmitted.
    ///
    /// Returns `false` when every slot is occupied; the caller must then
    /// drop the report, transmission included. The pool never grows and
    /// never downgrades a report to unsupervised delivery.
    pub fn enqueue(&mut self, message: Message, now: u32) -> bool {
        for slot in &mut self.slots {
            if slot.as_ref().is_none_or(|p| !p.active) {
                *slot = Some(Pending {
                    active: true,
                    message,
                    sent_at: now,
                    retries: 0,
                });
                return true;
            }
        }
        debug!(msg_type = message.type_byte(), "secure-ack pool full");
        false
    }

    /// Confirm a report from a mirrored message.
    ///
    /// Deactivates the first active entry whose report type matches the
    /// mirror and whose first payload byte equals `key`. First match wins;
    /// duplicate keys are not disambiguated further.
    pub fn acknowledge(&mut self, mirror: MessageType, key: u8) {
        let Some(report) = mirror.mirrored_report() else {
            return;
        };
        for slot in self.slots.iter_mut().flatten() {
            if slot.active
                && slot.message.type_byte() == report.as_u8()
                && slot.message.payload().first() == Some(&key)
            {
                slot.active = false;
                return;
            }
        }
    }

    /// Time-based maintenance.
    ///
    /// For every entry whose timeout elapsed: retransmit through `resend`
    /// while retries remain, otherwise deactivate silently. Elapsed time
    /// uses wrapping arithmetic so a rolling 32-bit millisecond clock is
    /// safe across wraparound.
    pub fn tick(&mut self, now: u32, mut resend: impl FnMut(&Message)) {
        for slot in self.slots.iter_mut().flatten() {
            if !slot.active || now.wrapping_sub(slot.sent_at) <= self.timeout_ms {
                continue;
            }
            if slot.retries < self.max_retries {
                slot.retries += 1;
                slot.sent_at = now;
                debug!(
                    msg_type = slot.message.type_byte(),
                    retry = slot.retries,
                    "retransmitting unconfirmed report"
                );
                resend(&slot.message);
            } else {
                slot.active = false;
                debug!(
                    msg_type = slot.message.type_byte(),
                    "giving up on unconfirmed report"
                );
            }
        }
    }

    /// Number of active entries.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.active)
            .count()
    }
}
