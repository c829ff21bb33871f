//! Delivery-side collaborator seams. Real user storage and the message
//! transport live outside this crate; the watchdog only needs "who gets
//! notified for group G", a ban check, and a best-effort send that may
//! fail. Shipped implementations cover the standalone binary: recipients
//! from config and a transport that writes to the log.

use std::collections::HashSet;
use std::sync::Mutex;

use log::info;

use crate::error::TtPulseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: i64,
    pub blocked: bool,
}

pub trait RecipientDirectory: Send + Sync {
    /// Recipients subscribed to schedule notifications for the group.
    fn eligible_for(&self, group_code: &str) -> Vec<Recipient>;

    fn is_banned(&self, id: i64) -> bool;

    /// Called when delivery to a recipient fails; the recipient stops
    /// receiving notifications until unblocked out of band.
    fn mark_blocked(&self, id: i64);
}

pub trait Transport: Send + Sync {
    fn send_text(&self, user_id: i64, text: &str) -> Result<(), TtPulseError>;
}

/// Fixed recipient list from config, subscribed to every group. Blocks are
/// kept in memory for the lifetime of the process.
pub struct StaticRecipients {
    ids: Vec<i64>,
    blocked: Mutex<HashSet<i64>>,
}

impl StaticRecipients {
    pub fn new(ids: Vec<i64>) -> Self {
        Self {
            ids,
            blocked: Mutex::new(HashSet::new()),
        }
    }
}

impl RecipientDirectory for StaticRecipients {
    fn eligible_for(&self, _group_code: &str) -> Vec<Recipient> {
        let blocked = self.blocked.lock().unwrap();
        self.ids
            .iter()
            .map(|&id| Recipient {
                id,
                blocked: blocked.contains(&id),
            })
            .collect()
    }

    fn is_banned(&self, _id: i64) -> bool {
        false
    }

    fn mark_blocked(&self, id: i64) {
        self.blocked.lock().unwrap().insert(id);
    }
}

/// Writes each notification to the log instead of a chat transport.
pub struct LogTransport;

impl Transport for LogTransport {
    fn send_text(&self, user_id: i64, text: &str) -> Result<(), TtPulseError> {
        info!("notification for {user_id}:\n{text}");
        Ok(())
    }
}
