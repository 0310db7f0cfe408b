// File: supportchat-core/src/unread.rs

use supportchat_common::models::{Audience, ChatSession, SenderRole};

/// Keeps the two per-session unread counters in step with ledger writes
/// and read acknowledgements.
pub struct UnreadTracker;

impl UnreadTracker {
    /// The side that has not seen a message from `role` yet.
    /// Bot and system notices are shown to the customer.
    pub fn audience_for(role: SenderRole) -> Audience {
        match role {
            SenderRole::Customer => Audience::Staff,
            SenderRole::Staff | SenderRole::Bot | SenderRole::System => Audience::Customer,
        }
    }

    pub fn on_append(session: &mut ChatSession, role: SenderRole) {
        match Self::audience_for(role) {
            Audience::Staff => session.unread_for_staff = session.unread_for_staff.saturating_add(1),
            Audience::Customer => {
                session.unread_for_customer = session.unread_for_customer.saturating_add(1)
            }
        }
    }

    /// Resets the audience's counter. Returns false when it was already zero.
    pub fn acknowledge(session: &mut ChatSession, audience: Audience) -> bool {
        let counter = match audience {
            Audience::Staff => &mut session.unread_for_staff,
            Audience::Customer => &mut session.unread_for_customer,
        };
        if *counter == 0 {
            return false;
        }
        *counter = 0;
        true
    }
}
