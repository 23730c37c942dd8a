//! Notification subscriptions of live commands.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::arena::CommandHandle;
use crate::envelope::VerbId;

/// Maps notification verbs to the commands waiting for them.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
    by_verb: Mutex<HashMap<VerbId, BTreeSet<CommandHandle>>>,
}

impl SubscriptionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<VerbId, BTreeSet<CommandHandle>>> {
        self.by_verb.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self, verb: VerbId, owner: CommandHandle) {
        self.lock().entry(verb).or_default().insert(owner);
    }

    pub(crate) fn unsubscribe(&self, verb: &VerbId, owner: CommandHandle) {
        let mut table = self.lock();
        if let Some(owners) = table.get_mut(verb) {
            owners.remove(&owner);
            if owners.is_empty() {
                table.remove(verb);
            }
        }
    }

    pub(crate) fn remove_owner(&self, owner: CommandHandle) {
        self.lock().retain(|_, owners| {
            owners.remove(&owner);
            !owners.is_empty()
        });
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Subscribers of `verb`, in handle order.
    pub(crate) fn subscribers(&self, verb: &VerbId) -> Vec<CommandHandle> {
        self.lock()
            .get(verb)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn is_subscribed(&self, owner: CommandHandle) -> bool {
        self.lock().values().any(|owners| owners.contains(&owner))
    }
}
