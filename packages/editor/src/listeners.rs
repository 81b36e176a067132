//! Change-notification callbacks, unsubscribed by handle

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::FlowGraph;

/// Handle returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

pub type GraphListener = Box<dyn Fn(&FlowGraph) + Send + Sync>;

#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    callbacks: BTreeMap<ListenerId, GraphListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: GraphListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.callbacks.insert(id, callback);
        id
    }

    /// Returns false if the handle was already removed
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Call every listener in subscription order
    pub fn notify(&self, graph: &FlowGraph) {
        for callback in self.callbacks.values() {
            callback(graph);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.callbacks.len())
            .finish()
    }
}
