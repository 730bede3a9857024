// Introspection of scheduler calls. The *real* scheduler records every call it
// makes, so tests assert against real behaviour, not mocks. Recording is
// compiled out of release builds, only the call descriptions remain.

use crate::task::Id;
#[cfg(test)]
use dashmap::DashMap;
#[cfg(test)]
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Spawn,
    Schedule,
    Poll,
    Release,
    ForcedDrain,
    UnhandledPanic,
}

#[cfg(test)]
const ALL_METHODS: [Method; 6] = [
    Method::Spawn,
    Method::Schedule,
    Method::Poll,
    Method::Release,
    Method::ForcedDrain,
    Method::UnhandledPanic,
];

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Spawn { id: Id, owned: bool },
    Schedule { id: Id },
    Poll { id: Id },
    Release { id: Id },
    ForcedDrain { limit: usize, remaining: usize },
    UnhandledPanic { id: Id },
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

#[cfg(test)]
impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        for method in ALL_METHODS {
            map.insert(method, Vec::new());
        }

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    /// Ids recorded for `method`, in call order.
    pub(crate) fn ids(&self, method: &Method) -> Vec<Id> {
        self.get_calls(method)
            .into_iter()
            .filter_map(|call| match call {
                Call::Spawn { id, .. }
                | Call::Schedule { id }
                | Call::Poll { id }
                | Call::Release { id }
                | Call::UnhandledPanic { id } => Some(id),
                Call::ForcedDrain { .. } => None,
            })
            .collect()
    }
}
