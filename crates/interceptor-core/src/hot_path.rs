use std::sync::{Arc, OnceLock, Weak};

use nix::errno::Errno;

use crate::{Call, Handler, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecoratorKind {
    /// Decide whether to log, then forward
    Intercept,
    /// Reap the calling process, then forward
    Exit,
}

/// Dispatch target installed in place of an operation.
///
/// It keeps its own copy of the replaced target: a call which fetched the
/// decorator from the dispatch table right before a release, or after the
/// registry is gone, is still forwarded to it.
pub(crate) struct Decorator {
    registry: Weak<Registry>,
    op: usize,
    kind: DecoratorKind,
    original: OnceLock<Handler>,
}

impl Decorator {
    /// Returns the decorator and the handler to install in the dispatch table.
    /// The original target must be set right after the swap.
    pub(crate) fn new(registry: Weak<Registry>, op: usize, kind: DecoratorKind) -> (Arc<Self>, Handler) {
        let decorator = Arc::new(Self {
            registry,
            op,
            kind,
            original: OnceLock::new(),
        });
        let handler: Handler = {
            let decorator = decorator.clone();
            Arc::new(move |call: &Call| decorator.call(call))
        };
        (decorator, handler)
    }

    pub(crate) fn set_original(&self, original: Handler) {
        if self.original.set(original).is_err() {
            log::warn!("original target of operation {} already set", self.op);
        }
    }

    fn call(&self, call: &Call) -> i64 {
        let target = self.registry.upgrade().and_then(|registry| match self.kind {
            DecoratorKind::Intercept => registry.decide(self.op, call),
            DecoratorKind::Exit => {
                registry.reap(call.pid);
                None
            }
        });
        match target.or_else(|| self.original.get().cloned()) {
            Some(target) => target(call),
            None => -(Errno::ENOSYS as i64),
        }
    }
}

impl Registry {
    /// Hot path of an intercepted operation.
    ///
    /// Records the call if the caller is monitored and returns the target to
    /// forward it to. `None` means the operation is no longer intercepted.
    pub(crate) fn decide(&self, op: usize, call: &Call) -> Option<Handler> {
        let (target, log) = {
            let locked = self.lock_all();
            let entry = locked.table.entries.get(op)?;
            if !entry.intercepted {
                return None;
            }
            let log = locked
                .sets
                .get(op)
                .is_some_and(|policy| policy.should_log(call.pid));
            (entry.original_target.clone(), log)
        };

        if log {
            self.sink.record(call);
        }
        target
    }
}
