use tokio::sync::watch;

use crate::types::DirectorGuidance;

/// Read side of the single-slot Director channel. `latest()` never blocks
/// and never waits on an in-flight Director call — it returns whatever the
/// last completed call produced, or the idle default before the first one
/// lands (§4.3).
#[derive(Clone)]
pub struct DirectorHandle {
    rx: watch::Receiver<DirectorGuidance>,
}

impl DirectorHandle {
    pub fn latest(&self) -> DirectorGuidance {
        self.rx.borrow().clone()
    }
}

pub(crate) fn channel() -> (watch::Sender<DirectorGuidance>, DirectorHandle) {
    let (tx, rx) = watch::channel(DirectorGuidance::idle());
    (tx, DirectorHandle { rx })
}
