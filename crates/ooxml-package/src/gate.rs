use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

/// Serializes watcher-triggered reloads of one package.
///
/// A trigger that arrives while a reload is running is dropped rather than queued, and a
/// trigger whose archive modification time matches the last one seen is ignored.
#[derive(Debug, Default)]
pub struct ReloadGate {
    busy: AtomicBool,
    last_modified: Mutex<Option<SystemTime>>,
}

/// Proof that a reload is in progress; dropping it reopens the gate.
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the ticket is dropped"]
pub struct ReloadTicket<'a> {
    gate: &'a ReloadGate,
}

impl Drop for ReloadTicket<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

impl ReloadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate for a reload of an archive last modified at `modified`.
    ///
    /// Returns `None` when the timestamp was already seen or another reload holds the gate.
    /// A `None` timestamp (metadata unavailable) always counts as a change.
    pub fn try_begin(&self, modified: Option<SystemTime>) -> Option<ReloadTicket<'_>> {
        if modified.is_some() && self.last_seen() == modified {
            log::trace!("archive timestamp unchanged, skipping reload");
            return None;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("reload already in progress, dropping trigger");
            return None;
        }
        self.observe(modified);
        Some(ReloadTicket { gate: self })
    }

    /// Record `modified` as seen, e.g. after the engine wrote the archive itself.
    pub fn observe(&self, modified: Option<SystemTime>) {
        if let Ok(mut last) = self.last_modified.lock() {
            *last = modified;
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn last_seen(&self) -> Option<SystemTime> {
        self.last_modified.lock().ok().and_then(|last| *last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn concurrent_trigger_is_dropped() {
        let gate = ReloadGate::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let t1 = t0 + Duration::from_secs(1);

        let ticket = gate.try_begin(Some(t0)).unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_begin(Some(t1)).is_none());
        drop(ticket);

        assert!(!gate.is_busy());
        assert!(gate.try_begin(Some(t1)).is_some());
    }

    #[test]
    fn unchanged_timestamp_is_ignored() {
        let gate = ReloadGate::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);

        drop(gate.try_begin(Some(t0)).unwrap());
        assert!(gate.try_begin(Some(t0)).is_none());

        gate.observe(Some(t0 + Duration::from_secs(5)));
        assert!(gate.try_begin(Some(t0 + Duration::from_secs(5))).is_none());
    }

    #[test]
    fn missing_timestamp_always_reloads() {
        let gate = ReloadGate::new();
        drop(gate.try_begin(None).unwrap());
        assert!(gate.try_begin(None).is_some());
    }
}
