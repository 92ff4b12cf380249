use crate::ids::Handle;
use crate::value::Value;

/// The remote object an entity was materialized from and writes back to.
///
/// Read-only sources (query snapshots, register rows read through a
/// selection) cannot be written in place; the save path opens a fresh record
/// manager for them and back-fills unchanged fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSource {
    handle: Handle,
    writable: bool,
}

impl ValueSource {
    pub fn new(handle: Handle, writable: bool) -> Self {
        Self { handle, writable }
    }

    pub fn read_only(handle: Handle) -> Self {
        Self::new(handle, false)
    }

    pub fn backing_handle(&self) -> Handle {
        self.handle
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Per-entity change tracking state.
#[derive(Debug, Clone)]
pub struct Controller {
    is_new: bool,
    track_changes: bool,
    /// Ordered change log; `None` while the entity is clean.
    changed: Option<Vec<(String, Value)>>,
    value_source: Option<ValueSource>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// State of an entity created locally.
    pub fn new() -> Self {
        Self {
            is_new: true,
            track_changes: true,
            changed: None,
            value_source: None,
        }
    }

    /// State of an entity hydrated from a remote object.
    pub fn bound(source: ValueSource) -> Self {
        Self {
            is_new: false,
            track_changes: true,
            changed: None,
            value_source: Some(source),
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        self.changed.is_some()
    }

    pub fn track_changes(&self) -> bool {
        self.track_changes
    }

    /// Returns the previous flag so callers can restore it.
    pub fn set_track_changes(&mut self, track: bool) -> bool {
        std::mem::replace(&mut self.track_changes, track)
    }

    pub fn changed(&self) -> Option<&[(String, Value)]> {
        self.changed.as_deref()
    }

    pub fn is_changed(&self, field: &str) -> bool {
        self.changed
            .as_ref()
            .is_some_and(|log| log.iter().any(|(name, _)| name == field))
    }

    pub fn value_source(&self) -> Option<&ValueSource> {
        self.value_source.as_ref()
    }

    /// Record a field write. Re-recording a field replaces its value but
    /// keeps its original position in the log.
    pub fn record(&mut self, field: &str, value: Value) {
        if !self.track_changes {
            return;
        }
        let log = self.changed.get_or_insert_with(Vec::new);
        match log.iter_mut().find(|(name, _)| name == field) {
            Some(entry) => entry.1 = value,
            None => log.push((field.to_string(), value)),
        }
    }

    pub fn bind(&mut self, source: ValueSource) {
        self.is_new = false;
        self.value_source = Some(source);
    }

    /// Drop pending changes and point the entity at its freshly written
    /// remote object.
    pub fn reset_dirty(&mut self, source: ValueSource) {
        self.changed = None;
        self.bind(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_insertion_order() {
        let mut c = Controller::new();
        c.record("Number", Value::from("A"));
        c.record("Total", Value::Integer(1));
        c.record("Number", Value::from("B"));

        let log = c.changed().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("Number".to_string(), Value::from("B")));
        assert_eq!(log[1].0, "Total");
        assert!(c.is_dirty());
    }

    #[test]
    fn suspended_tracking_ignores_writes() {
        let mut c = Controller::new();
        let previous = c.set_track_changes(false);
        c.record("Id", Value::Null);
        assert!(previous);
        assert!(!c.is_dirty());
        c.set_track_changes(previous);
        assert!(c.track_changes());
    }

    #[test]
    fn reset_dirty_rebinds() {
        let mut c = Controller::new();
        c.record("Code", Value::from("001"));
        let source = ValueSource::new(Handle::from_raw(7), true);
        c.reset_dirty(source);
        assert!(!c.is_dirty());
        assert!(!c.is_new());
        assert_eq!(c.value_source(), Some(&source));
        assert!(!c.is_changed("Code"));
    }
}
