//! Lineage tracking for produced data objects.
//!
//! While inlining fulfiller graphs the composer learns which data objects
//! the run will produce and which objects they depend on. The tracker
//! accumulates both across nesting levels, de-duplicated by name, and
//! exposes the final sets for the data-instance gateway's upload payload.
//!
//! Names are held behind shared handles: namespacing renames an object
//! after it may already appear in recorded arguments or relation edges,
//! and a rename through the handle reaches every holder at once. The
//! composer is single-threaded per render, so `Rc<RefCell<_>>` is the
//! whole story.

use std::cell::RefCell;
use std::rc::Rc;

use tapestry_types::{OutputInstance, OutputInstanceRelation, TypeRef};

/// Shared, renameable name of a tracked data object.
#[derive(Debug, Clone)]
pub struct InstanceHandle(Rc<RefCell<String>>);

impl InstanceHandle {
    fn new(name: &str) -> Self {
        InstanceHandle(Rc::new(RefCell::new(name.to_string())))
    }

    /// Current name; renames are visible through every clone.
    pub fn name(&self) -> String {
        self.0.borrow().clone()
    }

    fn set(&self, name: &str) {
        *self.0.borrow_mut() = name.to_string();
    }
}

struct TrackedOutput {
    handle: InstanceHandle,
    type_ref: TypeRef,
    backend: Option<String>,
}

/// Accumulates produced data objects and their dependency edges.
#[derive(Default)]
pub struct OutputInstanceTracker {
    registry: Vec<InstanceHandle>,
    tracked: Vec<TrackedOutput>,
    relations: Vec<(InstanceHandle, InstanceHandle)>,
}

impl OutputInstanceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        OutputInstanceTracker::default()
    }

    /// Registers a name, de-duplicated: the first registration wins and
    /// later calls with the same name return the existing handle. The
    /// boolean reports whether the handle is new.
    pub fn register(&mut self, name: &str) -> (InstanceHandle, bool) {
        if let Some(existing) = self.find(name) {
            return (existing, false);
        }
        let handle = InstanceHandle::new(name);
        self.registry.push(handle.clone());
        (handle, true)
    }

    /// Looks up a handle by its current name.
    pub fn find(&self, name: &str) -> Option<InstanceHandle> {
        self.registry.iter().find(|handle| *handle.0.borrow() == name).cloned()
    }

    /// Renames a registered object; every holder of its handle observes the
    /// new name. Returns false when no object carries `old`.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self.find(old) {
            Some(handle) => {
                handle.set(new);
                true
            }
            None => false,
        }
    }

    /// Marks a registered object as an output of the run, with its declared
    /// type and optional backend designation.
    pub fn track_output(&mut self, handle: &InstanceHandle, type_ref: TypeRef, backend: Option<String>) {
        self.tracked.push(TrackedOutput {
            handle: handle.clone(),
            type_ref,
            backend,
        });
    }

    /// Records one producer→dependency edge. Endpoints are expected to come
    /// from [`register`](Self::register), which keeps them de-duplicated.
    pub fn register_relation(&mut self, from: &InstanceHandle, to: &InstanceHandle) {
        self.relations.push((from.clone(), to.clone()));
    }

    /// True when nothing would be uploaded.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty() && self.relations.is_empty()
    }

    /// Final instance and relation sets for the upload payload, with all
    /// renames applied.
    pub fn snapshot(&self) -> (Vec<OutputInstance>, Vec<OutputInstanceRelation>) {
        let instances = self
            .tracked
            .iter()
            .map(|output| OutputInstance {
                name: output.handle.name(),
                type_ref: output.type_ref.clone(),
                backend: output.backend.clone(),
            })
            .collect();

        let relations = self
            .relations
            .iter()
            .map(|(from, to)| OutputInstanceRelation {
                from: from.name(),
                to: to.name(),
            })
            .collect();

        (instances, relations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_ref(path: &str) -> TypeRef {
        TypeRef {
            path: path.to_string(),
            revision: Some("0.1.0".to_string()),
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut tracker = OutputInstanceTracker::new();
        let (first, is_new) = tracker.register("postgresql");
        assert!(is_new);

        let (second, is_new) = tracker.register("postgresql");
        assert!(!is_new);
        assert_eq!(first.name(), second.name());

        first.set("renamed");
        assert_eq!(second.name(), "renamed");
    }

    #[test]
    fn rename_reaches_recorded_relations() {
        let mut tracker = OutputInstanceTracker::new();
        let (outer, _) = tracker.register("outer");
        let (inner, _) = tracker.register("inner");
        tracker.track_output(&outer, type_ref("cap.type.outer"), None);
        tracker.register_relation(&outer, &inner);

        assert!(tracker.rename("inner", "prefix-inner"));

        let (instances, relations) = tracker.snapshot();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "outer");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].from, "outer");
        assert_eq!(relations[0].to, "prefix-inner");
    }

    #[test]
    fn rename_of_unknown_name_reports_false() {
        let mut tracker = OutputInstanceTracker::new();
        assert!(!tracker.rename("ghost", "still-a-ghost"));
    }

    #[test]
    fn registration_after_rename_sees_the_new_name() {
        let mut tracker = OutputInstanceTracker::new();
        let (handle, _) = tracker.register("config");
        tracker.rename("config", "app-config");

        let (again, is_new) = tracker.register("app-config");
        assert!(!is_new);
        assert_eq!(again.name(), handle.name());

        // the old name is free again
        let (_, is_new) = tracker.register("config");
        assert!(is_new);
    }

    #[test]
    fn snapshot_keeps_registration_order_and_backends() {
        let mut tracker = OutputInstanceTracker::new();
        let (first, _) = tracker.register("first");
        let (second, _) = tracker.register("second");
        tracker.track_output(&first, type_ref("cap.type.first"), None);
        tracker.track_output(&second, type_ref("cap.type.second"), Some("vault".to_string()));

        let (instances, _) = tracker.snapshot();
        assert_eq!(instances[0].name, "first");
        assert_eq!(instances[1].name, "second");
        assert_eq!(instances[1].backend.as_deref(), Some("vault"));
    }

    #[test]
    fn is_empty_tracks_uploadable_state() {
        let mut tracker = OutputInstanceTracker::new();
        assert!(tracker.is_empty());

        let (handle, _) = tracker.register("only-registered");
        assert!(tracker.is_empty());

        tracker.track_output(&handle, type_ref("cap.type.x"), None);
        assert!(!tracker.is_empty());
    }
}
