use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dirdav_dav::realization::PropertyName;
use dirdav_dav::xml::DAV_NS;

use crate::path::DavPath;

/// DAV: properties computed by the server, they can't be set nor removed
pub const PROTECTED: [&str; 8] = [
    "creationdate",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "lockdiscovery",
    "resourcetype",
    "supportedlock",
];

pub fn is_protected(name: &PropertyName) -> bool {
    name.ns == DAV_NS && PROTECTED.contains(&name.local.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// The value is an XML fragment, replayed verbatim
    Set(PropertyName, String),
    Remove(PropertyName),
}
impl PatchOp {
    pub fn name(&self) -> &PropertyName {
        match self {
            Self::Set(name, _) | Self::Remove(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    Protected,
    FailedDependency,
}

type Props = BTreeMap<PropertyName, String>;

/// Dead properties of every resource, kept in memory
#[derive(Default)]
pub struct PropertyStore {
    props: Mutex<HashMap<DavPath, Props>>,
}

impl PropertyStore {
    fn props(&self) -> MutexGuard<'_, HashMap<DavPath, Props>> {
        self.props.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &DavPath, name: &PropertyName) -> Option<String> {
        self.props().get(path).and_then(|p| p.get(name)).cloned()
    }

    pub fn set(&self, path: &DavPath, name: PropertyName, value: String) {
        self.props()
            .entry(path.clone())
            .or_default()
            .insert(name, value);
    }

    pub fn remove(&self, path: &DavPath, name: &PropertyName) {
        let mut props = self.props();
        if let Some(p) = props.get_mut(path) {
            p.remove(name);
            if p.is_empty() {
                props.remove(path);
            }
        }
    }

    /// Stored property names, ordered by namespace then local name
    pub fn list(&self, path: &DavPath) -> Vec<PropertyName> {
        self.props()
            .get(path)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self, path: &DavPath) -> Vec<(PropertyName, String)> {
        self.props()
            .get(path)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Apply a PROPPATCH: every operation is applied in order, or none is.
    /// The outcome list follows the operation list.
    pub fn patch(&self, path: &DavPath, ops: &[PatchOp]) -> Vec<(PropertyName, PatchOutcome)> {
        if ops.iter().any(|op| is_protected(op.name())) {
            return ops
                .iter()
                .map(|op| {
                    let outcome = match is_protected(op.name()) {
                        true => PatchOutcome::Protected,
                        false => PatchOutcome::FailedDependency,
                    };
                    (op.name().clone(), outcome)
                })
                .collect();
        }

        let mut props = self.props();
        let entry = props.entry(path.clone()).or_default();
        for op in ops {
            match op {
                PatchOp::Set(name, value) => {
                    entry.insert(name.clone(), value.clone());
                }
                PatchOp::Remove(name) => {
                    entry.remove(name);
                }
            }
        }
        if entry.is_empty() {
            props.remove(path);
        }

        ops.iter()
            .map(|op| (op.name().clone(), PatchOutcome::Applied))
            .collect()
    }

    pub fn clear(&self, path: &DavPath) {
        self.props().remove(path);
    }

    /// Forget the properties of `root` and of everything below it
    pub fn remove_tree(&self, root: &DavPath) {
        self.props().retain(|path, _| !root.contains(path));
    }

    /// Duplicate the properties of a subtree, replacing the destination ones
    pub fn copy_tree(&self, from: &DavPath, to: &DavPath) {
        let mut props = self.props();
        props.retain(|path, _| !to.contains(path));
        let copied: Vec<(DavPath, Props)> = props
            .iter()
            .filter_map(|(path, p)| path.rebase(from, to).map(|dest| (dest, p.clone())))
            .collect();
        props.extend(copied);
    }

    pub fn move_tree(&self, from: &DavPath, to: &DavPath) {
        let mut props = self.props();
        props.retain(|path, _| !to.contains(path));
        let moved: Vec<DavPath> = props.keys().filter(|p| from.contains(p)).cloned().collect();
        for path in moved {
            if let (Some(p), Some(dest)) = (props.remove(&path), path.rebase(from, to)) {
                props.insert(dest, p);
            }
        }
    }
}
