//! Typed delta between two structural summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::summary::{
    qualified, Import, MemberDeclaration, StructuralSummary, TypeDeclaration, TypeKind,
    TypeModifiers, Visibility,
};

/// Magnitude tier of a structural delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Minimal,
    Minor,
    Major,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Minimal => write!(f, "minimal"),
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
        }
    }
}

/// Old and new value of a changed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

/// Added/removed/modified names within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<M> {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: BTreeMap<String, M>,
}

impl<M> Default for ChangeSet<M> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            modified: BTreeMap::new(),
        }
    }
}

impl<M> ChangeSet<M> {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }

    /// Count of added plus removed names.
    pub fn churn(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Names added to or removed from a list such as `implements`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ListChanges {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Signature/visibility change of a method, property or function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDelta {
    pub signature: Option<ValueChange<String>>,
    pub visibility: Option<ValueChange<Visibility>>,
}

/// Changes inside a type present on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDelta {
    pub kind: TypeKind,
    pub extends_change: Option<ValueChange<Option<String>>>,
    pub implements_changes: ListChanges,
    pub modifier_change: Option<ValueChange<TypeModifiers>>,
    pub methods_changes: ChangeSet<MemberDelta>,
    pub properties_changes: ChangeSet<MemberDelta>,
}

impl TypeDelta {
    pub fn has_changes(&self) -> bool {
        self.extends_change.is_some()
            || self.implements_changes.has_changes()
            || self.modifier_change.is_some()
            || self.methods_changes.has_changes()
            || self.properties_changes.has_changes()
    }

    /// Inheritance changes make the whole delta major.
    pub fn changes_hierarchy(&self) -> bool {
        self.extends_change.is_some() || self.implements_changes.has_changes()
    }
}

/// Result of [`compare`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuralDelta {
    pub namespace_changed: bool,
    /// All declared types (classes, interfaces, traits).
    pub types: ChangeSet<TypeDelta>,
    /// The interface subset of `types`.
    pub interfaces: ChangeSet<TypeDelta>,
    pub functions: ChangeSet<MemberDelta>,
    pub imports: ChangeSet<ValueChange<Option<String>>>,
    pub severity: Severity,
}

impl StructuralDelta {
    pub fn has_changes(&self) -> bool {
        self.namespace_changed
            || self.types.has_changes()
            || self.interfaces.has_changes()
            || self.functions.has_changes()
            || self.imports.has_changes()
    }

    /// True when any type's `implements` list changed.
    pub fn implements_changed(&self) -> bool {
        self.types
            .modified
            .values()
            .any(|t| t.implements_changes.has_changes())
    }

    /// Names touched by the delta, in symbol-registry form.
    pub fn touched_symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .added
            .iter()
            .chain(&self.types.removed)
            .cloned()
            .collect();
        for (type_name, delta) in &self.types.modified {
            if delta.changes_hierarchy() || delta.modifier_change.is_some() {
                names.push(type_name.clone());
            }
            for set in [&delta.methods_changes, &delta.properties_changes] {
                for member in set.added.iter().chain(&set.removed).chain(set.modified.keys()) {
                    names.push(qualified(type_name, member));
                }
            }
        }
        names.extend(
            self.functions
                .added
                .iter()
                .chain(&self.functions.removed)
                .chain(self.functions.modified.keys())
                .cloned(),
        );
        names
    }

    /// Reject deltas [`compare`] could not have produced.
    pub fn validate(&self) -> Result<(), Error> {
        let expected = self.compute_severity();
        if self.severity != expected {
            return Err(Error::input(format!(
                "severity {} does not match change sets (expected {})",
                self.severity, expected
            )));
        }
        for name in self.interfaces.added.iter().chain(&self.interfaces.removed) {
            let listed = self.types.added.contains(name) || self.types.removed.contains(name);
            if !listed {
                return Err(Error::input(format!(
                    "interface '{}' missing from type change set",
                    name
                )));
            }
        }
        Ok(())
    }

    fn compute_severity(&self) -> Severity {
        let hierarchy = self.types.modified.values().any(TypeDelta::changes_hierarchy);
        if self.namespace_changed
            || self.types.churn() > 0
            || self.interfaces.churn() > 0
            || self.functions.churn() > 0
            || hierarchy
        {
            Severity::Major
        } else if !self.types.modified.is_empty() || !self.functions.modified.is_empty() {
            Severity::Minor
        } else {
            Severity::Minimal
        }
    }
}

/// Compare two summaries.
pub fn compare(old: &StructuralSummary, new: &StructuralSummary) -> StructuralDelta {
    let types = compare_named(&old.types, &new.types, type_key, compare_types);

    let old_interfaces: Vec<TypeDeclaration> = interfaces_of(old);
    let new_interfaces: Vec<TypeDeclaration> = interfaces_of(new);
    let interfaces = compare_named(&old_interfaces, &new_interfaces, type_key, compare_types);

    let functions = compare_named(&old.functions, &new.functions, member_key, compare_members);
    let imports = compare_named(&old.imports, &new.imports, import_key, compare_imports);

    let mut delta = StructuralDelta {
        namespace_changed: old.namespace != new.namespace,
        types,
        interfaces,
        functions,
        imports,
        severity: Severity::Minimal,
    };
    delta.severity = delta.compute_severity();
    delta
}

fn interfaces_of(summary: &StructuralSummary) -> Vec<TypeDeclaration> {
    summary
        .types
        .iter()
        .filter(|t| t.kind == TypeKind::Interface)
        .cloned()
        .collect()
}

/// A kind change (class to trait) reads as remove plus add.
fn type_key(t: &TypeDeclaration) -> String {
    match t.kind {
        TypeKind::Class => t.name.clone(),
        kind => format!("{}#{}", t.name, kind),
    }
}

fn member_key(m: &MemberDeclaration) -> String {
    m.name.clone()
}

fn import_key(i: &Import) -> String {
    i.name.clone()
}

/// Set-difference two declaration lists by key, first occurrence wins.
fn compare_named<T, M>(
    old: &[T],
    new: &[T],
    key: fn(&T) -> String,
    diff: fn(&T, &T) -> Option<M>,
) -> ChangeSet<M> {
    let old_by_key: BTreeMap<String, &T> = first_by_key(old, key);
    let new_by_key: BTreeMap<String, &T> = first_by_key(new, key);
    let display = |k: &str| k.split('#').next().unwrap_or(k).to_string();

    let mut set = ChangeSet::default();
    let mut seen = std::collections::BTreeSet::new();
    for item in new {
        let k = key(item);
        if seen.insert(k.clone()) && !old_by_key.contains_key(&k) {
            set.added.push(display(&k));
        }
    }
    seen.clear();
    for item in old {
        let k = key(item);
        if !seen.insert(k.clone()) {
            continue;
        }
        match new_by_key.get(&k) {
            None => set.removed.push(display(&k)),
            Some(new_item) => {
                if let Some(change) = diff(item, new_item) {
                    set.modified.insert(display(&k), change);
                }
            }
        }
    }
    set
}

fn first_by_key<T>(items: &[T], key: fn(&T) -> String) -> BTreeMap<String, &T> {
    let mut map = BTreeMap::new();
    for item in items {
        map.entry(key(item)).or_insert(item);
    }
    map
}

/// Docblock-only edits are not modifications.
fn compare_members(old: &MemberDeclaration, new: &MemberDeclaration) -> Option<MemberDelta> {
    let signature = (old.signature != new.signature).then(|| ValueChange {
        old: old.signature.clone(),
        new: new.signature.clone(),
    });
    let visibility = (old.visibility != new.visibility).then_some(ValueChange {
        old: old.visibility,
        new: new.visibility,
    });
    if signature.is_none() && visibility.is_none() {
        return None;
    }
    Some(MemberDelta {
        signature,
        visibility,
    })
}

fn compare_imports(old: &Import, new: &Import) -> Option<ValueChange<Option<String>>> {
    (old.alias != new.alias).then(|| ValueChange {
        old: old.alias.clone(),
        new: new.alias.clone(),
    })
}

fn compare_types(old: &TypeDeclaration, new: &TypeDeclaration) -> Option<TypeDelta> {
    let extends_change = (old.extends != new.extends).then(|| ValueChange {
        old: old.extends.clone(),
        new: new.extends.clone(),
    });
    let implements_changes = ListChanges {
        added: new
            .implements
            .iter()
            .filter(|i| !old.implements.contains(i))
            .cloned()
            .collect(),
        removed: old
            .implements
            .iter()
            .filter(|i| !new.implements.contains(i))
            .cloned()
            .collect(),
    };
    let modifier_change = (old.modifiers != new.modifiers).then_some(ValueChange {
        old: old.modifiers,
        new: new.modifiers,
    });

    let delta = TypeDelta {
        kind: new.kind,
        extends_change,
        implements_changes,
        modifier_change,
        methods_changes: compare_named(&old.methods, &new.methods, member_key, compare_members),
        properties_changes: compare_named(
            &old.properties,
            &new.properties,
            member_key,
            compare_members,
        ),
    };
    delta.has_changes().then_some(delta)
}
