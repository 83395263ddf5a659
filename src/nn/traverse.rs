//! Walking the module tree and slicing flattened mappings.

use super::error::{ModuleError, ModuleResult};
use super::module::{Module, ModuleCore, SEPARATOR};
use super::parameter::Parameter;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Joins a path prefix and a local name.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{name}")
    }
}

struct Visit<'a> {
    path: String,
    module: &'a dyn Module,
    emit: bool,
    expand: bool,
}

/// Pre-order iterator over `(path, component)` pairs.
///
/// Children are visited in registration order; absent child slots are
/// skipped. Uses an explicit stack, so depth is bounded by memory only.
pub struct NamedModules<'a> {
    stack: Vec<Visit<'a>>,
    include_children: bool,
}

impl<'a> NamedModules<'a> {
    pub fn new(root: &'a dyn Module, prefix: &str, include_self: bool, include_children: bool) -> Self {
        let root = Visit { path: prefix.to_string(), module: root, emit: include_self, expand: true };
        Self { stack: vec![root], include_children }
    }
}

impl<'a> Iterator for NamedModules<'a> {
    type Item = (String, &'a dyn Module);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(visit) = self.stack.pop() {
            if visit.expand {
                let children: Vec<(&'a str, &'a dyn Module)> = visit
                    .module
                    .core()
                    .children()
                    .filter_map(|(name, child)| child.map(|c| (name, c)))
                    .collect();
                for (name, child) in children.into_iter().rev() {
                    self.stack.push(Visit {
                        path: join(&visit.path, name),
                        module: child,
                        emit: true,
                        expand: self.include_children,
                    });
                }
            }
            if visit.emit {
                return Some((visit.path, visit.module));
            }
        }
        None
    }
}

/// `(path, member)` pairs gathered from `root` (and its descendants when
/// `recursive`) with `select`, which lists one component's own members.
pub fn named_members<'a, T, I, F>(
    root: &'a dyn Module,
    prefix: &str,
    recursive: bool,
    select: F,
) -> impl Iterator<Item = (String, T)> + 'a
where
    F: Fn(&'a ModuleCore) -> I + 'a,
    I: Iterator<Item = (&'a str, T)> + 'a,
    T: 'a,
{
    NamedModules::new(root, prefix, true, recursive).flat_map(move |(path, module)| {
        select(module.core()).map(move |(name, member)| (join(&path, name), member))
    })
}

/// Keeps the first path of each distinct parameter box.
pub fn dedup_by_identity<'a>(
    members: impl Iterator<Item = (String, &'a Parameter)>,
) -> impl Iterator<Item = (String, &'a Parameter)> {
    let mut seen = HashSet::new();
    members.filter(move |(_, parameter)| seen.insert(parameter.addr()))
}

/// Entry `name` of a flattened mapping handed to a forward method.
pub fn member<'a, V>(members: &'a IndexMap<String, V>, kind: &'static str, name: &str) -> ModuleResult<&'a V> {
    members
        .get(name)
        .ok_or_else(|| ModuleError::NotFound { kind, name: name.to_string() })
}

/// The sub-mapping under `prefix`, with the `prefix.` part stripped.
///
/// This is how a composite hands each child its own slice of the flattened
/// parameters or buffers: `decompose(params, "encoder")` turns
/// `"encoder.linear.weight"` into `"linear.weight"`. An empty prefix returns
/// the whole mapping.
pub fn decompose<V: Clone>(members: &IndexMap<String, V>, prefix: &str) -> IndexMap<String, V> {
    if prefix.is_empty() {
        return members.clone();
    }
    let head = format!("{prefix}{SEPARATOR}");
    members
        .iter()
        .filter_map(|(name, value)| name.strip_prefix(&head).map(|rest| (rest.to_string(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_empty_prefix() {
        assert_eq!(join("", "w"), "w");
        assert_eq!(join("a.b", "w"), "a.b.w");
    }

    #[test]
    fn decompose_strips_the_prefix_and_dot() {
        let mut m = IndexMap::new();
        m.insert("enc.w".to_string(), 1);
        m.insert("enc.inner.b".to_string(), 2);
        m.insert("encoder.w".to_string(), 3);
        m.insert("w".to_string(), 4);

        let sub = decompose(&m, "enc");
        assert_eq!(sub.keys().collect::<Vec<_>>(), vec!["w", "inner.b"]);
        assert_eq!(sub["inner.b"], 2);
        assert_eq!(decompose(&m, "").len(), 4);
        assert!(decompose(&m, "missing").is_empty());
    }
}
