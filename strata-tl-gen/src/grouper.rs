//! Buckets definitions by namespace so each lands in its own `mod`.

use std::collections::BTreeMap;

use strata_tl_parser::tl::{Category, Definition, Type};

use crate::namegen::is_builtin_boxed;

/// Definitions of `category` keyed by namespace (`""` for the root).
///
/// Constructors of builtin boxed types (`Bool`, `True`, `Vector`) are skipped.
pub(crate) fn group_by_ns(
    defs: &[Definition],
    category: Category,
) -> BTreeMap<String, Vec<&Definition>> {
    let mut map: BTreeMap<String, Vec<&Definition>> = BTreeMap::new();
    for def in defs.iter().filter(|d| d.category == category) {
        if category == Category::Types && is_builtin_boxed(&def.ty) {
            continue;
        }
        let ns = def.namespace.first().cloned().unwrap_or_default();
        map.entry(ns).or_default().push(def);
    }
    for bucket in map.values_mut() {
        bucket.sort_by_key(|d| &d.name);
    }
    map
}

/// Boxed result types of constructors keyed by namespace; one enum each.
pub(crate) fn group_types_by_ns(defs: &[Definition]) -> BTreeMap<Option<String>, Vec<&Type>> {
    let mut map: BTreeMap<Option<String>, Vec<&Type>> = BTreeMap::new();
    for def in defs.iter().filter(|d| d.category == Category::Types) {
        if def.ty.generic_ref || is_builtin_boxed(&def.ty) {
            continue;
        }
        map.entry(def.ty.namespace.first().cloned()).or_default().push(&def.ty);
    }
    for bucket in map.values_mut() {
        bucket.sort_by_key(|t| &t.name);
        bucket.dedup_by_key(|t| &t.name);
    }
    map
}
