//! Facts about the whole schema that single definitions cannot answer.

use std::collections::{HashMap, HashSet};

use strata_tl_parser::tl::{Category, Definition, Parameter, ParameterType, Type};

pub(crate) struct Metadata<'a> {
    /// Constructors that contain their own type, directly or transitively.
    /// Their enum variants are boxed.
    recursive_ids: HashSet<u32>,
    defs_by_type: HashMap<String, Vec<&'a Definition>>,
}

fn type_key(ty: &Type) -> String {
    let mut key = ty.namespace.join(".");
    key.push('.');
    key.push_str(&ty.name);
    key
}

impl<'a> Metadata<'a> {
    pub(crate) fn build(defs: &'a [Definition]) -> Self {
        let mut defs_by_type: HashMap<String, Vec<&'a Definition>> = HashMap::new();
        for def in defs.iter().filter(|d| d.category == Category::Types) {
            defs_by_type.entry(type_key(&def.ty)).or_default().push(def);
        }

        let recursive_ids = defs
            .iter()
            .filter(|d| d.category == Category::Types)
            .filter(|d| refers_to(&d.ty, *d, &defs_by_type, &mut HashSet::new()))
            .map(|d| d.id)
            .collect();

        Self { recursive_ids, defs_by_type }
    }

    pub(crate) fn is_recursive(&self, def: &Definition) -> bool {
        self.recursive_ids.contains(&def.id)
    }

    pub(crate) fn defs_for_type(&self, ty: &Type) -> &[&'a Definition] {
        self.defs_by_type
            .get(&type_key(ty))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A `#` field that no optional parameter refers to is always written as 0.
    pub(crate) fn is_unused_flag(def: &Definition, flags: &Parameter) -> bool {
        !def.params.iter().any(|p| {
            matches!(&p.ty, ParameterType::Normal { flag: Some(f), .. } if f.name == flags.name)
        })
    }
}

fn refers_to<'a>(
    target: &Type,
    current: &'a Definition,
    defs_by_type: &HashMap<String, Vec<&'a Definition>>,
    visited: &mut HashSet<u32>,
) -> bool {
    visited.insert(current.id);
    current.params.iter().any(|param| {
        let ParameterType::Normal { ty, .. } = &param.ty else {
            return false;
        };
        let mut ty = ty;
        while let Some(arg) = &ty.generic_arg {
            ty = arg;
        }
        if ty.namespace == target.namespace && ty.name == target.name {
            return true;
        }
        defs_by_type
            .get(&type_key(ty))
            .is_some_and(|subs| {
                subs.iter().any(|sub| {
                    !visited.contains(&sub.id) && refers_to(target, *sub, defs_by_type, visited)
                })
            })
    })
}
