use std::fmt;
use std::str::FromStr;

use crate::errors::{ParamParseError, ParseError};
use crate::tl::{Category, Flag, Parameter, ParameterType, Type};
use crate::utils::tl_id;

/// A single TL definition: a constructor or a function.
///
/// ```text
/// rpc_error#2144ca19 error_code:int error_message:string = RpcError;
/// ```
/// parses into `name = "rpc_error"`, `id = 0x2144ca19`, two parameters and
/// `ty = RpcError`.
#[derive(Clone, Debug, PartialEq)]
pub struct Definition {
    /// Namespace parts, empty in the global namespace.
    pub namespace: Vec<String>,

    /// The name without its namespace (`"getNearestDc"`).
    pub name: String,

    /// Constructor id, from `#XXXXXXXX` or derived with [`crate::tl_id`].
    pub id: u32,

    /// Parameters in wire order. `{X:Type}` declarations are not included.
    pub params: Vec<Parameter>,

    /// The boxed type this definition produces.
    pub ty: Type,

    /// Whether this is a data constructor or an RPC function.
    pub category: Category,
}

impl Definition {
    /// Returns `namespace.name` joined with dots.
    pub fn full_name(&self) -> String {
        let mut s = String::with_capacity(
            self.namespace.iter().map(|ns| ns.len() + 1).sum::<usize>() + self.name.len(),
        );
        for ns in &self.namespace {
            s.push_str(ns);
            s.push('.');
        }
        s.push_str(&self.name);
        s
    }

    /// Names of the generic parameters used by this definition, sorted.
    pub fn generic_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for p in &self.params {
            if let ParameterType::Normal { ty, .. } = &p.ty {
                ty.collect_generic_refs(&mut names);
            }
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// `true` when the definition declares `{X:Type}`.
    pub fn is_generic(&self) -> bool {
        !self.generic_names().is_empty()
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:08x}", self.full_name(), self.id)?;
        for g in self.generic_names() {
            write!(f, " {{{g}:Type}}")?;
        }
        for p in &self.params {
            write!(f, " {p}")?;
        }
        write!(f, " = {}", self.ty)
    }
}

fn split_namespace(full: &str) -> (Vec<String>, &str) {
    match full.rsplit_once('.') {
        Some((ns, name)) => (ns.split('.').map(String::from).collect(), name),
        None => (Vec::new(), full),
    }
}

impl FromStr for Definition {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let (lhs, ty_str) = raw.split_once('=').ok_or(ParseError::MissingType)?;
        let ty_str = ty_str.trim().trim_end_matches(';').trim();
        if ty_str.is_empty() {
            return Err(ParseError::MissingType);
        }
        let mut ty = Type::from_str(ty_str).map_err(|_| ParseError::MissingType)?;

        let mut tokens = lhs.split_whitespace();
        let head = tokens.next().ok_or(ParseError::MissingName)?;
        let (full_name, explicit_id) = match head.split_once('#') {
            Some((n, id)) => (n, Some(id)),
            None => (head, None),
        };

        let (namespace, name) = split_namespace(full_name);
        if namespace.iter().any(|p| p.is_empty()) || name.is_empty() {
            return Err(ParseError::MissingName);
        }

        let id = match explicit_id {
            Some(hex) => u32::from_str_radix(hex, 16).map_err(ParseError::InvalidId)?,
            None => tl_id(raw),
        };

        let mut generics: Vec<String> = Vec::new();
        let mut flag_fields: Vec<String> = Vec::new();
        let mut params = Vec::new();

        for token in tokens {
            let param = match Parameter::from_str(token) {
                Ok(p) => p,
                Err(ParamParseError::TypeDef { name }) => {
                    generics.push(name);
                    continue;
                }
                Err(ParamParseError::NotImplemented) => return Err(ParseError::NotImplemented),
                Err(e) => return Err(ParseError::InvalidParam(e)),
            };

            match &param.ty {
                ParameterType::Flags => flag_fields.push(param.name.clone()),
                ParameterType::Normal { ty, flag } => {
                    let undeclared_generic = ty.generic_ref && !generics.contains(&ty.name);
                    let undeclared_flags = matches!(
                        flag,
                        Some(Flag { name, .. }) if !flag_fields.contains(name)
                    );
                    if undeclared_generic || undeclared_flags {
                        return Err(ParseError::InvalidParam(ParamParseError::MissingDef));
                    }
                }
            }
            params.push(param);
        }

        if generics.contains(&ty.name) {
            ty.generic_ref = true;
        }

        Ok(Definition {
            namespace,
            name: name.to_owned(),
            id,
            params,
            ty,
            // set by the iterator from the current section
            category: Category::Types,
        })
    }
}
