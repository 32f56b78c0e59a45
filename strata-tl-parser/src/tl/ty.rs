use std::fmt;
use std::str::FromStr;

use crate::errors::ParamParseError;

/// The type of a definition or a parameter, e.g. `Vector<long>` or `!X`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    /// Namespace components, `["auth"]` for `auth.LoggedOut`.
    pub namespace: Vec<String>,

    /// The name without its namespace.
    pub name: String,

    /// A lowercase first letter marks a bare type (no constructor id on the wire).
    pub bare: bool,

    /// A reference to a declared generic (`!X`).
    pub generic_ref: bool,

    /// The argument of `Vector<T>` / `vector<T>`.
    pub generic_arg: Option<Box<Type>>,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generic_ref {
            write!(f, "!")?;
        }
        for ns in &self.namespace {
            write!(f, "{ns}.")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(arg) = &self.generic_arg {
            write!(f, "<{arg}>")?;
        }
        Ok(())
    }
}

impl Type {
    pub(crate) fn collect_generic_refs<'a>(&'a self, output: &mut Vec<&'a str>) {
        if self.generic_ref {
            output.push(&self.name);
        }
        if let Some(arg) = &self.generic_arg {
            arg.collect_generic_refs(output);
        }
    }

    /// `true` for the `Vector` and `vector` containers.
    pub fn is_vector(&self) -> bool {
        self.namespace.is_empty() && self.name.eq_ignore_ascii_case("vector")
    }
}

impl FromStr for Type {
    type Err = ParamParseError;

    /// Parses a type expression.
    ///
    /// ```
    /// use strata_tl_parser::tl::Type;
    /// let ty: Type = "Vector<long>".parse().unwrap();
    /// assert!(ty.is_vector());
    /// assert!("!X".parse::<Type>().unwrap().generic_ref);
    /// ```
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (raw, generic_ref) = match raw.strip_prefix('!') {
            Some(r) => (r, true),
            None => (raw, false),
        };

        let (name_part, generic_arg) = match raw.split_once('<') {
            Some((name, rest)) => {
                let arg = rest.strip_suffix('>').ok_or(ParamParseError::InvalidGeneric)?;
                (name, Some(Box::new(Type::from_str(arg)?)))
            }
            None => (raw, None),
        };

        let (namespace, name) = match name_part.rsplit_once('.') {
            Some((ns, n)) => (ns.split('.').map(String::from).collect::<Vec<_>>(), n),
            None => (Vec::new(), name_part),
        };
        if namespace.iter().any(|p| p.is_empty()) {
            return Err(ParamParseError::Empty);
        }

        let first = name.chars().next().ok_or(ParamParseError::Empty)?;
        Ok(Self {
            namespace,
            name: name.to_owned(),
            bare: first.is_ascii_lowercase(),
            generic_ref,
            generic_arg,
        })
    }
}
