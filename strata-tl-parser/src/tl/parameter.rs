use std::fmt;
use std::str::FromStr;

use crate::errors::ParamParseError;
use crate::tl::ParameterType;

/// One `name:Type` parameter of a definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// The parameter name as written in the schema.
    pub name: String,
    /// Its type, possibly guarded by a flag bit.
    pub ty: ParameterType,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

impl FromStr for Parameter {
    type Err = ParamParseError;

    /// Parses `flags:#`, `msg_id:long` or `token:flags.0?bytes`.
    ///
    /// `{X:Type}` yields [`ParamParseError::TypeDef`] so the caller can record
    /// the generic name.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = token.strip_prefix('{') {
            return Err(match inner.strip_suffix(":Type}") {
                Some(name) => ParamParseError::TypeDef { name: name.into() },
                None => ParamParseError::MissingDef,
            });
        }

        let (name, ty) = token.split_once(':').ok_or(ParamParseError::NotImplemented)?;
        if name.is_empty() || ty.is_empty() {
            return Err(ParamParseError::Empty);
        }
        Ok(Self { name: name.to_owned(), ty: ty.parse()? })
    }
}
