use std::fmt;
use std::str::FromStr;

use crate::errors::ParamParseError;
use crate::tl::{Flag, Type};

/// The kind of a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// A `name:#` bit field, computed from the optional parameters when
    /// serializing.
    Flags,

    /// A typed parameter, present only when `flag` is set if there is one.
    Normal {
        /// The parameter's type.
        ty: Type,
        /// The guarding flag bit, if any.
        flag: Option<Flag>,
    },
}

impl ParameterType {
    /// `true` for `flags.N?true`, which occupies no bytes on the wire.
    pub fn is_flag_only(&self) -> bool {
        matches!(self, Self::Normal { ty, flag: Some(_) } if ty.name == "true")
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags => write!(f, "#"),
            Self::Normal { ty, flag } => {
                if let Some(fl) = flag {
                    write!(f, "{}.{}?", fl.name, fl.index)?;
                }
                write!(f, "{ty}")
            }
        }
    }
}

impl FromStr for ParameterType {
    type Err = ParamParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "#" {
            return Ok(Self::Flags);
        }

        let Some((flag_part, ty_part)) = s.split_once('?') else {
            return Ok(Self::Normal { ty: s.parse()?, flag: None });
        };

        let (name, index) = flag_part.split_once('.').ok_or(ParamParseError::InvalidFlag)?;
        if name.is_empty() || ty_part.contains('?') {
            return Err(ParamParseError::InvalidFlag);
        }
        let index = index.parse::<u32>().map_err(|_| ParamParseError::InvalidFlag)?;
        if index >= 32 {
            return Err(ParamParseError::InvalidFlag);
        }

        Ok(Self::Normal {
            ty: ty_part.parse()?,
            flag: Some(Flag { name: name.to_owned(), index }),
        })
    }
}
