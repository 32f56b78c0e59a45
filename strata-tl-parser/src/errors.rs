use std::fmt;
use std::num::ParseIntError;

/// Errors produced while parsing a single parameter token.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamParseError {
    /// An empty string was encountered where a name or type was expected.
    Empty,
    /// A `{X:Type}` generic declaration. Not a failure: the definition parser
    /// records the name and drops the token.
    TypeDef {
        /// The declared generic name, `X` in `{X:Type}`.
        name: String,
    },
    /// A generic or flags field was used without being declared first.
    MissingDef,
    /// A `name.N?Type` flag expression was malformed.
    InvalidFlag,
    /// A `<...>` generic argument was not closed.
    InvalidGeneric,
    /// A bare name with no `:type` (old-style `?` parameters).
    NotImplemented,
}

impl fmt::Display for ParamParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty token"),
            Self::TypeDef { name } => write!(f, "generic type declaration: {name}"),
            Self::MissingDef => write!(f, "use of an undeclared generic or flags field"),
            Self::InvalidFlag => write!(f, "invalid flag expression"),
            Self::InvalidGeneric => write!(f, "unclosed `<` in generic argument"),
            Self::NotImplemented => write!(f, "parameter without `:type` is not supported"),
        }
    }
}

impl std::error::Error for ParamParseError {}

/// Errors produced while parsing a complete TL definition.
#[derive(Debug, PartialEq)]
pub enum ParseError {
    /// The input was blank.
    Empty,
    /// No `= Type` was found.
    MissingType,
    /// The name was missing or had empty namespace components.
    MissingName,
    /// The `#id` hex literal was unparseable.
    InvalidId(ParseIntError),
    /// A parameter was invalid.
    InvalidParam(ParamParseError),
    /// The definition uses syntax this parser does not handle.
    NotImplemented,
    /// The input ended before the definition's closing `;`.
    Unterminated,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty definition"),
            Self::MissingType => write!(f, "missing `= Type`"),
            Self::MissingName => write!(f, "missing or malformed name"),
            Self::InvalidId(e) => write!(f, "invalid constructor id: {e}"),
            Self::InvalidParam(e) => write!(f, "invalid parameter: {e}"),
            Self::NotImplemented => write!(f, "unsupported TL syntax"),
            Self::Unterminated => write!(f, "definition not terminated by `;`"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidId(e) => Some(e),
            Self::InvalidParam(e) => Some(e),
            _ => None,
        }
    }
}
