//! Parser for MTProto [Type Language] (TL) schema files.
//!
//! Turns raw `.tl` text into [`Definition`]s that the code generator in
//! `strata-tl-gen` consumes at build time.
//!
//! # Quick start
//!
//! ```rust
//! use strata_tl_parser::parse_tl_file;
//!
//! let src = "pong#347773c5 msg_id:long ping_id:long = Pong;";
//! for def in parse_tl_file(src) {
//!     println!("{:#?}", def.unwrap());
//! }
//! ```
//!
//! [Type Language]: https://core.telegram.org/mtproto/TL

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Parse error types for TL schema parsing.
pub mod errors;
pub mod tl;
mod iterator;
mod utils;

use errors::ParseError;
use tl::Definition;

pub use utils::{canonical_form, tl_id};

/// Parses a complete TL schema, yielding [`Definition`]s one by one.
///
/// `//` starts a comment, either on its own line or after a definition.
/// The `---functions---` and `---types---` markers switch the
/// [`tl::Category`] of the definitions that follow. A definition may span
/// several lines and ends at `;`; input that ends in the middle of one yields
/// [`ParseError::Unterminated`].
pub fn parse_tl_file(contents: &str) -> impl Iterator<Item = Result<Definition, ParseError>> + '_ {
    iterator::TlIterator::new(contents)
}

/// Reads the schema layer from a `// LAYER N` comment, if the file has one.
///
/// ```rust
/// assert_eq!(strata_tl_parser::find_layer("// LAYER 158\nfoo = Bar;"), Some(158));
/// assert_eq!(strata_tl_parser::find_layer("foo = Bar;"), None);
/// ```
pub fn find_layer(contents: &str) -> Option<i32> {
    contents.lines().find_map(|line| {
        line.trim()
            .strip_prefix("//")?
            .trim()
            .strip_prefix("LAYER")?
            .trim()
            .parse()
            .ok()
    })
}
