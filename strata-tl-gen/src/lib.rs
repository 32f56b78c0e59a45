//! Build-time code generator that turns a parsed TL schema into Rust source.
//!
//! Meant to be driven from a `build.rs`:
//!
//! ```no_run
//! use strata_tl_gen::{Config, Outputs, generate};
//! use strata_tl_parser::{find_layer, parse_tl_file};
//!
//! let schema = std::fs::read_to_string("tl/api.tl").unwrap();
//! let defs: Vec<_> = parse_tl_file(&schema).filter_map(Result::ok).collect();
//!
//! let config = Config { layer: find_layer(&schema).unwrap_or(0), ..Config::default() };
//! let mut outputs = Outputs::from_dir(std::env::var("OUT_DIR").unwrap()).unwrap();
//! generate(&defs, &config, &mut outputs).unwrap();
//! outputs.flush().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod grouper;
mod metadata;
mod namegen;
pub mod codegen;

pub use codegen::{Config, Outputs, generate};
