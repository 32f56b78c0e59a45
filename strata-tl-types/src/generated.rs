//! Output of `build.rs`.

include!(concat!(env!("OUT_DIR"), "/generated_common.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_types.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_functions.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_enums.rs"));
