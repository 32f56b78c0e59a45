//! Build script: parse the `.tl` schemas selected by Cargo features and
//! generate the Rust types, functions and enums into `OUT_DIR`.

use std::env;
use std::fs;
use std::io;

use strata_tl_gen::{Config, Outputs, generate};
use strata_tl_parser::{find_layer, parse_tl_file, tl::Definition};

fn main() -> io::Result<()> {
    let out_dir = env::var("OUT_DIR").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;

    let schemas = [
        ("tl/api.tl", cfg!(feature = "tl-api")),
        ("tl/mtproto.tl", cfg!(feature = "tl-mtproto")),
    ];

    let mut defs: Vec<Definition> = Vec::new();
    let mut layer = 0;

    for (path, enabled) in schemas {
        println!("cargo:rerun-if-changed={path}");
        if !enabled {
            continue;
        }

        let content = fs::read_to_string(path)?;
        if let Some(n) = find_layer(&content) {
            layer = layer.max(n);
        }
        for result in parse_tl_file(&content) {
            match result {
                Ok(def) => defs.push(def),
                Err(e) => println!("cargo:warning=TL parse error in {path}: {e}"),
            }
        }
    }

    let config = Config {
        layer,
        gen_name_for_id: true,
        deserializable_functions: cfg!(feature = "deserializable-functions"),
        impl_debug: cfg!(feature = "impl-debug"),
        impl_from_type: cfg!(feature = "impl-from-type"),
        impl_from_enum: cfg!(feature = "impl-from-enum"),
    };

    let mut outputs = Outputs::from_dir(&out_dir)?;
    generate(&defs, &config, &mut outputs)?;
    outputs.flush()
}
