//! The public code-generation API.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use strata_tl_parser::tl::{Category, Definition, Parameter, ParameterType, Type};

use crate::grouper;
use crate::metadata::Metadata;
use crate::namegen as n;

/// Generation options. `strata-tl-types` maps its Cargo features onto these.
#[derive(Clone, Debug)]
pub struct Config {
    /// Value of the generated `LAYER` constant.
    pub layer: i32,
    /// Emit `name_for_id(id) -> Option<&'static str>`.
    pub gen_name_for_id: bool,
    /// Also implement `Deserializable` for functions (server side).
    pub deserializable_functions: bool,
    /// Derive `Debug` on all generated types.
    pub impl_debug: bool,
    /// Emit `From<types::Foo> for enums::Bar`.
    pub impl_from_type: bool,
    /// Emit `TryFrom<enums::Bar> for types::Foo`.
    pub impl_from_enum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layer: 0,
            gen_name_for_id: true,
            deserializable_functions: false,
            impl_debug: true,
            impl_from_type: true,
            impl_from_enum: true,
        }
    }
}

/// Writers for each generated Rust module.
pub struct Outputs<W: Write> {
    /// `LAYER` and `name_for_id`.
    pub common: W,
    /// `pub mod types`: one struct per constructor.
    pub types: W,
    /// `pub mod functions`: one struct per RPC function.
    pub functions: W,
    /// `pub mod enums`: one enum per boxed type.
    pub enums: W,
}

impl Outputs<File> {
    /// Creates `generated_{common,types,functions,enums}.rs` inside `out_dir`.
    pub fn from_dir(out_dir: impl AsRef<Path>) -> io::Result<Self> {
        let p = out_dir.as_ref();
        Ok(Self {
            common: File::create(p.join("generated_common.rs"))?,
            types: File::create(p.join("generated_types.rs"))?,
            functions: File::create(p.join("generated_functions.rs"))?,
            enums: File::create(p.join("generated_enums.rs"))?,
        })
    }
}

impl<W: Write> Outputs<W> {
    /// Flush all writers.
    pub fn flush(&mut self) -> io::Result<()> {
        self.common.flush()?;
        self.types.flush()?;
        self.functions.flush()?;
        self.enums.flush()
    }
}

/// Generates Rust source for `defs` into `outputs`.
///
/// Call [`Outputs::flush`] afterwards.
pub fn generate<W: Write>(
    defs: &[Definition],
    config: &Config,
    outputs: &mut Outputs<W>,
) -> io::Result<()> {
    let meta = Metadata::build(defs);

    write_common(defs, config, &mut outputs.common)?;
    Emitter { out: &mut outputs.types, config, meta: &meta }.types_mod(defs)?;
    Emitter { out: &mut outputs.functions, config, meta: &meta }.functions_mod(defs)?;
    Emitter { out: &mut outputs.enums, config, meta: &meta }.enums_mod(defs)
}

const HEADER: &str = "// @generated by strata-tl-gen. Do not edit.";

const IMPORTS: &str = "use crate::{Deserializable, Identifiable, Serializable};";

fn write_common<W: Write>(defs: &[Definition], config: &Config, out: &mut W) -> io::Result<()> {
    writeln!(out, "{HEADER}")?;
    writeln!(out)?;
    writeln!(out, "/// The schema layer the types were generated from.")?;
    writeln!(out, "pub const LAYER: i32 = {};", config.layer)?;

    if config.gen_name_for_id {
        let mut sorted: Vec<&Definition> = defs.iter().collect();
        sorted.sort_by_key(|d| d.id);
        sorted.dedup_by_key(|d| d.id);

        writeln!(out)?;
        writeln!(out, "/// Schema name of a constructor or function id.")?;
        writeln!(out, "pub fn name_for_id(id: u32) -> Option<&'static str> {{")?;
        writeln!(out, "    match id {{")?;
        for def in sorted {
            writeln!(out, "        {:#010x} => Some(\"{}\"),", def.id, def.full_name())?;
        }
        writeln!(out, "        _ => None,")?;
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
    }
    Ok(())
}

/// `<X>` / `<X: Bound>` for generic definitions, empty otherwise.
fn generic_list(def: &Definition, bound: &str) -> String {
    let names = def.generic_names();
    if names.is_empty() {
        return String::new();
    }
    let items: Vec<String> = names.iter().map(|g| format!("{g}{bound}")).collect();
    format!("<{}>", items.join(", "))
}

struct Emitter<'c, W: Write> {
    out: &'c mut W,
    config: &'c Config,
    meta: &'c Metadata<'c>,
}

impl<W: Write> Emitter<'_, W> {
    fn open_mod(&mut self, name: &str, indent: &str) -> io::Result<()> {
        writeln!(self.out, "{}pub mod {name} {{", &indent[4..])?;
        writeln!(self.out, "{indent}#[allow(unused_imports)]")?;
        writeln!(self.out, "{indent}{IMPORTS}")
    }

    fn namespaced<F>(&mut self, root: &str, keys: Vec<Option<String>>, mut body: F) -> io::Result<()>
    where
        F: FnMut(&mut Self, Option<&str>, &str) -> io::Result<()>,
    {
        writeln!(self.out, "{HEADER}")?;
        self.open_mod(root, "    ")?;
        for key in keys {
            match key.as_deref() {
                None | Some("") => body(self, None, "    ")?,
                Some(ns) => {
                    self.open_mod(ns, "        ")?;
                    body(self, Some(ns), "        ")?;
                    writeln!(self.out, "    }}")?;
                }
            }
        }
        writeln!(self.out, "}}")
    }

    fn types_mod(&mut self, defs: &[Definition]) -> io::Result<()> {
        let grouped = grouper::group_by_ns(defs, Category::Types);
        let keys = grouped.keys().map(|k| Some(k.clone())).collect();
        self.namespaced("types", keys, |e, ns, indent| {
            for def in &grouped[ns.unwrap_or("")] {
                e.write_struct(indent, def)?;
                e.write_identifiable(indent, def)?;
                e.write_serializable(indent, def)?;
                e.write_deserializable(indent, def)?;
            }
            Ok(())
        })
    }

    fn functions_mod(&mut self, defs: &[Definition]) -> io::Result<()> {
        let grouped = grouper::group_by_ns(defs, Category::Functions);
        let keys = grouped.keys().map(|k| Some(k.clone())).collect();
        self.namespaced("functions", keys, |e, ns, indent| {
            for def in &grouped[ns.unwrap_or("")] {
                e.write_struct(indent, def)?;
                e.write_identifiable(indent, def)?;
                e.write_serializable(indent, def)?;
                if e.config.deserializable_functions {
                    e.write_deserializable(indent, def)?;
                }
                e.write_remote_call(indent, def)?;
            }
            Ok(())
        })
    }

    fn enums_mod(&mut self, defs: &[Definition]) -> io::Result<()> {
        let grouped = grouper::group_types_by_ns(defs);
        let keys = grouped.keys().cloned().collect();
        self.namespaced("enums", keys, |e, ns, indent| {
            for ty in &grouped[&ns.map(str::to_owned)] {
                e.write_enum(indent, ty)?;
                e.write_enum_serializable(indent, ty)?;
                e.write_enum_deserializable(indent, ty)?;
                if e.config.impl_from_type {
                    e.write_impl_from(indent, ty)?;
                }
                if e.config.impl_from_enum {
                    e.write_impl_try_from(indent, ty)?;
                }
            }
            Ok(())
        })
    }

    fn derives(&mut self, indent: &str) -> io::Result<()> {
        if self.config.impl_debug {
            writeln!(self.out, "{indent}#[derive(Debug)]")?;
        }
        writeln!(self.out, "{indent}#[derive(Clone, PartialEq)]")
    }

    fn write_struct(&mut self, indent: &str, def: &Definition) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{indent}/// ```tl")?;
        writeln!(self.out, "{indent}/// {def}")?;
        writeln!(self.out, "{indent}/// ```")?;
        self.derives(indent)?;
        writeln!(
            self.out,
            "{indent}pub struct {}{} {{",
            n::def_type_name(def),
            generic_list(def, "")
        )?;
        for param in &def.params {
            if param.ty != ParameterType::Flags {
                writeln!(
                    self.out,
                    "{indent}    pub {}: {},",
                    n::param_attr_name(param),
                    n::param_qual_name(param)
                )?;
            }
        }
        writeln!(self.out, "{indent}}}")
    }

    fn write_identifiable(&mut self, indent: &str, def: &Definition) -> io::Result<()> {
        let gl = generic_list(def, "");
        writeln!(
            self.out,
            "{indent}impl{gl} crate::Identifiable for {}{gl} {{\n\
             {indent}    const CONSTRUCTOR_ID: u32 = {:#010x};\n\
             {indent}}}",
            n::def_type_name(def),
            def.id,
        )
    }

    fn write_serializable(&mut self, indent: &str, def: &Definition) -> io::Result<()> {
        writeln!(
            self.out,
            "{indent}impl{} crate::Serializable for {}{} {{",
            generic_list(def, ": crate::Serializable"),
            n::def_type_name(def),
            generic_list(def, ""),
        )?;
        let is_fn = def.category == Category::Functions;
        let buf = if is_fn || !def.params.is_empty() { "buf" } else { "_buf" };
        writeln!(self.out, "{indent}    fn serialize(&self, {buf}: &mut impl Extend<u8>) {{")?;
        if is_fn {
            writeln!(self.out, "{indent}        Self::CONSTRUCTOR_ID.serialize(buf);")?;
        }
        for param in &def.params {
            self.write_param_serialization(indent, def, param)?;
        }
        writeln!(self.out, "{indent}    }}")?;
        writeln!(self.out, "{indent}}}")
    }

    fn write_param_serialization(
        &mut self,
        indent: &str,
        def: &Definition,
        param: &Parameter,
    ) -> io::Result<()> {
        let attr = n::param_attr_name(param);
        match &param.ty {
            ParameterType::Flags if Metadata::is_unused_flag(def, param) => {
                writeln!(self.out, "{indent}        0u32.serialize(buf);")
            }
            ParameterType::Flags => {
                let bits: Vec<String> = def
                    .params
                    .iter()
                    .filter_map(|other| match &other.ty {
                        ParameterType::Normal { flag: Some(fl), .. } if fl.name == param.name => {
                            let present = if other.ty.is_flag_only() {
                                format!("self.{}", n::param_attr_name(other))
                            } else {
                                format!("self.{}.is_some()", n::param_attr_name(other))
                            };
                            Some(format!("if {present} {{ 1 << {} }} else {{ 0 }}", fl.index))
                        }
                        _ => None,
                    })
                    .collect();
                let value = match bits.as_slice() {
                    [single] => single.clone(),
                    _ => bits.iter().map(|b| format!("({b})")).collect::<Vec<_>>().join(" | "),
                };
                writeln!(self.out, "{indent}        let {attr}: u32 = {value};")?;
                writeln!(self.out, "{indent}        {attr}.serialize(buf);")
            }
            ParameterType::Normal { .. } if param.ty.is_flag_only() => Ok(()),
            ParameterType::Normal { flag: Some(_), .. } => writeln!(
                self.out,
                "{indent}        if let Some(v) = &self.{attr} {{ v.serialize(buf); }}"
            ),
            ParameterType::Normal { flag: None, .. } => {
                writeln!(self.out, "{indent}        self.{attr}.serialize(buf);")
            }
        }
    }

    fn write_deserializable(&mut self, indent: &str, def: &Definition) -> io::Result<()> {
        let is_fn = def.category == Category::Functions;
        let buf = if is_fn || !def.params.is_empty() { "buf" } else { "_buf" };

        writeln!(
            self.out,
            "{indent}impl{} crate::Deserializable for {}{} {{",
            generic_list(def, ": crate::Deserializable"),
            n::def_type_name(def),
            generic_list(def, ""),
        )?;
        writeln!(
            self.out,
            "{indent}    fn deserialize({buf}: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {{"
        )?;

        // Functions arrive boxed; constructors are read after their enum
        // consumed the id.
        if is_fn {
            writeln!(self.out, "{indent}        let id = u32::deserialize(buf)?;")?;
            writeln!(self.out, "{indent}        if id != Self::CONSTRUCTOR_ID {{")?;
            writeln!(
                self.out,
                "{indent}            return Err(crate::deserialize::Error::UnexpectedConstructor {{ id }});"
            )?;
            writeln!(self.out, "{indent}        }}")?;
        }

        for param in &def.params {
            let attr = n::param_attr_name(param);
            match &param.ty {
                ParameterType::Flags if Metadata::is_unused_flag(def, param) => {
                    writeln!(self.out, "{indent}        let _{attr} = u32::deserialize(buf)?;")?;
                }
                ParameterType::Flags => {
                    writeln!(self.out, "{indent}        let {attr} = u32::deserialize(buf)?;")?;
                }
                ParameterType::Normal { flag: Some(fl), .. } if param.ty.is_flag_only() => {
                    writeln!(
                        self.out,
                        "{indent}        let {attr} = {} & (1 << {}) != 0;",
                        fl.name, fl.index
                    )?;
                }
                ParameterType::Normal { ty, flag: Some(fl) } => {
                    writeln!(
                        self.out,
                        "{indent}        let {attr} = if {} & (1 << {}) != 0 {{ Some({}::deserialize(buf)?) }} else {{ None }};",
                        fl.name,
                        fl.index,
                        n::type_item_path(ty)
                    )?;
                }
                ParameterType::Normal { ty, flag: None } => {
                    writeln!(
                        self.out,
                        "{indent}        let {attr} = {}::deserialize(buf)?;",
                        n::type_item_path(ty)
                    )?;
                }
            }
        }

        let fields: Vec<String> = def
            .params
            .iter()
            .filter(|p| p.ty != ParameterType::Flags)
            .map(n::param_attr_name)
            .collect();
        writeln!(self.out, "{indent}        Ok(Self {{ {} }})", fields.join(", "))?;
        writeln!(self.out, "{indent}    }}")?;
        writeln!(self.out, "{indent}}}")
    }

    fn write_remote_call(&mut self, indent: &str, def: &Definition) -> io::Result<()> {
        // A generic function returns whatever its wrapped query returns.
        let ret = if def.ty.generic_ref {
            format!("{}::Return", def.ty.name)
        } else {
            n::type_qual_name(&def.ty)
        };
        writeln!(
            self.out,
            "{indent}impl{} crate::RemoteCall for {}{} {{\n\
             {indent}    type Return = {ret};\n\
             {indent}}}",
            generic_list(def, ": crate::RemoteCall"),
            n::def_type_name(def),
            generic_list(def, ""),
        )
    }

    fn variant_payload(&self, def: &Definition) -> Option<String> {
        if def.params.is_empty() {
            None
        } else if self.meta.is_recursive(def) {
            Some(format!("Box<{}>", n::def_qual_name(def)))
        } else {
            Some(n::def_qual_name(def))
        }
    }

    fn write_enum(&mut self, indent: &str, ty: &Type) -> io::Result<()> {
        let name = n::type_name(ty);
        writeln!(self.out)?;
        writeln!(self.out, "{indent}/// Boxed type `{ty}`.")?;
        self.derives(indent)?;
        writeln!(self.out, "{indent}pub enum {name} {{")?;
        for def in self.meta.defs_for_type(ty) {
            let variant = n::def_variant_name(def);
            match self.variant_payload(def) {
                Some(payload) => writeln!(self.out, "{indent}    {variant}({payload}),")?,
                None => writeln!(self.out, "{indent}    {variant},")?,
            }
        }
        writeln!(self.out, "{indent}}}")?;

        writeln!(self.out, "{indent}impl {name} {{")?;
        writeln!(self.out, "{indent}    /// Id of the constructor this value holds.")?;
        writeln!(self.out, "{indent}    pub fn constructor_id(&self) -> u32 {{")?;
        writeln!(self.out, "{indent}        match self {{")?;
        for def in self.meta.defs_for_type(ty) {
            let bind = if def.params.is_empty() { "" } else { "(_)" };
            writeln!(
                self.out,
                "{indent}            Self::{}{bind} => {}::CONSTRUCTOR_ID,",
                n::def_variant_name(def),
                n::def_qual_name(def)
            )?;
        }
        writeln!(self.out, "{indent}        }}")?;
        writeln!(self.out, "{indent}    }}")?;
        writeln!(self.out, "{indent}}}")
    }

    fn write_enum_serializable(&mut self, indent: &str, ty: &Type) -> io::Result<()> {
        writeln!(self.out, "{indent}impl crate::Serializable for {} {{", n::type_name(ty))?;
        writeln!(self.out, "{indent}    fn serialize(&self, buf: &mut impl Extend<u8>) {{")?;
        writeln!(self.out, "{indent}        self.constructor_id().serialize(buf);")?;
        writeln!(self.out, "{indent}        match self {{")?;
        for def in self.meta.defs_for_type(ty) {
            let variant = n::def_variant_name(def);
            if def.params.is_empty() {
                writeln!(self.out, "{indent}            Self::{variant} => {{}}")?;
            } else {
                writeln!(self.out, "{indent}            Self::{variant}(x) => x.serialize(buf),")?;
            }
        }
        writeln!(self.out, "{indent}        }}")?;
        writeln!(self.out, "{indent}    }}")?;
        writeln!(self.out, "{indent}}}")
    }

    fn write_enum_deserializable(&mut self, indent: &str, ty: &Type) -> io::Result<()> {
        writeln!(self.out, "{indent}impl crate::Deserializable for {} {{", n::type_name(ty))?;
        writeln!(
            self.out,
            "{indent}    fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {{"
        )?;
        writeln!(self.out, "{indent}        let id = u32::deserialize(buf)?;")?;
        writeln!(self.out, "{indent}        Ok(match id {{")?;
        for def in self.meta.defs_for_type(ty) {
            let variant = n::def_variant_name(def);
            let qual = n::def_qual_name(def);
            let value = if def.params.is_empty() {
                format!("Self::{variant}")
            } else if self.meta.is_recursive(def) {
                format!("Self::{variant}(Box::new({qual}::deserialize(buf)?))")
            } else {
                format!("Self::{variant}({qual}::deserialize(buf)?)")
            };
            writeln!(self.out, "{indent}            {qual}::CONSTRUCTOR_ID => {value},")?;
        }
        writeln!(
            self.out,
            "{indent}            _ => return Err(crate::deserialize::Error::UnexpectedConstructor {{ id }}),"
        )?;
        writeln!(self.out, "{indent}        }})")?;
        writeln!(self.out, "{indent}    }}")?;
        writeln!(self.out, "{indent}}}")
    }

    fn write_impl_from(&mut self, indent: &str, ty: &Type) -> io::Result<()> {
        let enum_name = n::type_name(ty);
        for def in self.meta.defs_for_type(ty) {
            let qual = n::def_qual_name(def);
            let variant = n::def_variant_name(def);
            let (arg, value) = if def.params.is_empty() {
                ("_x", format!("Self::{variant}"))
            } else if self.meta.is_recursive(def) {
                ("x", format!("Self::{variant}(Box::new(x))"))
            } else {
                ("x", format!("Self::{variant}(x)"))
            };
            writeln!(
                self.out,
                "{indent}impl From<{qual}> for {enum_name} {{\n\
                 {indent}    fn from({arg}: {qual}) -> Self {{\n\
                 {indent}        {value}\n\
                 {indent}    }}\n\
                 {indent}}}"
            )?;
        }
        Ok(())
    }

    fn write_impl_try_from(&mut self, indent: &str, ty: &Type) -> io::Result<()> {
        let enum_name = n::type_name(ty);
        for def in self.meta.defs_for_type(ty) {
            if def.params.is_empty() {
                continue;
            }
            let qual = n::def_qual_name(def);
            let variant = n::def_variant_name(def);
            let unwrap = if self.meta.is_recursive(def) { "*x" } else { "x" };
            writeln!(
                self.out,
                "{indent}impl TryFrom<{enum_name}> for {qual} {{\n\
                 {indent}    type Error = {enum_name};\n\
                 {indent}    #[allow(unreachable_patterns)]\n\
                 {indent}    fn try_from(v: {enum_name}) -> Result<Self, Self::Error> {{\n\
                 {indent}        match v {{\n\
                 {indent}            {enum_name}::{variant}(x) => Ok({unwrap}),\n\
                 {indent}            other => Err(other),\n\
                 {indent}        }}\n\
                 {indent}    }}\n\
                 {indent}}}"
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_tl_parser::parse_tl_file;

    fn render(schema: &str, config: &Config) -> (String, String, String, String) {
        let defs: Vec<Definition> = parse_tl_file(schema).collect::<Result<_, _>>().unwrap();
        let mut outputs = Outputs {
            common: Vec::new(),
            types: Vec::new(),
            functions: Vec::new(),
            enums: Vec::new(),
        };
        generate(&defs, config, &mut outputs).unwrap();
        let s = |v: Vec<u8>| String::from_utf8(v).unwrap();
        (s(outputs.common), s(outputs.types), s(outputs.functions), s(outputs.enums))
    }

    const SCHEMA: &str = "
pong#347773c5 msg_id:long ping_id:long = Pong;
auth.loggedOut#c3a2835f flags:# future_auth_token:flags.0?bytes = auth.LoggedOut;
---functions---
ping#7abe77ec ping_id:long = Pong;
invokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X;
";

    #[test]
    fn common_has_layer_and_names() {
        let config = Config { layer: 158, ..Config::default() };
        let (common, ..) = render(SCHEMA, &config);
        assert!(common.contains("pub const LAYER: i32 = 158;"));
        assert!(common.contains("0x347773c5 => Some(\"pong\"),"));
        assert!(common.contains("0xc3a2835f => Some(\"auth.loggedOut\"),"));
    }

    #[test]
    fn namespaces_become_modules_with_imports() {
        let (_, types, _, enums) = render(SCHEMA, &Config::default());
        assert!(types.contains("    pub mod auth {"));
        assert!(types.contains("pub struct LoggedOut {"));
        assert!(types.contains("pub future_auth_token: Option<Vec<u8>>,"));
        assert!(enums.contains("pub enum LoggedOut {"));
        assert_eq!(types.matches("use crate::{Deserializable, Identifiable, Serializable};").count(), 2);
    }

    #[test]
    fn flags_are_computed() {
        let (_, types, ..) = render(SCHEMA, &Config::default());
        assert!(types.contains(
            "let flags: u32 = if self.future_auth_token.is_some() { 1 << 0 } else { 0 };"
        ));
        assert!(types.contains("let future_auth_token = if flags & (1 << 0) != 0 {"));
    }

    #[test]
    fn generic_function_returns_inner_type() {
        let (_, _, functions, _) = render(SCHEMA, &Config::default());
        assert!(functions.contains("pub struct InvokeWithLayer<X> {"));
        assert!(functions.contains("impl<X: crate::RemoteCall> crate::RemoteCall for InvokeWithLayer<X> {"));
        assert!(functions.contains("type Return = X::Return;"));
        assert!(functions.contains("type Return = crate::enums::Pong;"));
    }

    #[test]
    fn function_decoding_checks_id() {
        let config = Config { deserializable_functions: true, ..Config::default() };
        let (_, _, functions, _) = render(SCHEMA, &config);
        assert!(functions.contains("if id != Self::CONSTRUCTOR_ID {"));
        let plain = render(SCHEMA, &Config::default()).2;
        assert!(!plain.contains("crate::Deserializable for"));
    }
}
