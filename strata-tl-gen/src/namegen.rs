//! TL names to Rust identifiers and type paths.

use strata_tl_parser::tl::{Definition, Parameter, ParameterType, Type};

/// Rust spelling of the TL primitives.
pub(crate) fn builtin_type(name: &str) -> Option<&'static str> {
    Some(match name {
        "Bool" | "true" => "bool",
        "int" => "i32",
        "long" => "i64",
        "double" => "f64",
        "string" => "String",
        "bytes" => "Vec<u8>",
        "int128" => "[u8; 16]",
        "int256" => "[u8; 32]",
        "Vector" => "Vec",
        "vector" => "crate::RawVec",
        _ => return None,
    })
}

/// Boxed types that map onto Rust primitives and never get an enum.
pub(crate) fn is_builtin_boxed(ty: &Type) -> bool {
    ty.namespace.is_empty() && matches!(ty.name.as_str(), "Bool" | "True" | "Vector")
}

/// `some_name`, `someName`, `resPQ`, `JSONValue` → `SomeName`, `SomeName`,
/// `ResPq`, `JsonValue`.
///
/// A run of capitals is kept as one word; its last capital starts a new word
/// when a lowercase letter follows it.
pub(crate) fn to_pascal(name: &str) -> String {
    let name = name.rsplit('.').next().unwrap_or(name);
    let chars: Vec<char> = name.chars().collect();

    let mut out = String::with_capacity(name.len());
    let mut word_start = true;
    let mut prev_upper = false;

    for (i, &ch) in chars.iter().enumerate() {
        if ch == '_' {
            word_start = true;
            prev_upper = false;
            continue;
        }
        let upper = ch.is_ascii_uppercase();
        if word_start {
            out.push(ch.to_ascii_uppercase());
            word_start = false;
        } else if upper && prev_upper {
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_ascii_lowercase());
            out.push(if next_lower { ch } else { ch.to_ascii_lowercase() });
        } else {
            out.push(ch);
        }
        prev_upper = upper;
    }
    out
}

pub(crate) fn def_type_name(def: &Definition) -> String {
    to_pascal(&def.name)
}

fn qualified(root: &str, namespace: &[String], name: &str) -> String {
    let mut s = String::from(root);
    for ns in namespace {
        s.push_str(ns);
        s.push_str("::");
    }
    s.push_str(name);
    s
}

/// `crate::types::ns::Name` (or `crate::functions::...`) for a definition.
pub(crate) fn def_qual_name(def: &Definition) -> String {
    qualified("crate::types::", &def.namespace, &def_type_name(def))
}

/// Enum variant for a constructor: its name with the type's name stripped
/// from the front, or the whole name when nothing sensible remains.
pub(crate) fn def_variant_name(def: &Definition) -> String {
    let full = def_type_name(def);
    let ty = type_name(&def.ty);

    match full.strip_prefix(ty.as_str()) {
        None | Some("") | Some("Self") => full,
        Some(rest) if !rest.starts_with(|c: char| c.is_ascii_uppercase()) => full,
        Some(rest) => rest.to_owned(),
    }
}

pub(crate) fn type_name(ty: &Type) -> String {
    to_pascal(&ty.name)
}

/// Rust type for a TL type, `crate::enums::ns::Name` or `Vec<i64>`.
pub(crate) fn type_qual_name(ty: &Type) -> String {
    type_path(ty, false)
}

/// Like [`type_qual_name`] but usable in expression position
/// (`Vec::<u8>::deserialize`, `<[u8; 16]>::deserialize`).
pub(crate) fn type_item_path(ty: &Type) -> String {
    type_path(ty, true)
}

fn type_path(ty: &Type, expr: bool) -> String {
    if ty.generic_ref {
        return ty.name.clone();
    }

    let mut s = match builtin_type(&ty.name) {
        Some(b) if expr && b.starts_with('[') => format!("<{b}>"),
        Some(b) if expr && b.contains('<') => b.replacen('<', "::<", 1),
        Some(b) => b.to_owned(),
        None if ty.bare => qualified("crate::types::", &ty.namespace, &type_name(ty)),
        None => qualified("crate::enums::", &ty.namespace, &type_name(ty)),
    };

    if let Some(arg) = &ty.generic_arg {
        if expr {
            s.push_str("::");
        }
        s.push('<');
        s.push_str(&type_qual_name(arg));
        s.push('>');
    }
    s
}

/// Field name for a parameter, escaping Rust keywords.
pub(crate) fn param_attr_name(param: &Parameter) -> String {
    match param.name.as_str() {
        "self" => "is_self".into(),
        kw @ ("final" | "loop" | "static" | "type" | "match" | "move" | "ref") => format!("r#{kw}"),
        other => other.to_ascii_lowercase(),
    }
}

/// Field type for a parameter: `bool` for `flags.N?true`, `Option<T>` for
/// other flagged fields.
pub(crate) fn param_qual_name(param: &Parameter) -> String {
    match &param.ty {
        ParameterType::Flags => "u32".into(),
        ParameterType::Normal { .. } if param.ty.is_flag_only() => "bool".into(),
        ParameterType::Normal { ty, flag: Some(_) } => format!("Option<{}>", type_qual_name(ty)),
        ParameterType::Normal { ty, flag: None } => type_qual_name(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(src: &str) -> Definition {
        src.parse().unwrap()
    }

    #[test]
    fn pascal_case() {
        assert_eq!(to_pascal("new_session_created"), "NewSessionCreated");
        assert_eq!(to_pascal("inputPeerSelf"), "InputPeerSelf");
        assert_eq!(to_pascal("resPQ"), "ResPq");
        assert_eq!(to_pascal("server_DH_params_ok"), "ServerDhParamsOk");
        assert_eq!(to_pascal("P_Q_inner_data"), "PQInnerData");
        assert_eq!(to_pascal("JSONValue"), "JsonValue");
        assert_eq!(to_pascal("help.getNearestDc"), "GetNearestDc");
    }

    #[test]
    fn variant_names() {
        let ok = def("server_DH_params_ok#d0e8075c nonce:int128 = Server_DH_Params");
        assert_eq!(def_variant_name(&ok), "Ok");
        let created = def("new_session_created#9ec20908 first_msg_id:long = NewSession");
        assert_eq!(def_variant_name(&created), "Created");
        let gen_ok = def("dh_gen_ok#3bcbf734 nonce:int128 = Set_client_DH_params_answer");
        assert_eq!(def_variant_name(&gen_ok), "DhGenOk");
        let res_pq = def("resPQ#05162463 nonce:int128 = ResPQ");
        assert_eq!(def_variant_name(&res_pq), "ResPq");
        let pong = def("pong#347773c5 msg_id:long ping_id:long = Pong");
        assert_eq!(def_variant_name(&pong), "Pong");
    }

    #[test]
    fn type_paths() {
        let ty: Type = "Vector<long>".parse().unwrap();
        assert_eq!(type_qual_name(&ty), "Vec<i64>");
        assert_eq!(type_item_path(&ty), "Vec::<i64>");
        let bytes: Type = "bytes".parse().unwrap();
        assert_eq!(type_item_path(&bytes), "Vec::<u8>");
        let nonce: Type = "int128".parse().unwrap();
        assert_eq!(type_item_path(&nonce), "<[u8; 16]>");
        let boxed: Type = "auth.LoggedOut".parse().unwrap();
        assert_eq!(type_qual_name(&boxed), "crate::enums::auth::LoggedOut");
        let bare: Type = "future_salt".parse().unwrap();
        assert_eq!(type_qual_name(&bare), "crate::types::FutureSalt");
    }

    #[test]
    fn flagged_fields() {
        let d = def("auth.loggedOut#c3a2835f flags:# token:flags.0?bytes silent:flags.1?true = auth.LoggedOut");
        assert_eq!(param_qual_name(&d.params[1]), "Option<Vec<u8>>");
        assert_eq!(param_qual_name(&d.params[2]), "bool");
    }
}
