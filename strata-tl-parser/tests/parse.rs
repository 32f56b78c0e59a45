use strata_tl_parser::errors::{ParamParseError, ParseError};
use strata_tl_parser::tl::{Category, ParameterType};
use strata_tl_parser::{find_layer, parse_tl_file};

fn parse_all(src: &str) -> Vec<strata_tl_parser::tl::Definition> {
    parse_tl_file(src).collect::<Result<_, _>>().unwrap()
}

#[test]
fn parses_explicit_id() {
    let defs = parse_all("rpc_error#2144ca19 error_code:int error_message:string = RpcError;");
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "rpc_error");
    assert_eq!(defs[0].id, 0x2144ca19);
    assert_eq!(defs[0].ty.name, "RpcError");
    assert_eq!(defs[0].params.len(), 2);
}

#[test]
fn sections_switch_category() {
    let defs = parse_all(
        "
pong#347773c5 msg_id:long ping_id:long = Pong;
---functions---
help.getNearestDc#1fb33026 = NearestDc;
---types---
boolTrue#997275b5 = Bool;
",
    );
    assert_eq!(defs[0].category, Category::Types);
    assert_eq!(defs[1].category, Category::Functions);
    assert_eq!(defs[1].namespace, vec!["help"]);
    assert_eq!(defs[1].full_name(), "help.getNearestDc");
    assert_eq!(defs[2].category, Category::Types);
}

#[test]
fn flagged_parameters() {
    let defs = parse_all(
        "auth.loggedOut#c3a2835f flags:# future_auth_token:flags.0?bytes = auth.LoggedOut;",
    );
    let params = &defs[0].params;
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].ty, ParameterType::Flags);
    match &params[1].ty {
        ParameterType::Normal { ty, flag: Some(flag) } => {
            assert_eq!(ty.name, "bytes");
            assert_eq!(flag.name, "flags");
            assert_eq!(flag.index, 0);
        }
        other => panic!("unexpected parameter type {other:?}"),
    }
}

#[test]
fn comments_and_multiline_definitions() {
    let defs = parse_all(
        "
// LAYER 158
boolTrue#997275b5 = Bool; // trailing comment
resPQ#05162463 nonce:int128 server_nonce:int128
    pq:bytes server_public_key_fingerprints:Vector<long>
    = ResPQ;
",
    );
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[1].params.len(), 4);
    assert!(defs[1].params[3].to_string().contains("Vector<long>"));
}

#[test]
fn derived_ids_match_published_ones() {
    let defs = parse_all(
        "
boolFalse = Bool;
resPQ nonce:int128 server_nonce:int128 pq:bytes server_public_key_fingerprints:Vector<long> = ResPQ;
---functions---
invokeWithLayer {X:Type} layer:int query:!X = X;
",
    );
    assert_eq!(defs[0].id, 0xbc799737);
    assert_eq!(defs[1].id, 0x05162463);
    assert_eq!(defs[2].id, 0xda9b0d0d);
}

#[test]
fn generic_definitions() {
    let defs = parse_all("---functions---\ninvokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X;");
    let def = &defs[0];
    assert!(def.is_generic());
    assert_eq!(def.generic_names(), vec!["X"]);
    assert!(def.ty.generic_ref);
    assert_eq!(def.params.len(), 2);
    assert_eq!(
        def.to_string(),
        "invokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X"
    );
}

#[test]
fn undeclared_flag_field_is_rejected() {
    let err = parse_tl_file("x#1 a:flags.0?int = X;").next().unwrap().unwrap_err();
    assert_eq!(err, ParseError::InvalidParam(ParamParseError::MissingDef));
}

#[test]
fn unterminated_definition_is_reported() {
    let mut it = parse_tl_file("boolTrue#997275b5 = Bool;\nping#7abe77ec ping_id:long = Pong");
    assert!(it.next().unwrap().is_ok());
    assert_eq!(it.next().unwrap().unwrap_err(), ParseError::Unterminated);
    assert!(it.next().is_none());
}

#[test]
fn layer_comment() {
    assert_eq!(find_layer("\n// LAYER 158\n"), Some(158));
    assert_eq!(find_layer("// not a layer"), None);
}
