use proptest::prelude::*;
use strata_tl_types::deserialize::Error;
use strata_tl_types::{
    Cursor, Deserializable, LAYER, RawVec, RemoteCall, Serializable, enums, functions,
    name_for_id, types,
};

#[test]
fn bool_uses_constructor_ids() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert_eq!(bool::from_bytes(&0xbc799737u32.to_le_bytes()), Ok(false));
    assert_eq!(
        bool::from_bytes(&7u32.to_le_bytes()),
        Err(Error::UnexpectedConstructor { id: 7 })
    );
}

#[test]
fn short_string_layout() {
    let bytes = "hello".to_owned().to_bytes();
    assert_eq!(bytes, [5, b'h', b'e', b'l', b'l', b'o', 0, 0]);
    assert_eq!(String::from_bytes(&bytes).unwrap(), "hello");
}

#[test]
fn long_bytes_use_four_byte_header() {
    let data = vec![0xabu8; 300];
    let bytes = data.to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0x2c, 0x01, 0x00]);
    assert_eq!(bytes.len(), 304);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), data);
}

#[test]
fn boundary_lengths() {
    // 253 is the last length with a one-byte header
    assert_eq!(vec![1u8; 253].to_bytes().len(), 256);
    assert_eq!(vec![1u8; 254].to_bytes()[0], 0xfe);
}

#[test]
fn boxed_and_bare_vectors() {
    let boxed = vec![1i64, -2].to_bytes();
    assert_eq!(&boxed[..4], &0x1cb5c415u32.to_le_bytes());
    assert_eq!(&boxed[4..8], &2i32.to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&boxed).unwrap(), vec![1, -2]);

    let bare = RawVec(vec![9i32]).to_bytes();
    assert_eq!(bare, [1, 0, 0, 0, 9, 0, 0, 0]);
    assert_eq!(RawVec::<i32>::from_bytes(&bare).unwrap(), RawVec(vec![9]));
}

#[test]
fn truncated_input_is_eof() {
    assert_eq!(i32::from_bytes(&[0x01, 0x02]), Err(Error::UnexpectedEof));
    assert_eq!(Vec::<u8>::from_bytes(&[10, 1, 2]), Err(Error::UnexpectedEof));
}

#[test]
fn bad_vector_counts_are_rejected() {
    let mut negative = 0x1cb5c415u32.to_le_bytes().to_vec();
    negative.extend((-1i32).to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&negative), Err(Error::InvalidLength { len: -1 }));

    let mut huge = 0x1cb5c415u32.to_le_bytes().to_vec();
    huge.extend(1_000_000i32.to_le_bytes());
    assert_eq!(
        Vec::<i64>::from_bytes(&huge),
        Err(Error::InvalidLength { len: 1_000_000 })
    );
}

#[test]
fn invalid_utf8_string() {
    assert_eq!(String::from_bytes(&[2, 0xff, 0xfe, 0]), Err(Error::InvalidUtf8));
}

#[test]
fn unknown_constructor_for_boxed_type() {
    let err = enums::InputPeer::from_bytes(&0xdeadbeefu32.to_le_bytes()).unwrap_err();
    assert_eq!(err, Error::UnexpectedConstructor { id: 0xdeadbeef });
}

#[test]
fn flags_reflect_optional_fields() {
    let empty: enums::auth::LoggedOut = types::auth::LoggedOut { future_auth_token: None }.into();
    let bytes = empty.to_bytes();
    assert_eq!(&bytes[..4], &0xc3a2835fu32.to_le_bytes());
    assert_eq!(&bytes[4..], &0u32.to_le_bytes());

    let full: enums::auth::LoggedOut =
        types::auth::LoggedOut { future_auth_token: Some(vec![1, 2, 3]) }.into();
    let bytes = full.to_bytes();
    assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
    assert_eq!(&bytes[8..], &[3, 1, 2, 3]);
    assert_eq!(enums::auth::LoggedOut::from_bytes(&bytes).unwrap(), full);
}

#[test]
fn function_layout() {
    let call = functions::messages::SetTyping {
        peer: enums::InputPeer::User(types::InputPeerUser { user_id: 7, access_hash: -1 }),
        top_msg_id: Some(42),
        action: enums::SendMessageAction::SendMessageTypingAction,
    };
    let mut expected = Vec::new();
    expected.extend(0x58943ee2u32.to_le_bytes());
    expected.extend(1u32.to_le_bytes());
    expected.extend(0xdde8a54cu32.to_le_bytes());
    expected.extend(7i64.to_le_bytes());
    expected.extend((-1i64).to_le_bytes());
    expected.extend(42i32.to_le_bytes());
    expected.extend(0x16bf744eu32.to_le_bytes());
    assert_eq!(call.to_bytes(), expected);
}

#[test]
fn generic_wrappers_nest_queries() {
    let call = functions::InvokeWithLayer {
        layer: LAYER,
        query: functions::help::GetNearestDc {},
    };
    let bytes = call.to_bytes();
    assert_eq!(&bytes[..4], &0xda9b0d0du32.to_le_bytes());
    assert_eq!(&bytes[4..8], &158i32.to_le_bytes());
    assert_eq!(&bytes[8..], &0x1fb33026u32.to_le_bytes());

    fn returns<R: RemoteCall<Return = enums::NearestDc>>(_: &R) {}
    returns(&call);
}

#[test]
fn recursive_types_round_trip() {
    let value = enums::JsonValue::JsonArray(Box::new(types::JsonArray {
        value: vec![
            enums::JsonValue::JsonNull,
            enums::JsonValue::JsonBool(types::JsonBool { value: true }),
            enums::JsonValue::JsonString(types::JsonString { value: "x".into() }),
        ],
    }));
    let bytes = value.to_bytes();
    assert_eq!(enums::JsonValue::from_bytes(&bytes).unwrap(), value);
    assert_eq!(value.constructor_id(), 0xf7444763);
}

#[test]
fn enum_conversions() {
    let peer: enums::InputPeer = types::InputPeerChat { chat_id: 5 }.into();
    let back: Result<types::InputPeerChat, _> = peer.clone().try_into();
    assert_eq!(back.unwrap().chat_id, 5);
    let wrong: Result<types::InputPeerUser, _> = peer.try_into();
    assert!(wrong.is_err());
}

#[test]
fn registry_knows_generated_ids() {
    assert_eq!(name_for_id(0x1fb33026), Some("help.getNearestDc"));
    assert_eq!(name_for_id(0xda9b0d0d), Some("invokeWithLayer"));
    assert_eq!(name_for_id(0x12345678), None);
}

#[test]
fn cursor_tracks_position_across_values() {
    let mut buf = Vec::new();
    5i32.serialize(&mut buf);
    "ab".to_owned().serialize(&mut buf);
    let mut cursor = Cursor::from_slice(&buf);
    assert_eq!(i32::deserialize(&mut cursor).unwrap(), 5);
    assert_eq!(cursor.pos(), 4);
    assert_eq!(String::deserialize(&mut cursor).unwrap(), "ab");
    assert_eq!(cursor.remaining(), 0);
}

proptest! {
    #[test]
    fn bytes_are_aligned_and_recoverable(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let encoded = data.to_bytes();
        prop_assert_eq!(encoded.len() % 4, 0);
        prop_assert_eq!(Vec::<u8>::from_bytes(&encoded).unwrap(), data);
    }

    #[test]
    fn strings_survive(s in ".{0,300}") {
        let encoded = s.clone().to_bytes();
        prop_assert_eq!(String::from_bytes(&encoded).unwrap(), s);
    }

    #[test]
    fn long_vectors_survive(v in proptest::collection::vec(any::<i64>(), 0..64)) {
        prop_assert_eq!(Vec::<i64>::from_bytes(&v.to_bytes()).unwrap(), v);
    }
}
