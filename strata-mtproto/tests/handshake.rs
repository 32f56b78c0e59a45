//! Full key exchanges against the scripted server.

use strata_crypto::dh::DhError;
use strata_mtproto::PlainSession;
use strata_mtproto::authentication::{self, Answer, Error, Finished};
use strata_testkit::{HandshakeServer, Script, pattern};
use strata_tl_types::{RemoteCall, functions};

/// `g^(ab) mod p` for the default script's `a` and the `b` below.
const REFERENCE_AUTH_KEY: &str = "860d88e252f98e40454a3325c8762a362cb6fb775c850e1e4b1ab56b958089b978312343cd7b4ffbd493bd41468875fee559488685c9d10d4bae309b0dc81ca7838fb5491405c657b44131635f09f2e12ec2f74c592985bb6049258481917b2fe1c52a2d0b014a9dc997b42995bf79b954cae01d686cb90a4d69537e1ec732de2663bfba99e10299ad8cd0e0e5edb21cafd3b2696360fa3a4d81bb54fe4f364e870a6f0a87ad3f06a41effb18a4941728e0df721c95a71e815556e383b6b73ea831594e6547ccf240d7a61ece1cd7112b64c8606ad4bb4f0789ebd76b278d2a88d9e28a8aaac95daeb0afc7b94710010eb3e095168175dcfe8b8dae74327e1a2";

const NOW: i32 = 1_700_000_000;

fn hex(s: &str) -> Vec<u8> {
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
}

fn exchange<R: RemoteCall>(plain: &mut PlainSession, server: &mut HandshakeServer, req: &R) -> R::Return {
    let frame = plain.pack(req);
    let reply = server.respond(&frame).unwrap();
    plain.unpack::<R>(&reply).unwrap()
}

fn run(script: Script) -> (Result<Finished, Error>, HandshakeServer) {
    let mut server = HandshakeServer::new(script);
    let result = drive(&mut server);
    (result, server)
}

fn drive(server: &mut HandshakeServer) -> Result<Finished, Error> {
    let mut plain = PlainSession::new();
    let keys = vec![server.key().public().clone()];

    let (req, state) = authentication::do_step1(&pattern(|i| i as u8));
    let res = exchange(&mut plain, server, &req);

    let (req, state) = authentication::do_step2(state, res, &keys, &pattern(|i| (i * 3 + 1) as u8))?;
    let res = exchange(&mut plain, server, &req);

    let (mut req, mut state) =
        authentication::do_step3(state, res, &pattern(|i| ((i * 7 + 3) % 256) as u8), NOW)?;
    let mut round = 0;
    loop {
        let res = exchange(&mut plain, server, &req);
        round += 1;
        match authentication::do_finish(state, res, &pattern(|i| ((i * 17 + round) % 256) as u8))? {
            Answer::Done(done) => return Ok(done),
            Answer::Retry(next_req, next) => {
                req = next_req;
                state = next;
            }
        }
    }
}

#[test]
fn deterministic_exchange_reproduces_the_reference_key() {
    let (result, server) = run(Script::default());
    let done = result.unwrap();
    assert_eq!(done.auth_key.to_bytes().to_vec(), hex(REFERENCE_AUTH_KEY));
    assert_eq!(i64::from_le_bytes(done.auth_key.key_id()), -1629207134944549892);
    assert_eq!(server.auth_key(), Some(&done.auth_key));
    assert_eq!(done.first_salt, server.first_salt());
}

#[test]
fn time_offset_follows_server_time() {
    let script = Script { server_time: NOW + 100, ..Script::default() };
    let (result, _) = run(script);
    assert_eq!(result.unwrap().time_offset, 100);
}

#[test]
fn retries_end_with_a_shared_key() {
    let script = Script { retries: 2, ..Script::default() };
    let (result, server) = run(script);
    let done = result.unwrap();
    assert_eq!(server.auth_key(), Some(&done.auth_key));
    assert_ne!(done.auth_key.to_bytes().to_vec(), hex(REFERENCE_AUTH_KEY));
}

#[test]
fn refused_dh_params_abort() {
    let (result, _) = run(Script { fail_dh_params: true, ..Script::default() });
    assert_eq!(result.unwrap_err(), Error::DhParamsFail);
}

#[test]
fn dh_gen_fail_aborts() {
    let (result, server) = run(Script { fail_dh_gen: true, ..Script::default() });
    assert_eq!(result.unwrap_err(), Error::DhGenFail);
    assert!(server.auth_key().is_none());
}

#[test]
fn generator_must_match_the_prime() {
    let (result, _) = run(Script { g: 2, ..Script::default() });
    assert_eq!(result.unwrap_err(), Error::Dh(DhError::Generator { g: 2 }));
}

#[test]
fn short_primes_are_rejected() {
    let prime = Script::default().dh_prime[..128].to_vec();
    let (result, _) = run(Script { dh_prime: prime, ..Script::default() });
    assert_eq!(result.unwrap_err(), Error::Dh(DhError::PrimeSize { bits: 1024 }));
}

#[test]
fn unknown_server_keys_are_rejected() {
    let mut server = HandshakeServer::new(Script::default());
    let mut plain = PlainSession::new();
    let (req, state) = authentication::do_step1(&[1; 16]);
    let res = exchange(&mut plain, &mut server, &req);
    let err = authentication::step2(state, res, &authentication::default_keys()).unwrap_err();
    assert_eq!(err, Error::UnknownFingerprints { fingerprints: vec![server.key().fingerprint()] });
}

#[test]
fn random_exchange_agrees_with_the_server() {
    let mut server = HandshakeServer::new(Script::default());
    let mut plain = PlainSession::new();
    let keys = vec![server.key().public().clone()];

    let (req, state) = authentication::step1().unwrap();
    let res = exchange(&mut plain, &mut server, &req);
    let (req, state) = authentication::step2(state, res, &keys).unwrap();
    let res = exchange(&mut plain, &mut server, &req);
    let (req, state) = authentication::step3(state, res).unwrap();
    let res = exchange(&mut plain, &mut server, &req);
    let Answer::Done(done) = authentication::finish(state, res).unwrap() else {
        panic!("expected dh_gen_ok");
    };
    assert_eq!(server.auth_key(), Some(&done.auth_key));
    assert!(done.time_offset.abs() < 5);
}

#[test]
fn req_pq_multi_travels_as_a_plaintext_message() {
    let nonce: [u8; 16] = pattern(|i| i as u8);
    let mut plain = PlainSession::new();
    let req = functions::ReqPqMulti { nonce };
    let frame = plain.pack(&req);
    assert_eq!(&frame[..8], &[0; 8]);
    assert_eq!(i32::from_le_bytes(frame[16..20].try_into().unwrap()), 20);

    let mut server = HandshakeServer::new(Script::default());
    let reply = server.respond(&frame).unwrap();
    let strata_tl_types::enums::ResPq::ResPq(res) = plain.unpack::<functions::ReqPqMulti>(&reply).unwrap();
    assert_eq!(res.nonce, nonce);
    assert_eq!(res.server_nonce.len(), 16);
    assert_ne!(res.server_nonce, [0; 16]);

    let pq = u64::from_be_bytes(res.pq.as_slice().try_into().unwrap());
    assert_eq!(strata_crypto::factorize(pq), Some((1229739323, 1402015859)));
}
