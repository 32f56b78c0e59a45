//! The RSA key the scripted server answers with.

use std::fmt;

use num_bigint::BigUint;
use strata_crypto::rsa;
use strata_crypto::{aes, sha256};

const N: &str = "25418268790207516306003927894633143752161065309705986595731685099814491519014920068740171170301837971333792058476762048786865759036562896381614271929381476913782361671158166173086632246823711323442466330481730291598108362457309756722517430540778587034590651021965987771520396282389896295766266460850803794101302994239493531125202436065725381215243077896592580038681321878556734639451251188111430729277106816961214050487227041856498670019845691493821016262691258044963765233836524391441781548895938779743420890225055397031616608175392777009692131436780004223558287483290197826233814219127169314801128788668600168542897";
const D: &str = "11768607642029109831564310024425908989482266280499009784817498311277919700432263104899787660497944985018644724756849248933644523846467586956307317397640826475629874595553470791660500565810081092251346218151157103668266797324005960039515199865940080499322541759388207423976214117135325362018153201318741549449978058053265837746106984953704108625505428101789612404772788808038927543393641103138920261377415685181103966390194086332246510992772824382606228606560569469865877968615154888861327419353023659367953008385150758047578576575803072740088967929900950097867615737363178304813026707759212228488545083059310107901071";

/// A private RSA key. Only ever used on the server side of tests.
#[derive(Clone)]
pub struct ServerKey {
    public: rsa::Key,
    d: BigUint,
}

impl ServerKey {
    /// The built-in test key. Its fingerprint is `-2604702583572545614`.
    pub fn test() -> Self {
        let n = BigUint::parse_bytes(N.as_bytes(), 10).unwrap_or_default();
        let d = BigUint::parse_bytes(D.as_bytes(), 10).unwrap_or_default();
        Self { public: rsa::Key::from_parts(n, BigUint::from(65537u32)), d }
    }

    pub fn public(&self) -> &rsa::Key {
        &self.public
    }

    pub fn fingerprint(&self) -> i64 {
        self.public.fingerprint()
    }

    /// Undo RSA_PAD, returning the 192 bytes of data plus random padding.
    ///
    /// `None` if the embedded SHA-256 does not match.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        let m = BigUint::from_bytes_be(ciphertext).modpow(&self.d, self.public.modulus());
        let be = m.to_bytes_be();
        if be.len() > 256 {
            return None;
        }
        let mut block = vec![0u8; 256 - be.len()];
        block.extend_from_slice(&be);

        let (temp_key_xor, aes_encrypted) = block.split_at_mut(32);
        let hash = sha256!(&*aes_encrypted);
        let mut temp_key = [0u8; 32];
        for ((k, x), h) in temp_key.iter_mut().zip(temp_key_xor.iter()).zip(hash.iter()) {
            *k = x ^ h;
        }

        aes::ige_decrypt(aes_encrypted, &temp_key, &[0u8; 32]);
        let mut data_with_padding = aes_encrypted[..192].to_vec();
        data_with_padding.reverse();
        let expected = sha256!(&temp_key, &data_with_padding);
        (aes_encrypted[192..] == expected).then_some(data_with_padding)
    }
}

impl fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerKey({})", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(ServerKey::test().fingerprint(), -2604702583572545614);
    }

    #[test]
    fn decrypt_inverts_rsa_pad() {
        let key = ServerKey::test();
        let data = b"hello from the client";
        let random: [u8; 224] = std::array::from_fn(|i| (i * 3) as u8);
        let encrypted = rsa::encrypt_hashed(data, key.public(), &random).unwrap();
        let plain = key.decrypt(&encrypted).unwrap();
        assert_eq!(&plain[..data.len()], data);
        assert_eq!(&plain[data.len()..], &random[..192 - data.len()]);
    }

    #[test]
    fn decrypt_rejects_garbage() {
        assert!(ServerKey::test().decrypt(&[0x42; 256]).is_none());
    }
}
