//! RSA public keys and the RSA_PAD scheme used during the auth key exchange.

use std::fmt;

use num_bigint::BigUint;

use crate::{aes, sha1, sha256};

/// Largest payload [`encrypt_hashed`] accepts.
pub const MAX_PAYLOAD: usize = 144;

const PRODUCTION_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";
const TEST_N: &str = "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949";
const EXPONENT: u32 = 65537;

/// An RSA public key `(n, e)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    n: BigUint,
    e: BigUint,
}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    pub fn from_parts(n: BigUint, e: BigUint) -> Self {
        Self { n, e }
    }

    /// The key production data centers advertise.
    pub fn production() -> Self {
        Self::builtin(PRODUCTION_N)
    }

    /// The key test data centers advertise.
    pub fn test() -> Self {
        Self::builtin(TEST_N)
    }

    fn builtin(n: &str) -> Self {
        Self {
            // The constants above are plain decimal literals.
            n: BigUint::parse_bytes(n.as_bytes(), 10).unwrap_or_default(),
            e: BigUint::from(EXPONENT),
        }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    pub fn exponent(&self) -> &BigUint {
        &self.e
    }

    /// Fingerprint the server lists in `resPQ`: the low 64 bits of
    /// `SHA1(bytes(n) ‖ bytes(e))`, with both numbers TL-encoded big-endian.
    pub fn fingerprint(&self) -> i64 {
        let mut buf = Vec::with_capacity(272);
        tl_bytes(&mut buf, &self.n.to_bytes_be());
        tl_bytes(&mut buf, &self.e.to_bytes_be());
        let sha = sha1!(&buf);
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&sha[12..20]);
        i64::from_le_bytes(tail)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rsa::Key(fingerprint={})", self.fingerprint())
    }
}

// Same wire form as a TL `bytes` value; kept local so this crate does not
// depend on the codec.
fn tl_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let header = if data.len() <= 253 {
        buf.push(data.len() as u8);
        1
    } else {
        buf.push(0xfe);
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes()[..3]);
        4
    };
    buf.extend_from_slice(data);
    let pad = (4 - (header + data.len()) % 4) % 4;
    buf.extend(std::iter::repeat(0).take(pad));
}

/// Reasons [`encrypt_hashed`] refuses its input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RsaError {
    /// The payload exceeds [`MAX_PAYLOAD`] bytes.
    PayloadTooLarge { len: usize },
    /// The modulus is not 2048 bits wide.
    ModulusSize { bits: u64 },
}

impl fmt::Display for RsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len } => {
                write!(f, "RSA_PAD payload is {len} bytes, limit is {MAX_PAYLOAD}")
            }
            Self::ModulusSize { bits } => write!(f, "RSA modulus has {bits} bits, expected 2048"),
        }
    }
}

impl std::error::Error for RsaError {}

/// Treat `data` as a big-endian counter and add one, wrapping around.
fn increment(data: &mut [u8]) {
    for byte in data.iter_mut().rev() {
        let (n, overflow) = byte.overflowing_add(1);
        *byte = n;
        if !overflow {
            break;
        }
    }
}

/// RSA-encrypt `data` using the RSA_PAD scheme.
///
/// `random_bytes` supplies the 192-byte padding source (only the part past
/// `data` is used) followed by the 32-byte temporary AES key. The result is
/// always 256 bytes.
pub fn encrypt_hashed(data: &[u8], key: &Key, random_bytes: &[u8; 224]) -> Result<Vec<u8>, RsaError> {
    if data.len() > MAX_PAYLOAD {
        return Err(RsaError::PayloadTooLarge { len: data.len() });
    }
    if key.n.bits() != 2048 {
        return Err(RsaError::ModulusSize { bits: key.n.bits() });
    }

    let mut data_with_padding = Vec::with_capacity(192);
    data_with_padding.extend_from_slice(data);
    data_with_padding.extend_from_slice(&random_bytes[..192 - data.len()]);

    let data_pad_reversed: Vec<u8> = data_with_padding.iter().rev().copied().collect();

    let mut temp_key = [0u8; 32];
    temp_key.copy_from_slice(&random_bytes[192..]);

    let key_aes_encrypted = loop {
        let mut data_with_hash = Vec::with_capacity(224);
        data_with_hash.extend_from_slice(&data_pad_reversed);
        data_with_hash.extend_from_slice(&sha256!(&temp_key, &data_with_padding));

        aes::ige_encrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        let hash = sha256!(&data_with_hash);
        let mut temp_key_xor = temp_key;
        for (a, b) in temp_key_xor.iter_mut().zip(hash.iter()) {
            *a ^= b;
        }

        let mut candidate = Vec::with_capacity(256);
        candidate.extend_from_slice(&temp_key_xor);
        candidate.extend_from_slice(&data_with_hash);

        if BigUint::from_bytes_be(&candidate) < key.n {
            break candidate;
        }
        increment(&mut temp_key);
    };

    let encrypted = BigUint::from_bytes_be(&key_aes_encrypted).modpow(&key.e, &key.n);
    let be = encrypted.to_bytes_be();
    let mut block = vec![0u8; 256 - be.len()];
    block.extend_from_slice(&be);
    Ok(block)
}
