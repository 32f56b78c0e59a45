//! Cryptographic primitives for MTProto.
//!
//! - AES-256-IGE ([`aes`])
//! - SHA-1 / SHA-256 over concatenated slices ([`sha1!`], [`sha256!`])
//! - pq factorization ([`factorize`])
//! - RSA_PAD with the built-in server keys ([`rsa`])
//! - Diffie-Hellman parameter checks ([`dh`])
//! - [`AuthKey`] and MTProto 2.0 message encryption in both directions

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod deque_buffer;
pub mod dh;
mod factorize;
pub mod rsa;
#[doc(hidden)]
pub mod sha;

use std::fmt;

pub use auth_key::AuthKey;
pub use deque_buffer::DequeBuffer;
pub use factorize::factorize;

/// Errors from [`decrypt_data_v2`] and [`decrypt_data_v2_as`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the frame is not ours.
    AuthKeyMismatch,
    /// The decrypted payload does not hash to the frame's `msg_key`.
    MessageKeyMismatch,
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}

impl std::error::Error for DecryptError {}

/// The party that produced a ciphertext.
///
/// Each direction reads a different slice of the auth key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

fn msg_key_for(auth_key: &AuthKey, plaintext: &[u8], side: Side) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

/// Padding for a `len`-byte plaintext: between 17 and 32 bytes, leaving the
/// total a multiple of 16.
fn padding_len(len: usize) -> usize {
    16 + (16 - (len % 16))
}

/// Encrypt a client-to-server payload in place.
///
/// On return `buffer` holds `auth_key_id ‖ msg_key ‖ ciphertext`.
pub fn encrypt_data_v2(buffer: &mut DequeBuffer, auth_key: &AuthKey) -> Result<(), getrandom::Error> {
    let mut rnd = [0u8; 32];
    getrandom::getrandom(&mut rnd)?;
    encrypt_data_v2_as(buffer, auth_key, Side::Client, &rnd);
    Ok(())
}

/// Encrypt as `side`, drawing padding bytes from `rnd`.
pub fn encrypt_data_v2_as(buffer: &mut DequeBuffer, auth_key: &AuthKey, side: Side, rnd: &[u8; 32]) {
    let pad = padding_len(buffer.len());
    buffer.extend(rnd.iter().take(pad).copied());

    let msg_key = msg_key_for(auth_key, buffer.as_ref(), side);
    let (key, iv) = calc_key(auth_key, &msg_key, side);
    aes::ige_encrypt(buffer.as_mut(), &key, &iv);

    buffer.extend_front(&msg_key);
    buffer.extend_front(&auth_key.key_id);
}

/// Decrypt a server-to-client frame.
///
/// `buffer` must start with `auth_key_id ‖ msg_key`. On success the returned
/// slice is the plaintext, padding included.
pub fn decrypt_data_v2<'a>(buffer: &'a mut [u8], auth_key: &AuthKey) -> Result<&'a mut [u8], DecryptError> {
    decrypt_data_v2_as(buffer, auth_key, Side::Server)
}

/// Decrypt a frame that `sender` produced.
pub fn decrypt_data_v2_as<'a>(
    buffer: &'a mut [u8],
    auth_key: &AuthKey,
    sender: Side,
) -> Result<&'a mut [u8], DecryptError> {
    if buffer.len() < 24 || (buffer.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = calc_key(auth_key, &msg_key, sender);
    aes::ige_decrypt(&mut buffer[24..], &key, &iv);

    if msg_key_for(auth_key, &buffer[24..], sender) != msg_key {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(&mut buffer[24..])
}

/// Temporary `(key, iv)` protecting `server_DH_params_ok.encrypted_answer`
/// and `set_client_DH_params.encrypted_data`.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn counting_key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| i as u8))
    }

    fn plaintext() -> Vec<u8> {
        (0..40u8).map(|i| 255 - i).collect()
    }

    #[test]
    fn padding_bounds() {
        for len in 0..64 {
            let pad = padding_len(len);
            assert!((17..=32).contains(&pad));
            assert_eq!((len + pad) % 16, 0);
        }
    }

    #[test]
    fn client_encryption_vector() {
        let mut buf = DequeBuffer::with_capacity(64, 24);
        buf.extend_from_slice(&plaintext());
        encrypt_data_v2_as(&mut buf, &counting_key(), Side::Client, &[0xaa; 32]);
        assert_eq!(
            buf.to_vec(),
            hex(concat!(
                "32d1586ea457dfc87385308ee4f2288d18112147b5b2f5f28546435015b43e9f",
                "fa77f5bbc7e7ead5ed3df9df33b5779ccf1d0cb854d5dffdce892475735d27f0",
                "d1e35a75df457e035bbc9ce580f6873cdbe0bef0ef824c65"
            ))
        );
    }

    #[test]
    fn each_side_decrypts_the_other() {
        let key = counting_key();
        for side in [Side::Client, Side::Server] {
            let mut buf = DequeBuffer::with_capacity(64, 24);
            buf.extend_from_slice(&plaintext());
            encrypt_data_v2_as(&mut buf, &key, side, &[0x11; 32]);
            let mut frame = buf.to_vec();
            let plain = decrypt_data_v2_as(&mut frame, &key, side).unwrap();
            assert_eq!(&plain[..40], &plaintext()[..]);
            assert_eq!(plain.len(), 64);
        }
    }

    #[test]
    fn wrong_direction_fails_integrity() {
        let key = counting_key();
        let mut buf = DequeBuffer::with_capacity(64, 24);
        buf.extend_from_slice(&plaintext());
        encrypt_data_v2(&mut buf, &key).unwrap();
        let mut frame = buf.to_vec();
        assert_eq!(decrypt_data_v2(&mut frame, &key), Err(DecryptError::MessageKeyMismatch));
    }

    #[test]
    fn rejects_malformed_frames() {
        let key = counting_key();
        assert_eq!(decrypt_data_v2(&mut [0u8; 23], &key), Err(DecryptError::InvalidBuffer));
        assert_eq!(decrypt_data_v2(&mut [0u8; 41], &key), Err(DecryptError::InvalidBuffer));
        assert_eq!(decrypt_data_v2(&mut [0u8; 40], &key), Err(DecryptError::AuthKeyMismatch));
    }

    #[test]
    fn tampering_is_detected() {
        let key = counting_key();
        let mut buf = DequeBuffer::with_capacity(64, 24);
        buf.extend_from_slice(&plaintext());
        encrypt_data_v2_as(&mut buf, &key, Side::Server, &[0; 32]);
        let mut frame = buf.to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 1;
        assert_eq!(decrypt_data_v2(&mut frame, &key), Err(DecryptError::MessageKeyMismatch));
    }

    #[test]
    fn nonce_key_derivation_vector() {
        let server_nonce: [u8; 16] = std::array::from_fn(|i| i as u8);
        let new_nonce: [u8; 32] = std::array::from_fn(|i| 32 + i as u8);
        let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        assert_eq!(
            key.to_vec(),
            hex("867aae22fba1fba9ab6d4eb1e5f965bd036d84f3a867f358bbf91beae86c38e9")
        );
        assert_eq!(
            iv.to_vec(),
            hex("a6d3105c0138f8b458b1c56a7fe8c6e6e1436b219d7f2c12af8f95b420212223")
        );
    }
}
