//! AES-256 in Infinite Garble Extension (IGE) mode.
//!
//! IGE chains every block on both the previous ciphertext and the previous
//! plaintext. The 32-byte IV holds the initial ciphertext block in its first
//! half and the initial plaintext block in its second half.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

const BLOCK: usize = 16;

fn xor_block(dst: &mut [u8; BLOCK], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// Encrypt `buffer` in place.
///
/// # Panics
///
/// Panics if `buffer.len()` is not a multiple of 16. Every caller in this
/// workspace pads before encrypting.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK];
    let mut prev_plain = [0u8; BLOCK];
    prev_cipher.copy_from_slice(&iv[..BLOCK]);
    prev_plain.copy_from_slice(&iv[BLOCK..]);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut plain = [0u8; BLOCK];
        plain.copy_from_slice(chunk);

        let mut block = plain;
        xor_block(&mut block, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_block(&mut block, &prev_plain);

        chunk.copy_from_slice(&block);
        prev_cipher = block;
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place.
///
/// # Panics
///
/// Panics if `buffer.len()` is not a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK];
    let mut prev_plain = [0u8; BLOCK];
    prev_cipher.copy_from_slice(&iv[..BLOCK]);
    prev_plain.copy_from_slice(&iv[BLOCK..]);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut ciphertext = [0u8; BLOCK];
        ciphertext.copy_from_slice(chunk);

        let mut block = ciphertext;
        xor_block(&mut block, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_block(&mut block, &prev_cipher);

        chunk.copy_from_slice(&block);
        prev_cipher = ciphertext;
        prev_plain = block;
    }
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

    fn arr32(v: &[u8]) -> [u8; 32] {
        v.try_into().unwrap()
    }

    #[test]
    fn encrypts_zero_block_with_counting_key() {
        let key: [u8; 32] = std::array::from_fn(|i| i as u8);
        let mut buf = [0u8; 32];
        ige_encrypt(&mut buf, &key, &key);
        assert_eq!(
            buf.to_vec(),
            hex("4a7f16441cee6781e8374f261edeb88dc77147ebd5121de8d0fae7762423b6bf")
        );
        ige_decrypt(&mut buf, &key, &key);
        assert_eq!(buf, [0u8; 32]);
    }

    #[test]
    fn matches_openssl_ige_vector() {
        let key = arr32(&hex("5468697320697320616e20696d706c656d656e746174696f6e206f6620494745"));
        let iv = arr32(&hex("6d656e746174696f6e206f6620494745206d6f646520666f72204f70656e5353"));
        let plain = hex("99706487a1cde613bc6de0b6f24b1c7aa448c8b9c3403e3467a8cad89340f53b");
        let expected = hex("d016a0387660bb18c060ce3e14147e781257a253ff3bbb672d3340a1de2d94b0");

        let mut buf = plain.clone();
        ige_encrypt(&mut buf, &key, &iv);
        assert_eq!(buf, expected);
        ige_decrypt(&mut buf, &key, &iv);
        assert_eq!(buf, plain);
    }

    #[test]
    fn empty_buffer_is_untouched() {
        let mut buf: [u8; 0] = [];
        ige_encrypt(&mut buf, &[1; 32], &[2; 32]);
        ige_decrypt(&mut buf, &[1; 32], &[2; 32]);
    }

    #[test]
    #[should_panic]
    fn rejects_unaligned_input() {
        let mut buf = [0u8; 15];
        ige_encrypt(&mut buf, &[0; 32], &[0; 32]);
    }
}
