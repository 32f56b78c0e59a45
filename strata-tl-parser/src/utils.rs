//! Constructor id derivation for definitions written without `#id`.

/// Rewrites a definition into the form its constructor id is hashed from.
///
/// The `#id` and trailing `;` are dropped, `{X:Type}` loses its braces,
/// generic brackets become a space (`Vector<long>` → `Vector long`) and the
/// `bytes` type is spelled `string`, since both share one wire encoding.
pub fn canonical_form(definition: &str) -> String {
    let definition = definition.trim().trim_end_matches(';').trim();
    let mut out = String::with_capacity(definition.len());

    for (i, token) in definition
        .replace('<', " ")
        .replace('>', "")
        .split_whitespace()
        .enumerate()
    {
        if i > 0 {
            out.push(' ');
        }
        if i == 0 {
            out.push_str(token.split_once('#').map_or(token, |(name, _)| name));
            continue;
        }
        let token = token
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(token);
        out.push_str(&respell_bytes(token));
    }
    out
}

fn respell_bytes(token: &str) -> String {
    // `name:bytes`, `name:flags.0?bytes` and a bare `bytes` vector argument.
    let (prefix, ty) = match token.rfind(['?', ':']) {
        Some(at) => token.split_at(at + 1),
        None => ("", token),
    };
    if ty == "bytes" {
        format!("{prefix}string")
    } else {
        token.to_owned()
    }
}

/// Computes the CRC32-based constructor id of a definition.
pub fn tl_id(definition: &str) -> u32 {
    crc32(canonical_form(definition).as_bytes())
}

/// CRC-32 (ISO 3309 / ITU-T V.42, reflected polynomial `0xEDB88320`).
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
