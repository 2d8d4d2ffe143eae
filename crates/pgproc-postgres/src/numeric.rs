//! Binary NUMERIC codec.
//!
//! NUMERIC travels as base-10000 digit groups: `ndigits`, `weight` (position of
//! the first group relative to the decimal point), `sign` and `dscale`
//! (digits after the point), each a big-endian 16-bit word, followed by the
//! groups. Values are exchanged as decimal text to keep full precision.

use bytes::BytesMut;
use postgres_types::{FromSql, IsNull, Type};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_POS_INFINITY: u16 = 0xD000;
const SIGN_NEG_INFINITY: u16 = 0xF000;

/// A NUMERIC decoded to its decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub String);

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn word(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

pub(crate) fn decode(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() < 8 {
        return Err("invalid NUMERIC payload: too short".into());
    }

    let ndigits = word(raw, 0) as usize;
    let weight = word(raw, 2) as i16 as i32;
    let sign = word(raw, 4);
    let dscale = word(raw, 6) as usize;

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_POS_INFINITY => return Ok("Infinity".to_string()),
        SIGN_NEG_INFINITY => return Ok("-Infinity".to_string()),
        _ => {}
    }

    if raw.len() < 8 + ndigits * 2 {
        return Err("invalid NUMERIC payload: truncated digits".into());
    }

    let mut groups = Vec::with_capacity(ndigits);
    for index in 0..ndigits {
        let group = word(raw, 8 + index * 2);
        if group > 9999 {
            return Err("invalid NUMERIC payload: group out of range".into());
        }
        groups.push(group);
    }

    // Group at position p (0 = first group) scales by 10000^(weight - p).
    let group_at = |exp: i32| -> u16 {
        let p = weight - exp;
        if p < 0 || p as usize >= groups.len() {
            0
        } else {
            groups[p as usize]
        }
    };

    let mut integer = String::new();
    if weight >= 0 {
        for exp in (0..=weight).rev() {
            let group = group_at(exp);
            if integer.is_empty() {
                if group != 0 {
                    integer.push_str(&group.to_string());
                }
            } else {
                integer.push_str(&format!("{group:04}"));
            }
        }
    }
    if integer.is_empty() {
        integer.push('0');
    }

    let mut fraction = String::new();
    let mut exp = -1;
    while fraction.len() < dscale {
        fraction.push_str(&format!("{:04}", group_at(exp)));
        exp -= 1;
    }
    fraction.truncate(dscale);

    let is_zero = groups.iter().all(|g| *g == 0);
    let mut output = String::new();
    if sign == SIGN_NEGATIVE && !is_zero {
        output.push('-');
    }
    output.push_str(&integer);
    if !fraction.is_empty() {
        output.push('.');
        output.push_str(&fraction);
    }
    Ok(output)
}

/// Encode decimal text (`-12.50`, `NaN`, `Infinity`) as a binary NUMERIC.
pub(crate) fn encode(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let text = text.trim();
    let special = match text {
        "NaN" | "nan" => Some(SIGN_NAN),
        "Infinity" | "inf" | "+Infinity" => Some(SIGN_POS_INFINITY),
        "-Infinity" | "-inf" => Some(SIGN_NEG_INFINITY),
        _ => None,
    };
    if let Some(sign) = special {
        write_header(out, 0, 0, sign, 0);
        return Ok(IsNull::No);
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (integer.is_empty() && fraction.is_empty())
        || !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid numeric literal: {}", text).into());
    }

    let int_pad = (4 - integer.len() % 4) % 4;
    let frac_pad = (4 - fraction.len() % 4) % 4;
    let digits: Vec<u8> = std::iter::repeat_n(b'0', int_pad)
        .chain(integer.bytes())
        .chain(fraction.bytes())
        .chain(std::iter::repeat_n(b'0', frac_pad))
        .map(|b| b - b'0')
        .collect();

    let mut groups: Vec<u16> = digits
        .chunks(4)
        .map(|c| c.iter().fold(0u16, |acc, d| acc * 10 + *d as u16))
        .collect();
    let mut weight = ((int_pad + integer.len()) / 4) as i32 - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i32;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let sign = if negative && !groups.is_empty() {
        SIGN_NEGATIVE
    } else {
        SIGN_POSITIVE
    };
    if groups.is_empty() {
        weight = 0;
    }

    write_header(out, groups.len() as u16, weight as i16 as u16, sign, fraction.len() as u16);
    for group in groups {
        out.extend_from_slice(&group.to_be_bytes());
    }
    Ok(IsNull::No)
}

fn write_header(out: &mut BytesMut, ndigits: u16, weight: u16, sign: u16, dscale: u16) {
    for w in [ndigits, weight, sign, dscale] {
        out.extend_from_slice(&w.to_be_bytes());
    }
}
