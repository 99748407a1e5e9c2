// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed values held by the in-memory store.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use rampart_store::{Error, GeoPoint, Result};

#[derive(Debug, Clone)]
pub(crate) enum Value {
    String(String),
    Sorted(HashMap<String, f64>),
    Set(HashSet<String>),
    Bits(Vec<u8>),
    Geo(HashMap<String, GeoPoint>),
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Sorted(_) => "zset",
            Self::Set(_) => "set",
            Self::Bits(_) => "bitmap",
            Self::Geo(_) => "geo",
        }
    }

    pub(crate) fn wrong_type(&self, expected: &str) -> Error {
        Error::unavailable(format!(
            "WRONGTYPE operation against a key holding {} (expected {expected})",
            self.type_name()
        ))
    }
}

/// Orders members by ascending score, ties broken by member bytes.
pub(crate) fn ascending(members: &HashMap<String, f64>) -> Vec<(&String, f64)> {
    let mut entries: Vec<_> = members.iter().map(|(member, score)| (member, *score)).collect();
    entries.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
    entries
}

pub(crate) fn get_bit(bits: &[u8], offset: u32) -> bool {
    let byte = (offset / 8) as usize;
    let mask = 0x80_u8 >> (offset % 8);
    bits.get(byte).is_some_and(|b| b & mask != 0)
}

/// Sets a bit, growing the bitmap as needed, and returns its previous value.
pub(crate) fn set_bit(bits: &mut Vec<u8>, offset: u32, value: bool) -> bool {
    let byte = (offset / 8) as usize;
    if bits.len() <= byte {
        bits.resize(byte + 1, 0);
    }
    let mask = 0x80_u8 >> (offset % 8);
    let previous = bits[byte] & mask != 0;
    if value {
        bits[byte] |= mask;
    } else {
        bits[byte] &= !mask;
    }
    previous
}

pub(crate) fn read_unsigned(bits: &[u8], width: u8, offset: u32) -> Result<u64> {
    if width == 0 || width > 63 {
        return Err(Error::unavailable(format!("invalid bitfield width u{width}")));
    }
    let mut out = 0_u64;
    for i in 0..u32::from(width) {
        out = (out << 1) | u64::from(get_bit(bits, offset + i));
    }
    Ok(out)
}
