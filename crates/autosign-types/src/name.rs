use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::AutosignError;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const MAX_LEN: usize = 13;

/// Account, action and permission identifier.
///
/// Input is trimmed and lower-cased once, validated against the chain
/// alphabet (`.`, `1`-`5`, `a`-`z`, at most 12 characters plus an optional
/// 13th in `.`, `1`-`5`, `a`-`j`) and kept in its 64-bit encoding. Two names
/// are equal iff their encodings are equal, so `"GameContract "` and
/// `"gamecontract"` compare equal while the string forms never need
/// comparing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u64);

impl Name {
    /// The system account, `eosio`.
    pub const EOSIO: Name = Name(6_138_663_577_826_885_632);
    /// The default signing permission, `active`.
    pub const ACTIVE: Name = Name(3_617_214_756_542_218_240);

    pub fn new(raw: &str) -> Result<Self, AutosignError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(AutosignError::InvalidName("empty name".into()));
        }
        if normalized.len() > MAX_LEN {
            return Err(AutosignError::InvalidName(format!(
                "{normalized}: longer than {MAX_LEN} characters"
            )));
        }

        let bytes = normalized.as_bytes();
        let mut value = 0u64;
        for i in 0..MAX_LEN {
            let symbol = match bytes.get(i) {
                Some(&c) => char_to_symbol(c).ok_or_else(|| {
                    AutosignError::InvalidName(format!(
                        "{normalized}: character {:?} not allowed",
                        c as char
                    ))
                })?,
                None => 0,
            };
            if i < 12 {
                value |= (symbol & 0x1f) << (64 - 5 * (i + 1));
            } else {
                if symbol > 0x0f {
                    return Err(AutosignError::InvalidName(format!(
                        "{normalized}: 13th character must be in .1-5a-j"
                    )));
                }
                value |= symbol;
            }
        }
        Ok(Self(value))
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [b'.'; MAX_LEN];
        let mut tmp = self.0;
        for i in 0..MAX_LEN {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            out[12 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let end = out.iter().rposition(|&c| c != b'.').map_or(0, |p| p + 1);
        // CHARMAP is ASCII, so every prefix is valid UTF-8.
        f.write_str(std::str::from_utf8(&out[..end]).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl FromStr for Name {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Name::new(&s).map_err(serde::de::Error::custom)
    }
}
