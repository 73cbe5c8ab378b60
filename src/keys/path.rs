//! Derivation path parsing (`m/44'/133'/0'/0/0`, `'` or `h` for hardened)

use std::fmt;
use std::str::FromStr;

use crate::error::KeyError;

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

pub const COIN_ZCASH: u32 = 133;
pub const COIN_COSMOS: u32 = 118;
pub const COIN_POLKADOT: u32 = 354;
pub const COIN_KUSAMA: u32 = 434;
pub const COIN_PENUMBRA: u32 = 6532;

/// One path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildIndex {
    Normal(u32),
    Hardened(u32),
}

impl ChildIndex {
    pub fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }

    /// Index as used in the HMAC input (hardened indices carry the high bit).
    pub fn raw(&self) -> u32 {
        match self {
            Self::Normal(i) => *i,
            Self::Hardened(i) => i | HARDENED_OFFSET,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        if raw & HARDENED_OFFSET != 0 {
            Self::Hardened(raw & !HARDENED_OFFSET)
        } else {
            Self::Normal(raw)
        }
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(i) => write!(f, "{}", i),
            Self::Hardened(i) => write!(f, "{}'", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<ChildIndex>);

impl DerivationPath {
    pub fn master() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[ChildIndex] {
        &self.0
    }

    pub fn child(mut self, index: ChildIndex) -> Self {
        self.0.push(index);
        self
    }

    pub fn is_fully_hardened(&self) -> bool {
        self.0.iter().all(ChildIndex::is_hardened)
    }
}

impl FromStr for DerivationPath {
    type Err = KeyError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let path = path.trim();
        let rest = match path {
            "m" => return Ok(Self::master()),
            p if p.starts_with("m/") => &p[2..],
            _ => {
                return Err(KeyError::InvalidPath(format!(
                    "path must start with 'm/': {}",
                    path
                )))
            }
        };

        let mut segments = Vec::new();
        for part in rest.split('/') {
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(d) => (d, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| KeyError::InvalidPath(format!("invalid path component: {:?}", part)))?;
            if index >= HARDENED_OFFSET {
                return Err(KeyError::InvalidPath(format!(
                    "index {} out of range",
                    index
                )));
            }
            segments.push(if hardened {
                ChildIndex::Hardened(index)
            } else {
                ChildIndex::Normal(index)
            });
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// `m/44'/<coin>'/<account>'/0/<index>`
pub fn bip44(coin_type: u32, account: u32, index: u32) -> DerivationPath {
    DerivationPath(vec![
        ChildIndex::Hardened(44),
        ChildIndex::Hardened(coin_type),
        ChildIndex::Hardened(account),
        ChildIndex::Normal(0),
        ChildIndex::Normal(index),
    ])
}

/// `m/44'/<coin>'/<account>'`, the level an account xpub is exported at.
pub fn bip44_account(coin_type: u32, account: u32) -> DerivationPath {
    DerivationPath(vec![
        ChildIndex::Hardened(44),
        ChildIndex::Hardened(coin_type),
        ChildIndex::Hardened(account),
    ])
}

/// `m/44'/<coin>'/<account>'/0'/0'`
pub fn slip10_substrate(coin_type: u32, account: u32) -> DerivationPath {
    DerivationPath(vec![
        ChildIndex::Hardened(44),
        ChildIndex::Hardened(coin_type),
        ChildIndex::Hardened(account),
        ChildIndex::Hardened(0),
        ChildIndex::Hardened(0),
    ])
}
