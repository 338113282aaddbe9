//! BIP-32 derivation paths of the hardware backends

use std::fmt;
use std::str::FromStr;

use super::SignerError;

/// Flag marking a hardened path element
pub const HARDENED: u32 = 0x8000_0000;

/// Ethereum coin type
const COIN_TYPE: u32 = 60;

/// Indices must leave the hardened bit clear
fn check_index(index: u32) -> Result<u32, SignerError> {
    if index & HARDENED != 0 {
        return Err(SignerError::InvalidPath(format!(
            "index {} is out of range, the maximum is {}",
            index,
            HARDENED - 1
        )));
    }
    Ok(index)
}

/// A parsed derivation path such as `m/44'/60'/0'/0/0`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn new(elements: Vec<u32>) -> Self {
        Self(elements)
    }

    /// Ledger Live layout: the index selects the account, `m/44'/60'/{index}'/0/0`
    pub fn ledger(index: u32) -> Result<Self, SignerError> {
        let index = check_index(index)?;
        Ok(Self(vec![44 | HARDENED, COIN_TYPE | HARDENED, index | HARDENED, 0, 0]))
    }

    /// Trezor layout: the index selects the address, `m/44'/60'/0'/0/{index}`
    pub fn trezor(index: u32) -> Result<Self, SignerError> {
        let index = check_index(index)?;
        Ok(Self(vec![44 | HARDENED, COIN_TYPE | HARDENED, HARDENED, 0, index]))
    }

    pub fn elements(&self) -> &[u32] {
        &self.0
    }

    /// Element count followed by each element big-endian, as device APDUs carry it
    pub fn to_apdu_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 * self.0.len());
        out.push(self.0.len() as u8);
        for element in &self.0 {
            out.extend_from_slice(&element.to_be_bytes());
        }
        out
    }
}

impl FromStr for DerivationPath {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignerError::InvalidPath(s.to_string());

        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }

        let mut elements = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let value: u32 = digits.parse().map_err(|_| invalid())?;
            if value & HARDENED != 0 {
                return Err(invalid());
            }
            elements.push(if hardened { value | HARDENED } else { value });
        }

        // Device APDUs carry the element count in one byte and cap it at 10
        if elements.is_empty() || elements.len() > 10 {
            return Err(invalid());
        }
        Ok(Self(elements))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for element in &self.0 {
            if element & HARDENED != 0 {
                write!(f, "/{}'", element & !HARDENED)?;
            } else {
                write!(f, "/{}", element)?;
            }
        }
        Ok(())
    }
}
