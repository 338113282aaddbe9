//! Typed-data documents answered field by field
//!
//! Trezor firmware does not take an `eth_signTypedData_v4` document whole.
//! It asks for each struct definition by name and then for each value by
//! member path: the first path element picks the domain (0) or the message
//! (1), later elements index struct members or array entries. Arrays are
//! answered with their length as a big-endian `u16`, then entry by entry.

use alloy_primitives::{Address, I256, U256};
use serde_json::{Map, Value};
use std::str::FromStr;

use super::SignerError;

/// Struct type of the domain member
pub const DOMAIN_TYPE_NAME: &str = "EIP712Domain";

/// Field type as the device understands it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer of the given byte width
    Uint(u32),
    /// Signed integer of the given byte width
    Int(u32),
    /// Fixed width for `bytesN`, `None` for dynamic `bytes`
    Bytes(Option<u32>),
    String,
    Bool,
    Address,
    Array {
        entry: Box<FieldKind>,
        size: Option<u32>,
    },
    Struct {
        name: String,
        members: u32,
    },
}

fn invalid(message: impl Into<String>) -> SignerError {
    SignerError::InvalidTypedData(message.into())
}

/// Read-only view over a typed-data document
pub struct TypedDocument<'a> {
    doc: &'a Value,
    types: &'a Map<String, Value>,
}

impl<'a> TypedDocument<'a> {
    pub fn new(doc: &'a Value) -> Result<Self, SignerError> {
        let types = doc
            .get("types")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("document has no types"))?;
        Ok(Self { doc, types })
    }

    pub fn primary_type(&self) -> Result<&'a str, SignerError> {
        self.doc
            .get("primaryType")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("document has no primaryType"))
    }

    /// `(name, type)` pairs of a struct definition, in declaration order
    fn raw_members(&self, name: &str) -> Result<Vec<(&'a str, &'a str)>, SignerError> {
        let members = self
            .types
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(format!("unknown struct {}", name)))?;

        members
            .iter()
            .map(|member| {
                let field = member.get("name").and_then(Value::as_str);
                let kind = member.get("type").and_then(Value::as_str);
                match (field, kind) {
                    (Some(field), Some(kind)) => Ok((field, kind)),
                    _ => Err(invalid(format!("malformed member of {}", name))),
                }
            })
            .collect()
    }

    /// Members of struct `name` with their device field types
    pub fn struct_members(&self, name: &str) -> Result<Vec<(String, FieldKind)>, SignerError> {
        self.raw_members(name)?
            .into_iter()
            .map(|(field, kind)| Ok((field.to_string(), self.field_kind(kind)?)))
            .collect()
    }

    pub fn field_kind(&self, type_name: &str) -> Result<FieldKind, SignerError> {
        if let Some(stripped) = type_name.strip_suffix(']') {
            let (entry, size) = split_array(type_name, stripped)?;
            return Ok(FieldKind::Array {
                entry: Box::new(self.field_kind(entry)?),
                size,
            });
        }
        if let Some(bits) = type_name.strip_prefix("uint") {
            return Ok(FieldKind::Uint(integer_width(type_name, bits)?));
        }
        if let Some(bits) = type_name.strip_prefix("int") {
            return Ok(FieldKind::Int(integer_width(type_name, bits)?));
        }
        if let Some(width) = type_name.strip_prefix("bytes") {
            if width.is_empty() {
                return Ok(FieldKind::Bytes(None));
            }
            let width: u32 = width
                .parse()
                .map_err(|_| invalid(format!("unknown type {}", type_name)))?;
            if !(1..=32).contains(&width) {
                return Err(invalid(format!("unknown type {}", type_name)));
            }
            return Ok(FieldKind::Bytes(Some(width)));
        }

        match type_name {
            "string" => Ok(FieldKind::String),
            "bool" => Ok(FieldKind::Bool),
            "address" => Ok(FieldKind::Address),
            name => {
                let members = self.raw_members(name)?.len();
                Ok(FieldKind::Struct {
                    name: name.to_string(),
                    members: u32::try_from(members)
                        .map_err(|_| invalid(format!("{} has too many members", name)))?,
                })
            }
        }
    }

    /// Encoded value at a device member path
    pub fn encode_member(&self, path: &[u32]) -> Result<Vec<u8>, SignerError> {
        let (root, rest) = path
            .split_first()
            .ok_or_else(|| invalid("empty member path"))?;
        let (mut type_name, member) = match root {
            0 => (DOMAIN_TYPE_NAME, "domain"),
            1 => (self.primary_type()?, "message"),
            other => return Err(invalid(format!("unknown root member {}", other))),
        };
        let mut value = self
            .doc
            .get(member)
            .ok_or_else(|| invalid(format!("document has no {}", member)))?;

        for &index in rest {
            let index = index as usize;
            match value {
                Value::Object(fields) => {
                    let members = self.raw_members(type_name)?;
                    let (field, kind) = members.get(index).copied().ok_or_else(|| {
                        invalid(format!("{} has no member {}", type_name, index))
                    })?;
                    value = fields
                        .get(field)
                        .ok_or_else(|| invalid(format!("{}.{} is missing", type_name, field)))?;
                    type_name = kind;
                }
                Value::Array(items) => {
                    let stripped = type_name
                        .strip_suffix(']')
                        .ok_or_else(|| invalid(format!("{} is not an array", type_name)))?;
                    type_name = split_array(type_name, stripped)?.0;
                    value = items
                        .get(index)
                        .ok_or_else(|| invalid(format!("index {} out of bounds", index)))?;
                }
                _ => return Err(invalid(format!("{} has no members", type_name))),
            }
        }

        if let Value::Array(items) = value {
            let len = u16::try_from(items.len())
                .map_err(|_| invalid(format!("array of {} entries", items.len())))?;
            return Ok(len.to_be_bytes().to_vec());
        }
        encode_value(&self.field_kind(type_name)?, value)
    }
}

/// `T[N]` or `T[]` into the entry type and the fixed size
fn split_array<'t>(type_name: &str, stripped: &'t str) -> Result<(&'t str, Option<u32>), SignerError> {
    let open = stripped
        .rfind('[')
        .ok_or_else(|| invalid(format!("unknown type {}", type_name)))?;
    let size = &stripped[open + 1..];
    let size = if size.is_empty() {
        None
    } else {
        Some(
            size.parse()
                .map_err(|_| invalid(format!("unknown type {}", type_name)))?,
        )
    };
    Ok((&stripped[..open], size))
}

/// Byte width of `uintN`/`intN`, 32 when `N` is omitted
fn integer_width(type_name: &str, bits: &str) -> Result<u32, SignerError> {
    if bits.is_empty() {
        return Ok(32);
    }
    let bits: u32 = bits
        .parse()
        .map_err(|_| invalid(format!("unknown type {}", type_name)))?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(invalid(format!("unknown type {}", type_name)));
    }
    Ok(bits / 8)
}

fn value_text(value: &Value) -> Result<String, SignerError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(invalid(format!("expected a number, got {}", other))),
    }
}

/// The last `width` bytes of a 32-byte word, if the rest is only padding
fn truncate_word(word: [u8; 32], width: u32, pad: u8) -> Option<Vec<u8>> {
    let start = 32usize.checked_sub(width as usize)?;
    if word[..start].iter().all(|b| *b == pad) {
        Some(word[start..].to_vec())
    } else {
        None
    }
}

fn encode_value(kind: &FieldKind, value: &Value) -> Result<Vec<u8>, SignerError> {
    match kind {
        FieldKind::Uint(width) => {
            let text = value_text(value)?;
            let number = U256::from_str(&text)
                .map_err(|e| invalid(format!("uint {}: {}", text, e)))?;
            truncate_word(number.to_be_bytes::<32>(), *width, 0)
                .ok_or_else(|| invalid(format!("{} does not fit in {} bytes", text, width)))
        }
        FieldKind::Int(width) => {
            let text = value_text(value)?;
            let number = I256::from_dec_str(&text)
                .map_err(|e| invalid(format!("int {}: {}", text, e)))?;
            let pad = if number.is_negative() { 0xff } else { 0x00 };
            let bytes = truncate_word(number.to_be_bytes::<32>(), *width, pad)
                .filter(|bytes| (bytes[0] & 0x80 != 0) == number.is_negative())
                .ok_or_else(|| invalid(format!("{} does not fit in {} bytes", text, width)))?;
            Ok(bytes)
        }
        FieldKind::Bytes(width) => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid(format!("expected hex bytes, got {}", value)))?;
            let bytes = hex::decode(text.strip_prefix("0x").unwrap_or(text))
                .map_err(|e| invalid(format!("bytes {}: {}", text, e)))?;
            match width {
                Some(width) if bytes.len() != *width as usize => Err(invalid(format!(
                    "expected {} bytes, got {}",
                    width,
                    bytes.len()
                ))),
                _ => Ok(bytes),
            }
        }
        FieldKind::String => value
            .as_str()
            .map(|text| text.as_bytes().to_vec())
            .ok_or_else(|| invalid(format!("expected a string, got {}", value))),
        FieldKind::Bool => value
            .as_bool()
            .map(|flag| vec![u8::from(flag)])
            .ok_or_else(|| invalid(format!("expected a bool, got {}", value))),
        FieldKind::Address => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid(format!("expected an address, got {}", value)))?;
            let address = Address::from_str(text)
                .map_err(|e| invalid(format!("address {}: {}", text, e)))?;
            Ok(address.to_vec())
        }
        FieldKind::Array { .. } | FieldKind::Struct { .. } => {
            Err(invalid(format!("expected a container value, got {}", value)))
        }
    }
}
