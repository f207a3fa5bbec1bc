use core::fmt;

use serde::{
    de::{self, DeserializeOwned, Error as _, IgnoredAny},
    Deserialize,
};
use serde_bencode::{value::Value, Deserializer, Error};
use serde_bytes::ByteBuf;

/// Decodes exactly one value, rejecting anything left after it.
pub(crate) fn from_bytes<T: DeserializeOwned>(raw: &[u8]) -> Result<T, Error> {
    let mut rest = raw;
    let value = T::deserialize(&mut Deserializer::new(&mut rest))?;

    if !rest.is_empty() {
        return Err(Error::Custom(format!(
            "{} trailing bytes after value",
            rest.len()
        )));
    }

    Ok(value)
}

/// Like [`from_bytes`], for values that must be dictionaries on the wire.
pub(crate) fn from_dict_bytes<T: DeserializeOwned>(raw: &[u8]) -> Result<T, Error> {
    if !raw.starts_with(b"d") {
        return Err(Error::InvalidType("expected a dictionary".to_string()));
    }

    from_bytes(raw)
}

/// Finds the exact wire bytes stored under `key` in a dictionary.
///
/// Keys are walked in wire order, whatever that order is, and values are
/// skipped without being interpreted.
pub(crate) fn value_span<'a>(raw: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>, Error> {
    let mut rest = raw
        .strip_prefix(b"d")
        .ok_or_else(|| Error::InvalidType("expected a dictionary".to_string()))?;

    while !rest.starts_with(b"e") {
        let name = ByteBuf::deserialize(&mut Deserializer::new(&mut rest))?;

        let start = rest;
        IgnoredAny::deserialize(&mut Deserializer::new(&mut rest))?;

        if name.as_slice() == key {
            return Ok(Some(&start[..start.len() - rest.len()]));
        }
    }

    Ok(None)
}

/// Prefixes errors raised inside a nested value with the key it sits under.
pub(crate) fn under_key<'de, D, T>(key: &'static str, deserializer: D) -> Result<T, D::Error>
where
    D: de::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map_err(|err| D::Error::custom(format_args!("{key}: {err}")))
}

/// Renders a loosely typed value, to report what was received when a
/// strictly shaped one was expected.
pub(crate) struct Shown<'a>(pub &'a Value);

fn fmt_bytes(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match core::str::from_utf8(bytes) {
        Ok(text) => write!(f, "{text:?}"),
        Err(_) => write!(f, "{bytes:?}"),
    }
}

impl fmt::Display for Shown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Bytes(bytes) => fmt_bytes(bytes, f),
            Value::Int(int) => write!(f, "{int}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Shown(item))?;
                }
                f.write_str("]")
            }
            Value::Dict(pairs) => {
                // Sorted, since the map forgot the wire order.
                let mut pairs = pairs.iter().collect::<Vec<_>>();
                pairs.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

                f.write_str("{")?;
                for (i, (key, item)) in pairs.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_bytes(key, f)?;
                    write!(f, ": {}", Shown(item))?;
                }
                f.write_str("}")
            }
        }
    }
}
