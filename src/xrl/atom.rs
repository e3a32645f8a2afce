//! Typed, name-tagged argument atoms.
//!
//! Atoms are value types: cheap to clone, immutable once built. Each atom
//! carries its name so arguments can be looked up by name as well as by
//! position, and its declared type survives a render/parse round trip.

use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::XrlParseError;
use crate::net::{Ipv4Net, Ipv6Net, Mac};

/// The value half of an atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomValue {
    I32(i32),
    U32(u32),
    I64(i64),
    Bool(bool),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Ipv4Net(Ipv4Net),
    Ipv6Net(Ipv6Net),
    Mac(Mac),
    Text(String),
    Binary(Vec<u8>),
    List(Vec<AtomValue>),
}

impl AtomValue {
    /// The wire type tag. Lists render their element type recursively; an
    /// empty list falls back to `txt` elements.
    #[must_use]
    pub fn type_tag(&self) -> String {
        match self {
            Self::I32(_) => "i32".to_string(),
            Self::U32(_) => "u32".to_string(),
            Self::I64(_) => "i64".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Ipv4(_) => "ipv4".to_string(),
            Self::Ipv6(_) => "ipv6".to_string(),
            Self::Ipv4Net(_) => "ipv4net".to_string(),
            Self::Ipv6Net(_) => "ipv6net".to_string(),
            Self::Mac(_) => "mac".to_string(),
            Self::Text(_) => "txt".to_string(),
            Self::Binary(_) => "binary".to_string(),
            Self::List(elems) => match elems.first() {
                Some(e) => format!("list<{}>", e.type_tag()),
                None => "list<txt>".to_string(),
            },
        }
    }

    /// Renders the value in escaped text form, without the type tag.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::I32(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Ipv4(v) => v.to_string(),
            Self::Ipv6(v) => v.to_string(),
            Self::Ipv4Net(v) => v.to_string(),
            Self::Ipv6Net(v) => v.to_string(),
            Self::Mac(v) => v.to_string(),
            Self::Text(v) => escape(v.as_bytes()),
            Self::Binary(v) => v.iter().map(|b| format!("{b:02x}")).collect(),
            Self::List(elems) => elems
                .iter()
                .map(|e| match e {
                    // A nested list renders with bare commas of its own, so
                    // the whole element is escaped to keep the outer commas
                    // unambiguous.
                    AtomValue::List(_) => escape(e.render().as_bytes()),
                    _ => e.render(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Parses a value of the given declared type from escaped text.
    pub fn parse(type_tag: &str, text: &str) -> Result<Self, XrlParseError> {
        let bad = || XrlParseError::BadValue {
            atom_type: type_tag.to_string(),
            value: text.to_string(),
        };
        match type_tag {
            "i32" => text.parse().map(Self::I32).map_err(|_| bad()),
            "u32" => text.parse().map(Self::U32).map_err(|_| bad()),
            "i64" => text.parse().map(Self::I64).map_err(|_| bad()),
            "bool" => text.parse().map(Self::Bool).map_err(|_| bad()),
            "ipv4" => text.parse().map(Self::Ipv4).map_err(|_| bad()),
            "ipv6" => text.parse().map(Self::Ipv6).map_err(|_| bad()),
            "ipv4net" => text.parse().map(Self::Ipv4Net).map_err(|_| bad()),
            "ipv6net" => text.parse().map(Self::Ipv6Net).map_err(|_| bad()),
            "mac" => text.parse().map(Self::Mac),
            "txt" => unescape(text)
                .and_then(|b| String::from_utf8(b).map_err(|_| bad()))
                .map(Self::Text),
            "binary" => parse_hex(text).map(Self::Binary).map_err(|_| bad()),
            _ => {
                let inner = type_tag
                    .strip_prefix("list<")
                    .and_then(|t| t.strip_suffix('>'))
                    .ok_or_else(|| XrlParseError::UnknownAtomType(type_tag.to_string()))?;
                if text.is_empty() {
                    return Ok(Self::List(Vec::new()));
                }
                // Scalar elements never contain a bare comma and nested-list
                // elements are escaped whole, so a bare comma always
                // separates top-level elements.
                text.split(',')
                    .map(|elem| {
                        if inner.starts_with("list<") {
                            let raw = unescape(elem)?;
                            let elem = String::from_utf8(raw).map_err(|_| bad())?;
                            Self::parse(inner, &elem)
                        } else {
                            Self::parse(inner, elem)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::List)
            }
        }
    }
}

/// A named, typed argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrlAtom {
    name: String,
    value: AtomValue,
}

impl XrlAtom {
    pub fn new(name: impl Into<String>, value: AtomValue) -> Result<Self, XrlParseError> {
        let name = name.into();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(XrlParseError::MalformedArgument(name));
        }
        Ok(Self { name, value })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &AtomValue {
        &self.value
    }
}

impl Display for XrlAtom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}={}",
            self.name,
            self.value.type_tag(),
            self.value.render()
        )
    }
}

impl FromStr for XrlAtom {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || XrlParseError::MalformedArgument(s.to_string());
        let (head, value_text) = s.split_once('=').ok_or_else(malformed)?;
        let (name, type_tag) = head.split_once(':').ok_or_else(malformed)?;
        let value = AtomValue::parse(type_tag, value_text)?;
        XrlAtom::new(name, value)
    }
}

/// Bytes that pass through the text syntax unescaped.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-escapes arbitrary bytes for embedding in the Xrl text syntax.
#[must_use]
pub fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

/// Reverses [`escape`]. Fails on truncated or non-hex escapes.
pub fn unescape(text: &str) -> Result<Vec<u8>, XrlParseError> {
    let bad = || XrlParseError::BadValue {
        atom_type: "txt".to_string(),
        value: text.to_string(),
    };
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().ok_or_else(bad)?;
            let lo = bytes.next().ok_or_else(bad)?;
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).map_err(|_| bad())?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| bad())?);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

fn parse_hex(text: &str) -> Result<Vec<u8>, ()> {
    if text.len() % 2 != 0 {
        return Err(());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(atom: &XrlAtom) {
        let rendered = atom.to_string();
        let parsed: XrlAtom = rendered.parse().unwrap();
        assert_eq!(&parsed, atom, "through {rendered:?}");
    }

    #[test]
    fn scalar_atoms_round_trip() {
        round_trip(&XrlAtom::new("a", AtomValue::I32(-123_456)).unwrap());
        round_trip(&XrlAtom::new("b", AtomValue::U32(u32::MAX)).unwrap());
        round_trip(&XrlAtom::new("c", AtomValue::I64(i64::MIN)).unwrap());
        round_trip(&XrlAtom::new("d", AtomValue::Bool(true)).unwrap());
        round_trip(&XrlAtom::new("e", AtomValue::Ipv4("10.0.0.1".parse().unwrap())).unwrap());
        round_trip(&XrlAtom::new("f", AtomValue::Ipv6("2001:db8::1".parse().unwrap())).unwrap());
        round_trip(
            &XrlAtom::new("g", AtomValue::Ipv4Net("10.1.0.0/16".parse().unwrap())).unwrap(),
        );
        round_trip(&XrlAtom::new("h", AtomValue::Mac("00:11:22:33:44:55".parse().unwrap())).unwrap());
    }

    #[test]
    fn text_with_reserved_characters_round_trips() {
        let awkward = "a&b=c/d?e:f%g,h i\nj";
        round_trip(&XrlAtom::new("note", AtomValue::Text(awkward.to_string())).unwrap());
        let rendered = XrlAtom::new("note", AtomValue::Text(awkward.to_string()))
            .unwrap()
            .to_string();
        assert!(!rendered.contains('&'));
        assert!(!rendered.contains(' '));
    }

    #[test]
    fn binary_round_trips() {
        round_trip(&XrlAtom::new("blob", AtomValue::Binary(vec![0, 1, 2, 254, 255])).unwrap());
        round_trip(&XrlAtom::new("empty", AtomValue::Binary(vec![])).unwrap());
    }

    #[test]
    fn lists_round_trip() {
        round_trip(
            &XrlAtom::new(
                "xs",
                AtomValue::List(vec![AtomValue::I32(1), AtomValue::I32(2), AtomValue::I32(3)]),
            )
            .unwrap(),
        );
        round_trip(&XrlAtom::new("empty", AtomValue::List(vec![])).unwrap());
        round_trip(
            &XrlAtom::new(
                "texts",
                AtomValue::List(vec![
                    AtomValue::Text("a,b".to_string()),
                    AtomValue::Text("c".to_string()),
                ]),
            )
            .unwrap(),
        );
    }

    #[test]
    fn nested_lists_round_trip() {
        round_trip(
            &XrlAtom::new(
                "matrix",
                AtomValue::List(vec![
                    AtomValue::List(vec![AtomValue::I32(1), AtomValue::I32(2)]),
                    AtomValue::List(vec![AtomValue::I32(3)]),
                ]),
            )
            .unwrap(),
        );
    }

    #[test]
    fn list_type_tag_is_recursive() {
        let v = AtomValue::List(vec![AtomValue::U32(7)]);
        assert_eq!(v.type_tag(), "list<u32>");
        let empty = AtomValue::List(vec![]);
        assert_eq!(empty.type_tag(), "list<txt>");
    }

    #[test]
    fn malformed_atoms_rejected() {
        assert!("noequals".parse::<XrlAtom>().is_err());
        assert!("name=3".parse::<XrlAtom>().is_err()); // no type tag
        assert!("n:i32=abc".parse::<XrlAtom>().is_err());
        assert!("n:wat=1".parse::<XrlAtom>().is_err());
        assert!("bad name:i32=1".parse::<XrlAtom>().is_err());
        assert!("n:binary=abc".parse::<XrlAtom>().is_err()); // odd length
        assert!("n:txt=%G1".parse::<XrlAtom>().is_err());
        assert!("n:txt=%2".parse::<XrlAtom>().is_err());
    }
}
