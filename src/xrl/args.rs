//! Ordered, name-addressable argument lists.

use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::XrlParseError;
use crate::net::{Ipv4Net, Ipv6Net};
use crate::xrl::atom::{AtomValue, XrlAtom};

/// The typed heterogeneous argument list of an Xrl.
///
/// Atoms keep their insertion order (position matters on the wire) but may
/// also be fetched by name. Names are unique within one list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct XrlArgs {
    atoms: Vec<XrlAtom>,
}

impl XrlArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom, rejecting duplicate names.
    pub fn add(&mut self, atom: XrlAtom) -> Result<(), XrlParseError> {
        if self.get(atom.name()).is_some() {
            return Err(XrlParseError::DuplicateArgument(atom.name().to_string()));
        }
        self.atoms.push(atom);
        Ok(())
    }

    /// Builder-style `add` for literals; panics on duplicate or bad name,
    /// which makes it suitable for statically-known argument lists only.
    #[must_use]
    pub fn with(mut self, name: &str, value: AtomValue) -> Self {
        let atom = XrlAtom::new(name, value).expect("valid atom name");
        self.add(atom).expect("unique atom name");
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AtomValue> {
        self.atoms
            .iter()
            .find(|a| a.name() == name)
            .map(XrlAtom::value)
    }

    #[must_use]
    pub fn atoms(&self) -> &[XrlAtom] {
        &self.atoms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(AtomValue::I32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(AtomValue::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(AtomValue::I64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(AtomValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(AtomValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_ipv4(&self, name: &str) -> Option<Ipv4Addr> {
        match self.get(name) {
            Some(AtomValue::Ipv4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_ipv6(&self, name: &str) -> Option<Ipv6Addr> {
        match self.get(name) {
            Some(AtomValue::Ipv6(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_ipv4net(&self, name: &str) -> Option<Ipv4Net> {
        match self.get(name) {
            Some(AtomValue::Ipv4Net(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_ipv6net(&self, name: &str) -> Option<Ipv6Net> {
        match self.get(name) {
            Some(AtomValue::Ipv6Net(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_binary(&self, name: &str) -> Option<&[u8]> {
        match self.get(name) {
            Some(AtomValue::Binary(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_list(&self, name: &str) -> Option<&[AtomValue]> {
        match self.get(name) {
            Some(AtomValue::List(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl Display for XrlArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for atom in &self.atoms {
            if !first {
                f.write_str("&")?;
            }
            first = false;
            atom.fmt(f)?;
        }
        Ok(())
    }
}

impl FromStr for XrlArgs {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut args = XrlArgs::new();
        if s.is_empty() {
            return Ok(args);
        }
        for part in s.split('&') {
            args.add(part.parse()?)?;
        }
        Ok(args)
    }
}
