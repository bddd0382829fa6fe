//! HTTP/2 pseudo-header emission order.

use crate::error::ForwardError;

/// Request pseudo-header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    const ALL: [PseudoHeader; 4] = [
        PseudoHeader::Method,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PseudoHeader::Method => ":method",
            PseudoHeader::Authority => ":authority",
            PseudoHeader::Scheme => ":scheme",
            PseudoHeader::Path => ":path",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|pseudo| pseudo.as_str().eq_ignore_ascii_case(name))
    }
}

/// Order in which the four request pseudo-headers open a HEADERS block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoOrder([PseudoHeader; 4]);

impl Default for PseudoOrder {
    /// `:method, :authority, :scheme, :path`
    fn default() -> Self {
        Self(PseudoHeader::ALL)
    }
}

impl PseudoOrder {
    /// Listed names come first; repeats are ignored and unlisted fields follow
    /// in the default order. Anything that is not a request pseudo-header is
    /// rejected.
    pub fn parse(names: &[String]) -> Result<Self, ForwardError> {
        let mut order: Vec<PseudoHeader> = Vec::with_capacity(4);

        for name in names {
            let pseudo = PseudoHeader::from_name(name).ok_or_else(|| {
                ForwardError::factory(format!("unsupported pseudo-header '{name}'"))
            })?;
            if !order.contains(&pseudo) {
                order.push(pseudo);
            }
        }
        for pseudo in PseudoHeader::ALL {
            if !order.contains(&pseudo) {
                order.push(pseudo);
            }
        }

        Ok(Self([order[0], order[1], order[2], order[3]]))
    }

    pub fn iter(&self) -> impl Iterator<Item = PseudoHeader> + '_ {
        self.0.iter().copied()
    }

    /// Fingerprint shorthand, e.g. `m,a,s,p`.
    pub fn shorthand(&self) -> String {
        self.iter()
            .map(|pseudo| &pseudo.as_str()[1..2])
            .collect::<Vec<_>>()
            .join(",")
    }
}
