use std::fmt;

/// The label attached to a track: either a gallery name or `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    #[default]
    Unknown,
    Known(String),
}

impl Identity {
    /// Returns the gallery name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Unknown => None,
            Identity::Known(name) => Some(name),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Unknown => write!(f, "Unknown"),
            Identity::Known(name) => write!(f, "{name}"),
        }
    }
}

impl From<Option<String>> for Identity {
    fn from(name: Option<String>) -> Self {
        name.map_or(Identity::Unknown, Identity::Known)
    }
}
