//! The closed set of cache namespaces

use crate::error::CacheError;
use std::fmt;
use std::str::FromStr;

/// A logical partition of the cache. Keys are scoped to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Thumbnails,
    FaceCrops,
    Files,
}

impl Namespace {
    /// Every registered namespace
    pub const ALL: [Namespace; 3] = [Namespace::Thumbnails, Namespace::FaceCrops, Namespace::Files];

    /// Store name and directory name for this namespace
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Thumbnails => "thumbnails",
            Namespace::FaceCrops => "face-crops",
            Namespace::Files => "files",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| CacheError::UnknownNamespace(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registered_namespaces() {
        for ns in Namespace::ALL {
            assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
        }
        assert_eq!("face-crops".parse::<Namespace>().unwrap(), Namespace::FaceCrops);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "avatars".parse::<Namespace>().unwrap_err();
        assert!(matches!(err, CacheError::UnknownNamespace(name) if name == "avatars"));

        // Names are exact, not case-folded
        assert!("Thumbnails".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_names_are_distinct() {
        let mut names: Vec<_> = Namespace::ALL.iter().map(|ns| ns.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Namespace::ALL.len());
    }
}
