use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

const SCHEME: &str = "gist://";

/// Logical address of a file handed to the content provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentAddress {
    pub gist_id: String,
    pub path: String,
}

impl ContentAddress {
    pub fn new(gist_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            gist_id: gist_id.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.gist_id, self.path)
    }
}

impl FromStr for ContentAddress {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| SyncError::configuration(format!("not a gist address: {}", s)))?;
        match rest.split_once('/') {
            Some((id, path)) if !id.is_empty() && !path.is_empty() => Ok(Self::new(id, path)),
            _ => Err(SyncError::configuration(format!(
                "gist address needs an id and a path: {}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_scheme() {
        let addr = ContentAddress::new("abc", "src/main.rs");
        assert_eq!(addr.to_string(), "gist://abc/src/main.rs");
    }

    #[test]
    fn parses_nested_path() {
        let addr: ContentAddress = "gist://abc/src/main.rs".parse().unwrap();
        assert_eq!(addr.gist_id, "abc");
        assert_eq!(addr.path, "src/main.rs");
    }

    #[test]
    fn rejects_foreign_scheme_and_missing_path() {
        assert!("file:///tmp/x".parse::<ContentAddress>().is_err());
        assert!("gist://abc".parse::<ContentAddress>().is_err());
        assert!("gist://abc/".parse::<ContentAddress>().is_err());
    }
}
