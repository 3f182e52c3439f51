use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error type for hierarchy code parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("hierarchy code is empty")]
    Empty,
    #[error("invalid segment {segment:?} in hierarchy code {code:?}")]
    InvalidSegment { code: String, segment: String },
}

/// Outline position in the work breakdown structure, e.g. `1.2.10`.
///
/// Ordering compares segment by segment numerically, so `1.9 < 1.10` and a
/// code always sorts directly before its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HierarchyCode(Vec<u32>);

impl HierarchyCode {
    pub fn parse(text: &str) -> Result<Self, CodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CodeError::Empty);
        }
        let mut segments = Vec::new();
        for segment in text.split('.') {
            match segment.trim().parse::<u32>() {
                Ok(n) if n > 0 => segments.push(n),
                _ => {
                    return Err(CodeError::InvalidSegment {
                        code: text.to_string(),
                        segment: segment.to_string(),
                    });
                }
            }
        }
        Ok(HierarchyCode(segments))
    }

    /// A single-segment code like `3`. Zero is bumped to 1.
    pub fn top_level(n: u32) -> Self {
        HierarchyCode(vec![n.max(1)])
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// Number of segments; `1.2.10` is level 3.
    pub fn outline_level(&self) -> usize {
        self.0.len()
    }

    pub fn parent(&self) -> Option<HierarchyCode> {
        if self.0.len() > 1 {
            Some(HierarchyCode(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    /// Strict-prefix ancestors, outermost first: `1.2.3` yields `1`, `1.2`.
    pub fn ancestors(&self) -> impl Iterator<Item = HierarchyCode> + '_ {
        (1..self.0.len()).map(move |len| HierarchyCode(self.0[..len].to_vec()))
    }

    /// True if `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &HierarchyCode) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    pub fn child(&self, n: u32) -> HierarchyCode {
        let mut segments = self.0.clone();
        segments.push(n.max(1));
        HierarchyCode(segments)
    }
}

impl fmt::Display for HierarchyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for HierarchyCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HierarchyCode::parse(s)
    }
}

impl TryFrom<String> for HierarchyCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HierarchyCode::parse(&value)
    }
}

impl From<HierarchyCode> for String {
    fn from(code: HierarchyCode) -> Self {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> HierarchyCode {
        HierarchyCode::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let c = code("1.2.10");
        assert_eq!(c.segments(), &[1, 2, 10]);
        assert_eq!(c.to_string(), "1.2.10");
        assert_eq!(c.outline_level(), 3);
    }

    #[test]
    fn test_parse_rejects_bad_segments() {
        assert_eq!(HierarchyCode::parse(""), Err(CodeError::Empty));
        assert!(HierarchyCode::parse("1..2").is_err());
        assert!(HierarchyCode::parse("1.a").is_err());
        assert!(HierarchyCode::parse("0.1").is_err());
        assert!(HierarchyCode::parse("1.-2").is_err());
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(code("1.9") < code("1.10"));
        assert!(code("1") < code("1.1"));
        assert!(code("1.10.5") < code("2"));
        assert!(code("2") < code("10"));
    }

    #[test]
    fn test_ancestors() {
        let ancestors: Vec<String> = code("1.2.3").ancestors().map(|c| c.to_string()).collect();
        assert_eq!(ancestors, vec!["1", "1.2"]);
        assert_eq!(code("4").ancestors().count(), 0);
        assert_eq!(code("1.2.3").parent(), Some(code("1.2")));
        assert_eq!(code("1").parent(), None);
    }

    #[test]
    fn test_is_ancestor_of() {
        assert!(code("1").is_ancestor_of(&code("1.2")));
        assert!(code("1.2").is_ancestor_of(&code("1.2.7")));
        assert!(!code("1.2").is_ancestor_of(&code("1.2")));
        assert!(!code("1.2").is_ancestor_of(&code("1.20")));
        assert!(!code("1.2").is_ancestor_of(&code("1")));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&code("3.1")).unwrap();
        assert_eq!(json, "\"3.1\"");
        let back: HierarchyCode = serde_json::from_str("\"3.1\"").unwrap();
        assert_eq!(back, code("3.1"));
        assert!(serde_json::from_str::<HierarchyCode>("\"x\"").is_err());
    }
}
