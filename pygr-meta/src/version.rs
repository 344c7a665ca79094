//! Version constraint parsing and matching
//!
//! Constraints are `op version` with op in `==`, `>=`, `<=`, `>`, `<`; an
//! empty spec matches everything and a bare version means `==`. Versions
//! compare with PEP 440 precedence via pep440_rs.

use std::fmt;
use std::str::FromStr;

use pep440_rs::Version;

use crate::{Error, Result};

/// Comparison operator of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Any,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl ConstraintOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Any => "any",
            ConstraintOp::Eq => "==",
            ConstraintOp::Ge => ">=",
            ConstraintOp::Le => "<=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Lt => "<",
        }
    }
}

/// A parsed version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: ConstraintOp,
    pub version: Option<String>,
}

impl VersionConstraint {
    /// Parse a constraint spec. Never fails: operand validity surfaces on
    /// `matches`, mirroring where invalid versions become observable.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() {
            return Self {
                op: ConstraintOp::Any,
                version: None,
            };
        }

        let (op, rest) = if let Some(rest) = spec.strip_prefix("==") {
            (ConstraintOp::Eq, rest)
        } else if let Some(rest) = spec.strip_prefix(">=") {
            (ConstraintOp::Ge, rest)
        } else if let Some(rest) = spec.strip_prefix("<=") {
            (ConstraintOp::Le, rest)
        } else if let Some(rest) = spec.strip_prefix('>') {
            (ConstraintOp::Gt, rest)
        } else if let Some(rest) = spec.strip_prefix('<') {
            (ConstraintOp::Lt, rest)
        } else if let Some(rest) = spec.strip_prefix('=') {
            (ConstraintOp::Eq, rest)
        } else {
            (ConstraintOp::Eq, spec)
        };

        Self {
            op,
            version: Some(rest.trim().to_string()),
        }
    }

    /// An unconstrained spec
    pub fn any() -> Self {
        Self {
            op: ConstraintOp::Any,
            version: None,
        }
    }

    /// Test a candidate version against this constraint.
    ///
    /// `Any` accepts without parsing the candidate; otherwise both the
    /// operand and the candidate must parse as versions.
    pub fn matches(&self, candidate: &str) -> Result<bool> {
        if self.op == ConstraintOp::Any {
            return Ok(true);
        }

        let operand = self.version.as_deref().unwrap_or_default();
        let wanted = parse_version(operand)?;
        let candidate = parse_version(candidate)?;

        Ok(match self.op {
            ConstraintOp::Any => true,
            ConstraintOp::Eq => candidate == wanted,
            ConstraintOp::Ge => candidate >= wanted,
            ConstraintOp::Le => candidate <= wanted,
            ConstraintOp::Gt => candidate > wanted,
            ConstraintOp::Lt => candidate < wanted,
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.op, &self.version) {
            (ConstraintOp::Any, _) => write!(f, "any"),
            (op, Some(v)) => write!(f, "{}{}", op.as_str(), v),
            (op, None) => write!(f, "{}", op.as_str()),
        }
    }
}

/// Parse a version token with PEP 440 precedence
pub fn parse_version(s: &str) -> Result<Version> {
    Version::from_str(s.trim()).map_err(|_| Error::InvalidVersion(s.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_empty_spec() {
        let c = VersionConstraint::parse("");
        assert_eq!(c.op, ConstraintOp::Any);
        assert!(c.matches("1.0.0").unwrap());
        assert!(c.matches("0.0.1").unwrap());
        // Any never parses the candidate
        assert!(c.matches("anything-parseable").unwrap());
    }

    #[test]
    fn test_equals_implicit() {
        let c = VersionConstraint::parse("1.2.3");
        assert_eq!(c.op, ConstraintOp::Eq);
        assert_eq!(c.version.as_deref(), Some("1.2.3"));
        assert!(c.matches("1.2.3").unwrap());
        assert!(!c.matches("1.2.4").unwrap());
    }

    #[test]
    fn test_equals_explicit() {
        let c = VersionConstraint::parse("== 2.0");
        assert!(c.matches("2.0").unwrap());
        assert!(!c.matches("2.1").unwrap());
    }

    #[test]
    fn test_gte() {
        let c = VersionConstraint::parse(">= 1.0");
        assert!(c.matches("1.0").unwrap());
        assert!(c.matches("2.0").unwrap());
        assert!(!c.matches("0.9").unwrap());
    }

    #[test]
    fn test_gt() {
        let c = VersionConstraint::parse("> 1.0");
        assert!(!c.matches("1.0").unwrap());
        assert!(c.matches("1.1").unwrap());
    }

    #[test]
    fn test_lte() {
        let c = VersionConstraint::parse("<= 2.0");
        assert!(c.matches("2.0").unwrap());
        assert!(c.matches("1.0").unwrap());
        assert!(!c.matches("2.1").unwrap());
    }

    #[test]
    fn test_lt() {
        let c = VersionConstraint::parse("< 2.0");
        assert!(c.matches("1.9").unwrap());
        assert!(!c.matches("2.0").unwrap());
    }

    #[test]
    fn test_invalid_operand_surfaces_on_match() {
        let c = VersionConstraint::parse("== not-a-version");
        assert!(matches!(c.matches("1.0"), Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_invalid_candidate_surfaces_on_match() {
        let c = VersionConstraint::parse(">= 1.0");
        assert!(matches!(
            c.matches("definitely-not-a-version"),
            Err(Error::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(VersionConstraint::parse(">= 1.0").to_string(), ">=1.0");
        assert_eq!(VersionConstraint::parse("").to_string(), "any");
        assert_eq!(VersionConstraint::parse("1.0").to_string(), "==1.0");
    }
}
