//! Stack type registry.

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};

/// Supported stack types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackType {
    /// AWS CloudFormation stack.
    #[default]
    Aws,
    /// Azure Resource Manager deployment.
    Azure,
    /// GCP Deployment Manager deployment.
    Gcp,
    /// Local shell commands.
    Shell,
}

impl StackType {
    /// Accepted spellings of each type. Matching is case-sensitive.
    const NAMES: &'static [(&'static str, StackType)] = &[
        ("AWS", StackType::Aws),
        ("aws", StackType::Aws),
        ("CloudFormation", StackType::Aws),
        ("Cloudformation", StackType::Aws),
        ("cloudformation", StackType::Aws),
        ("Azure", StackType::Azure),
        ("azure", StackType::Azure),
        ("GCP", StackType::Gcp),
        ("gcp", StackType::Gcp),
        ("Shell", StackType::Shell),
        ("shell", StackType::Shell),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StackType::Aws => "AWS",
            StackType::Azure => "Azure",
            StackType::Gcp => "GCP",
            StackType::Shell => "Shell",
        }
    }

    pub fn from_name(name: &str) -> StackResult<Self> {
        Self::NAMES
            .iter()
            .find(|(spelling, _)| *spelling == name)
            .map(|(_, stack_type)| *stack_type)
            .ok_or_else(|| StackError::UnknownType(name.to_string()))
    }

    pub fn all() -> Vec<Self> {
        vec![StackType::Aws, StackType::Azure, StackType::Gcp, StackType::Shell]
    }
}

impl std::fmt::Display for StackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        assert_eq!(StackType::from_name("Cloudformation").unwrap(), StackType::Aws);
        assert_eq!(StackType::from_name("azure").unwrap(), StackType::Azure);
        assert_eq!(StackType::from_name("GCP").unwrap(), StackType::Gcp);
        assert_eq!(StackType::from_name("shell").unwrap(), StackType::Shell);
    }

    #[test]
    fn test_default_is_aws() {
        assert_eq!(StackType::default(), StackType::Aws);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let err = StackType::from_name("AZURE").unwrap_err();
        assert_eq!(err.to_string(), "Stack type not supported: AZURE");
    }

    #[test]
    fn test_display_round_trips() {
        for stack_type in StackType::all() {
            assert_eq!(StackType::from_name(stack_type.as_str()).unwrap(), stack_type);
        }
    }
}
