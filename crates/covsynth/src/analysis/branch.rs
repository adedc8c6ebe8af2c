//! Branch model: functions, decision edges and the per-source branch map.
//!
//! Branch ids are typed so they cannot be confused with free-form strings
//! coming back from a test runner; the only way to get one from text is
//! [`BranchId::from_str`], and the coverage interpreter still checks every
//! parsed id against the map.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which edge of a two-way decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Condition held; the `if` suite runs
    Taken,
    /// Condition failed; the `else` suite runs or control falls through
    NotTaken,
}

impl Outcome {
    /// Label used inside branch ids
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Taken => "true",
            Self::NotTaken => "false",
        }
    }
}

/// Stable identifier of one decision edge: `function:index:true|false`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId {
    function: String,
    index: u32,
    outcome: Outcome,
}

impl BranchId {
    #[must_use]
    pub fn new(function: impl Into<String>, index: u32, outcome: Outcome) -> Self {
        Self {
            function: function.into(),
            index,
            outcome,
        }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Position of the decision within its function, depth-first
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Id of the opposite edge of the same decision
    #[must_use]
    pub fn sibling(&self) -> Self {
        let outcome = match self.outcome {
            Outcome::Taken => Outcome::NotTaken,
            Outcome::NotTaken => Outcome::Taken,
        };
        Self::new(self.function.clone(), self.index, outcome)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.function, self.index, self.outcome.label())
    }
}

/// Error parsing a branch id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid branch id '{0}'")]
pub struct ParseBranchIdError(String);

impl FromStr for BranchId {
    type Err = ParseBranchIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseBranchIdError(s.to_string());
        let mut parts = s.rsplitn(3, ':');
        let outcome = match parts.next() {
            Some("true") => Outcome::Taken,
            Some("false") => Outcome::NotTaken,
            _ => return Err(invalid()),
        };
        let index = parts
            .next()
            .and_then(|i| i.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let function = parts.next().filter(|f| !f.is_empty()).ok_or_else(invalid)?;
        Ok(Self::new(function, index, outcome))
    }
}

impl Serialize for BranchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BranchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Lines covered by a function definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// A function definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub span: SourceSpan,
}

/// One edge of a two-way decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    /// Line of the `if` keyword
    pub line: usize,
    /// Condition source text
    pub condition: String,
    /// First line executed when this edge is followed; `None` for the
    /// fall-through edge of an `if` without `else`
    pub target_line: Option<usize>,
}

impl Branch {
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.id.outcome
    }

    /// Short human description, e.g. `divide line 3: b == 0 is true`
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} line {}: {} is {}",
            self.id.function,
            self.line,
            self.condition,
            self.id.outcome.label()
        )
    }
}

/// A function and its branches in extraction order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBranches {
    pub function: Function,
    pub branches: Vec<Branch>,
}

/// Every decision edge of one source text, grouped by function.
///
/// Built once by the extractor and read-only afterwards; a changed source
/// gets a new map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchMap {
    functions: Vec<FunctionBranches>,
    total_branches: usize,
    #[serde(skip)]
    index: HashMap<BranchId, (usize, usize)>,
}

impl BranchMap {
    /// Builds a map; branch ids are expected to be unique
    #[must_use]
    pub fn new(functions: Vec<FunctionBranches>) -> Self {
        let mut index = HashMap::new();
        for (fi, entry) in functions.iter().enumerate() {
            for (bi, branch) in entry.branches.iter().enumerate() {
                index.insert(branch.id.clone(), (fi, bi));
            }
        }
        let total_branches = index.len();
        Self {
            functions,
            total_branches,
            index,
        }
    }

    #[must_use]
    pub fn functions(&self) -> &[FunctionBranches] {
        &self.functions
    }

    /// All branches in map order
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.functions.iter().flat_map(|f| f.branches.iter())
    }

    /// All branch ids in map order
    pub fn ids(&self) -> impl Iterator<Item = &BranchId> {
        self.branches().map(|b| &b.id)
    }

    #[must_use]
    pub const fn total_branches(&self) -> usize {
        self.total_branches
    }

    /// Number of two-way decisions
    #[must_use]
    pub const fn decision_count(&self) -> usize {
        self.total_branches / 2
    }

    #[must_use]
    pub fn get(&self, id: &BranchId) -> Option<&Branch> {
        let &(fi, bi) = self.index.get(id)?;
        self.functions.get(fi)?.branches.get(bi)
    }

    #[must_use]
    pub fn contains(&self, id: &BranchId) -> bool {
        self.index.contains_key(id)
    }

    /// Functions without any decision
    pub fn straight_line_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions
            .iter()
            .filter(|f| f.branches.is_empty())
            .map(|f| &f.function)
    }

    /// Tests needed at minimum: one per branch plus one call per
    /// straight-line function
    #[must_use]
    pub fn required_tests(&self) -> usize {
        self.total_branches + self.straight_line_functions().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_id_display_and_parse() {
        let id = BranchId::new("divide", 2, Outcome::NotTaken);
        assert_eq!(id.to_string(), "divide:2:false");
        assert_eq!("divide:2:false".parse::<BranchId>().unwrap(), id);
    }

    #[test]
    fn test_branch_id_rejects_malformed() {
        for bad in ["", "f", "f:1", "f:x:true", ":0:true", "f:0:maybe", "f:-1:true"] {
            assert!(bad.parse::<BranchId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_branch_id_serializes_as_string() {
        let id = BranchId::new("f", 0, Outcome::Taken);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"f:0:true\"");
        let back: BranchId = serde_json::from_str("\"f:0:true\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_sibling() {
        let id = BranchId::new("g", 1, Outcome::Taken);
        assert_eq!(id.sibling(), BranchId::new("g", 1, Outcome::NotTaken));
        assert_eq!(id.sibling().sibling(), id);
    }

    fn sample_map() -> BranchMap {
        let branch = |f: &str, i, o| Branch {
            id: BranchId::new(f, i, o),
            line: 2,
            condition: "a > b".into(),
            target_line: Some(3),
        };
        let func = |name: &str| Function {
            name: name.into(),
            params: vec!["a".into(), "b".into()],
            span: SourceSpan {
                start_line: 1,
                end_line: 5,
            },
        };
        BranchMap::new(vec![
            FunctionBranches {
                function: func("f"),
                branches: vec![branch("f", 0, Outcome::Taken), branch("f", 0, Outcome::NotTaken)],
            },
            FunctionBranches {
                function: func("g"),
                branches: vec![],
            },
        ])
    }

    #[test]
    fn test_map_lookup_and_counts() {
        let map = sample_map();
        assert_eq!(map.total_branches(), 2);
        assert_eq!(map.decision_count(), 1);
        assert_eq!(map.required_tests(), 3);
        assert!(map.contains(&BranchId::new("f", 0, Outcome::Taken)));
        assert!(!map.contains(&BranchId::new("g", 0, Outcome::Taken)));
        let branch = map.get(&BranchId::new("f", 0, Outcome::NotTaken)).unwrap();
        assert_eq!(branch.describe(), "f line 2: a > b is false");
    }

    #[test]
    fn test_map_serialization_skips_index() {
        let json = serde_json::to_value(sample_map()).unwrap();
        assert_eq!(json["total_branches"], 2);
        assert!(json.get("index").is_none());
        assert_eq!(json["functions"][0]["branches"][1]["id"], "f:0:false");
    }
}
