//! The inventory tree produced by a parser scan

use serde::{Deserialize, Serialize};

/// A single file the parser identified as containing tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub framework: String,
    #[serde(default)]
    pub domain_hints: Vec<String>,
    #[serde(default)]
    pub suites: Vec<ParsedSuite>,
    /// Tests attached directly to the file, outside any suite (e.g. a bare
    /// `test "..."` block at module scope). The inventory store gives these
    /// a synthetic depth-0 suite named after the file path.
    #[serde(default)]
    pub tests: Vec<ParsedTest>,
}

/// A suite node, optionally nested inside another suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSuite {
    pub name: String,
    pub line_number: Option<u32>,
    #[serde(default)]
    pub suites: Vec<ParsedSuite>,
    #[serde(default)]
    pub tests: Vec<ParsedTest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Active,
    Skipped,
    Todo,
    Focused,
    Xfail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTest {
    pub name: String,
    pub line_number: Option<u32>,
    #[serde(default = "default_status")]
    pub status: TestStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    pub modifier: Option<String>,
}

const fn default_status() -> TestStatus {
    TestStatus::Active
}

/// Full scan result over one `Source`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub files: Vec<ParsedFile>,
    pub parser_version: Option<String>,
}

impl Inventory {
    pub fn total_suites(&self) -> usize {
        self.files
            .iter()
            .map(|f| {
                let synthetic = usize::from(!f.tests.is_empty());
                f.suites.iter().map(count_suites).sum::<usize>() + synthetic
            })
            .sum()
    }

    pub fn total_tests(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.tests.len() + f.suites.iter().map(count_tests).sum::<usize>())
            .sum()
    }
}

fn count_suites(suite: &ParsedSuite) -> usize {
    1 + suite.suites.iter().map(count_suites).sum::<usize>()
}

fn count_tests(suite: &ParsedSuite) -> usize {
    suite.tests.len() + suite.suites.iter().map(count_tests).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_nested_suites_and_tests() {
        let inventory = Inventory {
            files: vec![ParsedFile {
                path: "a_test.rb".to_string(),
                framework: "rspec".to_string(),
                domain_hints: vec![],
                tests: vec![],
                suites: vec![ParsedSuite {
                    name: "Widget".to_string(),
                    line_number: Some(1),
                    suites: vec![ParsedSuite {
                        name: "#render".to_string(),
                        line_number: Some(2),
                        suites: vec![],
                        tests: vec![ParsedTest {
                            name: "renders".to_string(),
                            line_number: Some(3),
                            status: TestStatus::Active,
                            tags: vec![],
                            modifier: None,
                        }],
                    }],
                    tests: vec![],
                }],
            }],
            parser_version: Some("1.0.0".to_string()),
        };

        assert_eq!(inventory.total_suites(), 2);
        assert_eq!(inventory.total_tests(), 1);
    }

    #[test]
    fn test_file_level_tests_count_as_one_synthetic_suite() {
        let inventory = Inventory {
            files: vec![ParsedFile {
                path: "standalone_test.rb".to_string(),
                framework: "minitest".to_string(),
                domain_hints: vec![],
                suites: vec![],
                tests: vec![ParsedTest {
                    name: "bare assertion".to_string(),
                    line_number: Some(1),
                    status: TestStatus::Active,
                    tags: vec![],
                    modifier: None,
                }],
            }],
            parser_version: Some("1.0.0".to_string()),
        };

        assert_eq!(inventory.total_suites(), 1);
        assert_eq!(inventory.total_tests(), 1);
    }
}
