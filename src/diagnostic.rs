use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Syntax,
    Structure,
    Security,
    Performance,
    BestPractice,
    Compatibility,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Syntax => "syntax",
            IssueKind::Structure => "structure",
            IssueKind::Security => "security",
            IssueKind::Performance => "performance",
            IssueKind::BestPractice => "best-practice",
            IssueKind::Compatibility => "compatibility",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error or warning found in a generated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    /// 1-based line number in the validated source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            snippet: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Outcome of one validator run. `valid` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn errors_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(move |issue| issue.kind == kind)
    }

    pub fn warnings_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.warnings.iter().filter(move |issue| issue.kind == kind)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid && self.warnings.is_empty() {
            return writeln!(f, "✓ widget source is valid");
        }

        if !self.errors.is_empty() {
            writeln!(f, "✗ {} error(s):", self.errors.len())?;
            write_issues(f, &self.errors)?;
        } else {
            writeln!(f, "✓ widget source is valid")?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "⚠ {} warning(s):", self.warnings.len())?;
            write_issues(f, &self.warnings)?;
        }
        Ok(())
    }
}

fn write_issues(f: &mut fmt::Formatter<'_>, issues: &[ValidationIssue]) -> fmt::Result {
    for (i, issue) in issues.iter().enumerate() {
        writeln!(
            f,
            "  {}. [{}] {}",
            i + 1,
            issue.kind.as_str().to_uppercase(),
            issue.message
        )?;
        match (issue.line, &issue.snippet) {
            (Some(line), Some(snippet)) => writeln!(f, "     line {}: {}", line, snippet)?,
            (Some(line), None) => writeln!(f, "     line {}", line)?,
            (None, Some(snippet)) => writeln!(f, "     {}", snippet)?,
            (None, None) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_follows_errors() {
        let ok = ValidationResult::new(
            vec![],
            vec![ValidationIssue::new(IssueKind::Security, "unescaped")],
        );
        assert!(ok.valid);

        let bad = ValidationResult::new(
            vec![ValidationIssue::new(IssueKind::Syntax, "broken").at_line(3)],
            vec![],
        );
        assert!(!bad.valid);
        assert_eq!(bad.errors_of(IssueKind::Syntax).count(), 1);
        assert_eq!(bad.errors_of(IssueKind::Structure).count(), 0);
    }

    #[test]
    fn test_report_format() {
        let result = ValidationResult::new(
            vec![ValidationIssue::new(IssueKind::Syntax, "Orphaned <?php tag")
                .at_line(12)
                .with_snippet("<?php")],
            vec![ValidationIssue::new(IssueKind::BestPractice, "Global selector")],
        );
        let report = result.to_string();
        assert!(report.contains("✗ 1 error(s):"));
        assert!(report.contains("1. [SYNTAX] Orphaned <?php tag"));
        assert!(report.contains("line 12: <?php"));
        assert!(report.contains("⚠ 1 warning(s):"));
        assert!(report.contains("[BEST-PRACTICE] Global selector"));
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&IssueKind::BestPractice).unwrap();
        assert_eq!(json, "\"best-practice\"");
    }
}
