//! Security gate consulted by the scanner before and after a module loads.
//!
//! Only the accept/reject contract lives here; concrete policies are
//! supplied by the embedding application.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use plughost_sdk::PluginDeclaration;

use crate::module::LoadedModule;

/// Severity of a security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Findings at this level or above reject the module.
    pub fn is_blocking(self) -> bool {
        self >= RiskLevel::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One issue reported by a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityFinding {
    pub level: RiskLevel,
    pub message: String,
}

impl SecurityFinding {
    pub fn new(level: RiskLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub risk_level: RiskLevel,
    pub issues: Vec<SecurityFinding>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// No issues, no warnings.
    pub fn accepted() -> Self {
        Self {
            valid: true,
            risk_level: RiskLevel::None,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Derive validity and overall risk from the findings.
    pub fn from_findings(issues: Vec<SecurityFinding>, warnings: Vec<String>) -> Self {
        let risk_level = issues
            .iter()
            .map(|i| i.level)
            .max()
            .unwrap_or(RiskLevel::None);
        Self {
            valid: !risk_level.is_blocking(),
            risk_level,
            issues,
            warnings,
        }
    }

    /// Whether the scanner must reject what was validated.
    ///
    /// A hand-built result can claim `valid` while carrying blocking
    /// findings; those still reject.
    pub fn is_rejected(&self) -> bool {
        !self.valid
            || self.risk_level.is_blocking()
            || self.issues.iter().any(|i| i.level.is_blocking())
    }

    /// One-line summary for logs and errors.
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return format!("risk {}", self.risk_level);
        }
        let messages: Vec<&str> = self.issues.iter().map(|i| i.message.as_str()).collect();
        format!("risk {}: {}", self.risk_level, messages.join("; "))
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::accepted()
    }
}

/// Accept/reject contract consulted while scanning.
///
/// Every check defaults to accepting, so a gate only overrides what it cares about.
pub trait SecurityGate: Send + Sync {
    /// Called before a file is loaded.
    fn validate_path(&self, _path: &Path) -> ValidationResult {
        ValidationResult::accepted()
    }

    /// Called after a module is loaded, before its plugins are enumerated.
    fn validate_module(&self, _module: &LoadedModule) -> ValidationResult {
        ValidationResult::accepted()
    }

    /// Called with the plugin classes a module declares.
    fn validate_types(&self, _declarations: &[PluginDeclaration]) -> ValidationResult {
        ValidationResult::accepted()
    }
}

/// Gate that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

impl SecurityGate for AllowAllGate {}
