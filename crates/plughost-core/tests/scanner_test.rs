//! Candidate Scanner Tests
//!
//! Tests discovery over an on-disk plugin root:
//! - Isolation units and recursive file discovery
//! - Per-file failure containment for native and resident loaders
//! - Security gate rejection at each checkpoint
//! - Preference for resident modules over freshly loaded copies

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{kinds, recording_hub, resident_modules, PluginRoot};
use plughost_core::{
    AllowList, CandidateScanner, LoadedModule, ModuleOrigin, PluginEvent, RiskLevel,
    SecurityFinding, SecurityGate, ValidationResult,
};
use plughost_sdk::{PluginDeclaration, PluginIdentity};

fn scanner(root: &PluginRoot, events: plughost_core::EventHub) -> CandidateScanner {
    CandidateScanner::new(root.path(), vec!["so".to_string()], events)
        .with_loader(Arc::new(resident_modules()))
}

fn identities(scanner: &CandidateScanner) -> Vec<String> {
    let mut ids: Vec<String> = scanner
        .list_all_candidates()
        .unwrap()
        .into_iter()
        .map(|c| c.identity.to_string())
        .collect();
    ids.sort();
    ids
}

#[test]
fn test_only_subdirectories_are_units() {
    let root = PluginRoot::new();
    root.add("unit_a", "nested/deeper/alpha_beta.so");
    root.add("unit_b", "alpha_next.dll");
    root.add("unit_b", "README.md");
    std::fs::write(root.path().join("broken.so"), b"").unwrap();
    let (events, seen) = recording_hub();
    let scanner = scanner(&root, events);

    assert_eq!(
        identities(&scanner),
        vec!["Test/Alpha@1.0.0", "Test/Beta@2.0.0"]
    );
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(scanner.contexts().len(), 2);
}

#[test]
fn test_load_filtered() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    let (events, _) = recording_hub();
    let scanner = scanner(&root, events);

    let allow: AllowList = vec![PluginIdentity::parse("Test", "Beta", "2.0.0").unwrap()]
        .into_iter()
        .collect();
    let admitted = scanner.load_filtered(&allow).unwrap();
    assert_eq!(admitted.len(), 1);
    assert_eq!(admitted[0].identity.name(), "Beta");
    assert_eq!(admitted[0].description(), "Beta");

    // Discovery still saw both
    assert_eq!(scanner.discovered().len(), 2);
}

#[test]
fn test_missing_root_is_a_scan_error() {
    let (events, _) = recording_hub();
    let scanner = CandidateScanner::new("/definitely/not/a/plugin/root", vec!["so".into()], events);
    assert!(scanner.list_all_candidates().is_err());
}

#[test]
fn test_native_garbage_file_is_contained() {
    let root = PluginRoot::new();
    let garbage = root.add("unit_a", "garbage.so");
    std::fs::write(&garbage, b"\x7fELF but not really").unwrap();
    let (events, seen) = recording_hub();
    let scanner = CandidateScanner::new(root.path(), vec!["so".to_string()], events);

    assert!(scanner.list_all_candidates().unwrap().is_empty());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        PluginEvent::ModuleLoadFailed { file, directory, .. } => {
            assert_eq!(file, &garbage);
            assert_eq!(directory, &root.unit("unit_a"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

struct BlockNamed(&'static str);

impl SecurityGate for BlockNamed {
    fn validate_path(&self, path: &Path) -> ValidationResult {
        if path.to_string_lossy().contains(self.0) {
            ValidationResult::from_findings(
                vec![SecurityFinding::new(RiskLevel::Critical, "blocked name")],
                vec![],
            )
        } else {
            ValidationResult::from_findings(vec![], vec!["unsigned module".to_string()])
        }
    }
}

struct RejectBeta;

impl SecurityGate for RejectBeta {
    fn validate_types(&self, declarations: &[PluginDeclaration]) -> ValidationResult {
        let findings = declarations
            .iter()
            .filter(|d| d.metadata.name == "Beta")
            .map(|_| SecurityFinding::new(RiskLevel::High, "Beta is not trusted"))
            .collect();
        ValidationResult::from_findings(findings, vec![])
    }
}

struct RejectResidentModules;

impl SecurityGate for RejectResidentModules {
    fn validate_module(&self, module: &LoadedModule) -> ValidationResult {
        if module.origin() == ModuleOrigin::Resident {
            ValidationResult::from_findings(
                vec![SecurityFinding::new(RiskLevel::High, "resident")],
                vec![],
            )
        } else {
            ValidationResult::accepted()
        }
    }
}

#[test]
fn test_path_rejection_skips_file() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    root.add("unit_b", "alpha_next.so");
    let (events, seen) = recording_hub();
    let scanner = scanner(&root, events).with_gate(Arc::new(BlockNamed("alpha_next")));

    assert_eq!(
        identities(&scanner),
        vec!["Test/Alpha@1.0.0", "Test/Beta@2.0.0"]
    );
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        PluginEvent::SecurityValidationFailed { result, .. } => {
            assert!(!result.valid);
            assert_eq!(result.risk_level, RiskLevel::Critical);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_type_rejection_drops_whole_module() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    root.add("unit_b", "alpha_next.so");
    let (events, seen) = recording_hub();
    let scanner = scanner(&root, events).with_gate(Arc::new(RejectBeta));

    assert_eq!(identities(&scanner), vec!["Test/Alpha@1.1.0"]);
    assert_eq!(kinds(&seen), vec!["security_validation_failed"]);

    // The rejected module is not kept in its context
    let ctx = scanner.context(&root.unit("unit_a")).unwrap();
    assert_eq!(ctx.module_count(), 0);
}

#[test]
fn test_module_rejection() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    let (events, seen) = recording_hub();
    let scanner = scanner(&root, events).with_gate(Arc::new(RejectResidentModules));

    assert!(identities(&scanner).is_empty());
    assert_eq!(kinds(&seen), vec!["security_validation_failed"]);
}

/// Gate that marks its result valid but reports a critical finding.
struct InconsistentGate;

impl SecurityGate for InconsistentGate {
    fn validate_module(&self, _module: &LoadedModule) -> ValidationResult {
        ValidationResult {
            valid: true,
            risk_level: RiskLevel::Low,
            issues: vec![SecurityFinding::new(RiskLevel::Critical, "known bad hash")],
            warnings: vec![],
        }
    }
}

#[test]
fn test_blocking_finding_rejects_even_when_marked_valid() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    let (events, seen) = recording_hub();
    let scanner = scanner(&root, events).with_gate(Arc::new(InconsistentGate));

    assert!(identities(&scanner).is_empty());
    assert_eq!(kinds(&seen), vec!["security_validation_failed"]);
}

#[test]
fn test_rescan_reuses_context_and_modules() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    let (events, _) = recording_hub();
    let scanner = scanner(&root, events);

    scanner.list_all_candidates().unwrap();
    let ctx = scanner.context(&root.unit("unit_a")).unwrap();
    let module = ctx.modules().pop().unwrap();

    scanner.list_all_candidates().unwrap();
    let again = scanner.context(&root.unit("unit_a")).unwrap();
    assert!(Arc::ptr_eq(&ctx, &again));
    assert!(Arc::ptr_eq(&module, &again.modules().pop().unwrap()));
}

#[test]
fn test_unload_invalidates_descriptors() {
    let root = PluginRoot::new();
    root.add("unit_a", "alpha_beta.so");
    let (events, _) = recording_hub();
    let scanner = scanner(&root, events);

    let candidates = scanner.list_all_candidates().unwrap();
    assert!(candidates.iter().all(|c| c.descriptor.is_live()));

    assert!(scanner.unload(&root.unit("unit_a")));
    assert!(!scanner.unload(&root.unit("unit_a")));
    assert!(candidates.iter().all(|c| !c.descriptor.is_live()));
    assert!(candidates[0].descriptor.instantiate().is_err());

    // Rescanning builds a fresh context
    let fresh = scanner.list_all_candidates().unwrap();
    assert!(fresh.iter().all(|c| c.descriptor.is_live()));
}

#[cfg(unix)]
mod resident_preference {
    use super::*;
    use plughost_core::{HostError, ModuleLoader};

    /// Loader that maps the test binary itself, standing in for a freshly
    /// loaded copy of a module the host already links.
    struct SelfLoader;

    impl ModuleLoader for SelfLoader {
        fn load(&self, path: &Path) -> Result<LoadedModule, HostError> {
            let library = libloading::Library::from(libloading::os::unix::Library::this());
            Ok(LoadedModule::native(
                plughost_core::loader::module_name(path),
                path,
                library,
                Vec::new(),
            ))
        }
    }

    #[test]
    fn test_resident_copy_wins() {
        let root = PluginRoot::new();
        root.add("samples", "libplughost_sample_plugins.so");
        root.add("samples", "libsomething_else.so");
        let (events, seen) = recording_hub();
        let scanner = CandidateScanner::new(root.path(), vec!["so".to_string()], events)
            .with_loader(Arc::new(SelfLoader))
            .with_resident_modules(resident_modules());

        let candidates = scanner.list_all_candidates().unwrap();
        assert_eq!(candidates.len(), 5);
        assert!(candidates
            .iter()
            .all(|c| c.identity.module().starts_with("Samples.")));
        assert!(seen.lock().unwrap().is_empty());

        let ctx = scanner.context(&root.unit("samples")).unwrap();
        let mut origins: Vec<(String, ModuleOrigin)> = ctx
            .modules()
            .iter()
            .map(|m| (m.name().to_string(), m.origin()))
            .collect();
        origins.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            origins,
            vec![
                ("plughost_sample_plugins".to_string(), ModuleOrigin::Resident),
                ("something_else".to_string(), ModuleOrigin::Native),
            ]
        );
    }
}
