use crate::error::ValidationError;
use crate::fallback::FallbackAction;
use crate::ids::ModuleKey;
use crate::module::{requirements_hash, FederatedModule};
use semver::VersionReq;
use serde::{Deserialize, Serialize};

/// Result of validating a record at a trust boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub checks_performed: usize,
    pub checks_passed: usize,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok(checks: usize) -> Self {
        Self {
            valid: true,
            checks_performed: checks,
            checks_passed: checks,
            errors: Vec::new(),
        }
    }

    pub fn failed(checks_performed: usize, checks_passed: usize, errors: Vec<String>) -> Self {
        Self {
            valid: false,
            checks_performed,
            checks_passed,
            errors,
        }
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError {
                issues: self.errors,
            })
        }
    }
}

struct Checks {
    performed: usize,
    passed: usize,
    errors: Vec<String>,
}

impl Checks {
    fn check(&mut self, ok: bool, error: impl FnOnce() -> String) {
        self.performed += 1;
        if ok {
            self.passed += 1;
        } else {
            self.errors.push(error());
        }
    }

    fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            ValidationResult::ok(self.performed)
        } else {
            ValidationResult::failed(self.performed, self.passed, self.errors)
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.contains('/')
        && !s.contains('@')
        && !s.chars().any(char::is_whitespace)
}

fn is_namespace(s: &str) -> bool {
    let bare = s.strip_prefix('@').unwrap_or(s);
    is_identifier(bare)
}

fn is_range(s: &str) -> bool {
    VersionReq::parse(s).is_ok()
}

/// Structural validation of a module record.
///
/// Checks identity fields, dependency keys and ranges, the sealed
/// `requirementsHash`, federation ranges, entry points and fallback
/// strategy consistency.
pub fn validate_module(module: &FederatedModule) -> ValidationResult {
    let mut c = Checks {
        performed: 0,
        passed: 0,
        errors: Vec::new(),
    };

    c.check(is_namespace(&module.namespace), || {
        format!("invalid namespace '{}'", module.namespace)
    });
    c.check(is_identifier(&module.name), || {
        format!("invalid name '{}'", module.name)
    });
    c.check(
        !module.commit_hash.is_empty() && module.commit_hash.chars().all(|ch| ch.is_ascii_alphanumeric()),
        || format!("invalid commit hash '{}'", module.commit_hash),
    );

    for (dep, range) in &module.dependencies {
        let key = ModuleKey::parse_in(dep, &module.namespace);
        c.check(key.is_ok(), || format!("invalid dependency key '{}'", dep));
        let req = VersionReq::parse(range);
        c.check(req.is_ok(), || {
            format!("invalid range '{}' for dependency '{}'", range, dep)
        });
        if let (Ok(key), Ok(req)) = (key, req) {
            // Same-module edges are allowed only when resolved by range to another version.
            if key == module.key() {
                c.check(!req.matches(&module.version), || {
                    format!("module depends on its own version {}", module.version)
                });
            }
        }
    }

    let expected = requirements_hash(&module.dependencies);
    c.check(module.requirements_hash == expected, || {
        format!(
            "requirementsHash mismatch: declared {}, computed {}",
            module.requirements_hash, expected
        )
    });

    c.check(module.federation_config.required_version_req().is_ok(), || {
        format!(
            "invalid requiredVersion '{}'",
            module.federation_config.required_version
        )
    });
    for shared in &module.federation_config.shared {
        c.check(ModuleKey::parse_in(shared, &module.namespace).is_ok(), || {
            format!("invalid shared key '{}'", shared)
        });
    }

    for (exposed, entry) in &module.entry_points {
        c.check(!entry.path.is_empty() && !entry.hash.is_empty(), || {
            format!("entry point '{}' needs a path and hash", exposed)
        });
    }

    for strategy in &module.fallback_strategies {
        c.check(strategy.is_consistent(), || {
            format!(
                "fallback strategy of type {} carries a {} action",
                strategy.strategy_type,
                strategy.action.strategy_type()
            )
        });
        match &strategy.action {
            FallbackAction::Version { range } | FallbackAction::Implementation { range, .. } => {
                c.check(is_range(range), || {
                    format!("fallback range '{}' is not a version range", range)
                });
            }
            FallbackAction::Registry { registry } => {
                c.check(!registry.trim().is_empty(), || {
                    "registry fallback names no registry".to_string()
                });
            }
            FallbackAction::Graceful { .. } => {}
        }
    }

    c.finish()
}
