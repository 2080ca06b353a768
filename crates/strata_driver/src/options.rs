//! Build configuration accepted by the driver (§6.2).

/// Host-facing configuration for a single compiler instance.
///
/// Fields that name a backend concern (`target_triple`, `only_want_obj_file`,
/// `emit_llvm_ir`) are recorded here and handed to the external code
/// generator; this crate never inspects them itself.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Base name for output artifacts.
    pub executable_name: String,
    /// Empty string selects the host triple; otherwise a target descriptor
    /// consumed by the backend.
    pub target_triple: String,
    /// Stop after writing the object file rather than linking an executable.
    pub only_want_obj_file: bool,
    /// Add informational diagnostics keyed by the instance number.
    pub verbose_diagnostics: bool,
    /// Also write a human-readable IR sibling file next to the object file.
    pub emit_llvm_ir: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            executable_name: "out".to_string(),
            target_triple: String::new(),
            only_want_obj_file: false,
            verbose_diagnostics: false,
            emit_llvm_ir: false,
        }
    }
}

impl BuildOptions {
    /// Returns `true` if `target_triple` asks for the host's own target.
    pub fn wants_host_triple(&self) -> bool {
        self.target_triple.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_target_the_host() {
        let opts = BuildOptions::default();
        assert!(opts.wants_host_triple());
        assert!(!opts.only_want_obj_file);
    }
}
