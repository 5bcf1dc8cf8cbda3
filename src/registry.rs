//! Kernel registry (C5): name-based lookup with user-registered entries
//! overriding built-ins, and the default QC-mapping-function slot.
//!
//! Grounded on `trans.h`'s `TRANSfunc`/`assign_transform_function`/
//! `get_transform`, and `cds_transform_driver.c`'s lookup order (user
//! registrations shadow the built-ins of the same name). Per spec.md §5
//! this is process-global state with install-time-only mutability; the
//! driver reads it without locking once registration is complete, so a
//! `RwLock` is sufficient even though most real use installs kernels once
//! at startup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::kernels::{Kernel, KernelError};

pub const TRANS_INTERPOLATE: &str = "TRANS_INTERPOLATE";
pub const TRANS_SUBSAMPLE: &str = "TRANS_SUBSAMPLE";
pub const TRANS_BIN_AVERAGE: &str = "TRANS_BIN_AVERAGE";
pub const TRANS_PASSTHROUGH: &str = "TRANS_PASSTHROUGH";
pub const TRANS_CARACENA: &str = "TRANS_CARACENA";
pub const TRANS_AUTO: &str = "TRANS_AUTO";

#[derive(Clone)]
struct RegistryEntry {
    name: String,
    kernel: Arc<dyn Kernel>,
}

/// A name -> kernel lookup table. Cheaply cloneable; internally shares one
/// lock-protected map, matching the "process-global, install-time-only
/// mutable" resource described in spec.md §5.
#[derive(Clone)]
pub struct KernelRegistry {
    entries: Arc<RwLock<HashMap<String, RegistryEntry>>>,
}

impl KernelRegistry {
    /// A fresh registry pre-populated with the four built-in kernels (plus
    /// Caracena, registered the same way so user code can shadow any of
    /// them uniformly).
    pub fn with_builtins() -> Self {
        let registry = Self { entries: Arc::new(RwLock::new(HashMap::new())) };
        registry.register(TRANS_INTERPOLATE, Arc::new(crate::kernels::interpolate::Interpolate));
        registry.register(TRANS_SUBSAMPLE, Arc::new(crate::kernels::subsample::Subsample));
        registry.register(TRANS_BIN_AVERAGE, Arc::new(crate::kernels::bin_average::BinAverage));
        registry.register(TRANS_PASSTHROUGH, Arc::new(crate::kernels::passthrough::Passthrough));
        registry.register(TRANS_CARACENA, Arc::new(crate::caracena::CaracenaKernel::default()));
        registry
    }

    /// Register (or override) a kernel under `name`. User registrations
    /// shadow built-ins of the same name.
    pub fn register(&self, name: &str, kernel: Arc<dyn Kernel>) {
        let mut entries = self.entries.write().expect("kernel registry lock poisoned");
        entries.insert(name.to_string(), RegistryEntry { name: name.to_string(), kernel });
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Kernel>, KernelError> {
        let entries = self.entries.read().expect("kernel registry lock poisoned");
        entries
            .get(name)
            .map(|e| e.kernel.clone())
            .ok_or_else(|| KernelError::UnknownTransform(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().expect("kernel registry lock poisoned").contains_key(name)
    }

    #[cfg(test)]
    fn name_of(&self, name: &str) -> Option<String> {
        self.entries.read().unwrap().get(name).map(|e| e.name.clone())
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::KernelCall;

    struct Stub;
    impl Kernel for Stub {
        fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
            call.output_data.fill(42.0);
            Ok(())
        }
    }

    #[test]
    fn builtin_lookup_succeeds() {
        let registry = KernelRegistry::with_builtins();
        assert!(registry.lookup(TRANS_INTERPOLATE).is_ok());
        assert!(registry.lookup(TRANS_SUBSAMPLE).is_ok());
        assert!(registry.lookup(TRANS_BIN_AVERAGE).is_ok());
        assert!(registry.lookup(TRANS_PASSTHROUGH).is_ok());
        assert!(registry.lookup(TRANS_CARACENA).is_ok());
    }

    #[test]
    fn unknown_name_fails() {
        let registry = KernelRegistry::with_builtins();
        assert!(matches!(registry.lookup("NOT_A_KERNEL"), Err(KernelError::UnknownTransform(_))));
    }

    #[test]
    fn user_registration_shadows_builtin() {
        let registry = KernelRegistry::with_builtins();
        registry.register(TRANS_PASSTHROUGH, Arc::new(Stub));
        assert_eq!(registry.name_of(TRANS_PASSTHROUGH).as_deref(), Some(TRANS_PASSTHROUGH));
        let kernel = registry.lookup(TRANS_PASSTHROUGH).unwrap();
        let mut call = KernelCall::new_for_test();
        kernel.call(&mut call).unwrap();
        assert!(call.output_data.iter().all(|v| *v == 42.0));
    }
}
