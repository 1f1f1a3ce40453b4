//! Registry behavior in a process where no default backend is registered.
//!
//! Lives in its own test binary so that no other test can register a
//! default backend first.

use difflux_core::prelude::*;
use difflux_core::registry;
use std::sync::Arc;

#[test]
fn dispatch_without_backend_is_a_configuration_error() {
    let err = registry::as_tensor(vec![1.0, 2.0]).unwrap_err();
    assert!(matches!(err, BackendError::Configuration { .. }));
    assert!(err.to_string().contains("no backend registered"));
}

#[test]
fn scoped_backend_enables_dispatch_without_default() {
    let _guard = push_backend(Arc::new(CpuBackend::with_seed(5)));
    let t = registry::as_tensor(vec![1.0, 2.0]).unwrap();
    assert_eq!(t.shape().dims(), &[2]);
}
