//! Scoped numeric-fault mode
//!
//! IEEE arithmetic never traps: an overflowing `exp` quietly yields `inf` and
//! `0.0 / 0.0` yields `NaN`. Every computation in this crate that can fault runs
//! inside a [`FaultScope`], which inspects what the computation produced when the
//! scope is released and turns the first non-finite value into a [`NumericFault`].
//!
//! The mode is a value, not process state, so independent computations running
//! on different threads never see each other's faults.

use nalgebra::{DMatrix, DVector};
use tracing::span::EnteredSpan;

use crate::error::{FaultKind, NumericFault};

/// Values that can be checked for floating-point faults
pub trait Finite {
    /// The first fault found in the value, if any
    fn fault(&self) -> Option<FaultKind>;
}

fn classify(x: f64) -> Option<FaultKind> {
    if x.is_nan() {
        Some(FaultKind::InvalidOperation)
    } else if x.is_infinite() {
        Some(FaultKind::Overflow)
    } else {
        None
    }
}

impl Finite for f64 {
    fn fault(&self) -> Option<FaultKind> {
        classify(*self)
    }
}

impl Finite for DVector<f64> {
    fn fault(&self) -> Option<FaultKind> {
        self.iter().find_map(|&x| classify(x))
    }
}

impl Finite for DMatrix<f64> {
    fn fault(&self) -> Option<FaultKind> {
        self.iter().find_map(|&x| classify(x))
    }
}

impl<A: Finite, B: Finite> Finite for (A, B) {
    fn fault(&self) -> Option<FaultKind> {
        self.0.fault().or_else(|| self.1.fault())
    }
}

/// A numeric-fault scope
///
/// Entering the scope opens a `tracing` span named after the operation; the
/// span closes when the scope is released by [`FaultScope::release`].
pub struct FaultScope {
    operation: &'static str,
    _span: EnteredSpan,
}

impl FaultScope {
    /// Enter a fault scope for `operation`
    pub fn enter(operation: &'static str) -> Self {
        let span = tracing::trace_span!("numeric", operation).entered();
        Self {
            operation,
            _span: span,
        }
    }

    /// Release the scope, raising a fault if `value` is not finite
    pub fn release<T: Finite>(self, value: T) -> Result<T, NumericFault> {
        match value.fault() {
            None => Ok(value),
            Some(kind) => Err(NumericFault {
                operation: self.operation,
                kind,
            }),
        }
    }
}

/// Run `f` inside a fault scope for `operation`
pub fn guarded<T: Finite>(operation: &'static str, f: impl FnOnce() -> T) -> Result<T, NumericFault> {
    let scope = FaultScope::enter(operation);
    let value = f();
    scope.release(value)
}
