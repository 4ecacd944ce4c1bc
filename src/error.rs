use thiserror::Error;

use crate::path::Path;

/// Errors surfaced across the public contract.
///
/// Everything else in the crate degrades to a safe default (silent no-op on
/// undefined traversal, full refresh instead of an unsupported incremental
/// patch). These variants are the cases that must fail loudly instead.
#[derive(Debug, Error)]
pub enum BindError {
    /// An array-style mutation was invoked on a path that does not currently
    /// hold an array.
    #[error("path `{0}` does not resolve to an array")]
    NotAnArray(Path),
    /// A sort was configured by method name but the host has no such method.
    #[error("host has no sort method named `{0}`")]
    UnknownSortMethod(String),
    /// A filter was configured by method name but the host has no such method.
    #[error("host has no filter method named `{0}`")]
    UnknownFilterMethod(String),
    /// A named host method exists but was registered for the other role.
    #[error("host method `{0}` is not usable in this role")]
    MethodKindMismatch(String),
}
