//! Compiler error taxonomy.

use thiserror::Error;

/// Errors produced while compiling a topology document.
///
/// All variants are terminal: compilation is a one-shot batch transformation
/// and nothing is retried or recovered. The caller prints the message and
/// exits non-zero.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Unknown key, or a value of the wrong type for a known key.
    #[error("invalid topology: {0}")]
    Schema(String),

    /// An integer-valued key outside its documented range, or `threads`
    /// given while `cores` is 0.
    #[error("value out of range: {0}")]
    Range(String),

    /// A size literal not in integer-with-unit form, or a unit mismatch
    /// during size arithmetic.
    #[error("invalid size: {0}")]
    SizeFormat(String),

    /// CPU-bearing groups disagree on threads per core.
    #[error("thread count mismatch: {0}")]
    ThreadMismatch(String),

    /// A structurally valid document that does not describe a bootable
    /// machine: no nodes, no CPUs, no initial memory, a malformed distance
    /// matrix, or an unsupported CXL subtree.
    #[error("{0}")]
    Topology(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CompileError>;
