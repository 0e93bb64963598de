//! Error taxonomy for the kernel pipeline.
//!
//! Translation-time errors (`UnsupportedCaptureKind`, `AmbiguousOverload`,
//! `UnsupportedConstruct`) abort before any GPU resource is touched.
//! `ShaderCompilation` and `DeviceExecution` are surfaced synchronously to
//! the caller of the triggering operation and are never retried: a shader
//! the device rejects cannot succeed without caller-visible code changes.
//! There is no fallback to host-side execution.

use std::fmt;

/// An error from kernel inspection, translation, compilation, or dispatch.
#[derive(Clone, Debug)]
pub enum KernelError {
    /// A captured value's type has no translation rule (e.g. a reference
    /// to another closure). Raised during inspection, before any device
    /// resource is allocated.
    UnsupportedCaptureKind { name: String, detail: String },

    /// A call could not be resolved to exactly one known intrinsic or one
    /// known user function.
    AmbiguousOverload { name: String, detail: String },

    /// The kernel uses a construct the translator cannot express in WGSL
    /// (recursion, writes to a read-only buffer, indexing a non-buffer).
    UnsupportedConstruct { detail: String },

    /// The device rejected the generated WGSL. Carries the full generated
    /// source for diagnosis; see [`KernelError::render`].
    ShaderCompilation { message: String, source: String },

    /// The device reported a fault while executing a dispatch. The contents
    /// of every buffer bound to that dispatch are undefined afterwards.
    DeviceExecution { message: String },

    /// The captures supplied at dispatch time do not match the shape the
    /// shader was compiled against (count, kind, or element type).
    BindingMismatch { detail: String },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::UnsupportedCaptureKind { name, detail } => {
                write!(f, "unsupported capture kind for `{}`: {}", name, detail)
            }
            KernelError::AmbiguousOverload { name, detail } => {
                write!(f, "ambiguous call to `{}`: {}", name, detail)
            }
            KernelError::UnsupportedConstruct { detail } => {
                write!(f, "unsupported construct: {}", detail)
            }
            KernelError::ShaderCompilation { message, .. } => {
                write!(f, "shader compilation failed: {}", message)
            }
            KernelError::DeviceExecution { message } => {
                write!(f, "device execution fault: {}", message)
            }
            KernelError::BindingMismatch { detail } => {
                write!(f, "binding mismatch: {}", detail)
            }
        }
    }
}

impl std::error::Error for KernelError {}

impl KernelError {
    /// True for errors raised before any GPU resource is touched.
    pub fn is_translation_error(&self) -> bool {
        matches!(
            self,
            KernelError::UnsupportedCaptureKind { .. }
                | KernelError::AmbiguousOverload { .. }
                | KernelError::UnsupportedConstruct { .. }
        )
    }

    /// Render a `ShaderCompilation` error to stderr using ariadne, with the
    /// generated WGSL as the source listing. Other variants print plainly.
    pub fn render(&self) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let KernelError::ShaderCompilation { message, source } = self else {
            eprintln!("{}", self);
            return;
        };

        let span_end = source.lines().next().map(|l| l.len()).unwrap_or(0);
        Report::build(ReportKind::Error, "kernel.wgsl", 0)
            .with_message("shader compilation failed")
            .with_label(
                Label::new(("kernel.wgsl", 0..span_end))
                    .with_message(message)
                    .with_color(Color::Red),
            )
            .with_note("the full generated source is attached to this error")
            .finish()
            .eprint(("kernel.wgsl", Source::from(source.as_str())))
            .ok();
    }
}
