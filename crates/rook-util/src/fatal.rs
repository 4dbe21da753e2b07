//! Fatal error reporting.
//!
//! The VM distinguishes two kinds of irrecoverable failure. A *contract
//! violation* is a bug in the caller: a duplicate hash insert, a transform
//! applied to a flattening callsite, an out-of-range positional index.
//! An *impossible state* is a bug in the VM itself, observed as a thread
//! status outside the legal transitions of the GC state machine. Neither is
//! ever retried or locally recovered; both are reported here and abort the
//! VM at the earliest point.
//!
//! Both reporters log through the `log` facade before panicking, so the
//! failure is visible in production logs and observable from tests.

use std::fmt;

/// Process exit codes for irrecoverable failures.
pub mod exitcode {
    /// GC orchestration failure: a thread status outside the legal state
    /// machine, or a broken safepoint barrier.
    pub const GCORCH: i32 = 12;
}

#[doc(hidden)]
pub fn vm_panic_impl(code: i32, args: fmt::Arguments<'_>) -> ! {
    let message = format!("fatal VM error (exit code {code}): {args}");
    log::error!("{message}");
    panic!("{message}");
}

#[doc(hidden)]
pub fn vm_oops_impl(args: fmt::Arguments<'_>) -> ! {
    let message = format!("VM contract violation: {args}");
    log::error!("{message}");
    panic!("{message}");
}

/// Reports an irrecoverable VM failure carrying a process exit code and
/// aborts. Used for impossible concurrent states.
#[macro_export]
macro_rules! vm_panic {
    ($code:expr, $($arg:tt)*) => {
        $crate::fatal::vm_panic_impl($code, format_args!($($arg)*))
    };
}

/// Reports a programmer contract violation and aborts the VM.
#[macro_export]
macro_rules! vm_oops {
    ($($arg:tt)*) => {
        $crate::fatal::vm_oops_impl(format_args!($($arg)*))
    };
}
