// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common error-handling support.
//!
//! Resource exhaustion gets a typed `Result`. Everything else — invariant
//! violations, synchronous exceptions, FIQ, SError — is fatal by policy:
//! there is no supervisor to hand a fault to, so the kernel logs what it can
//! and parks the core.

/// Failure modes of [`crate::task::task_create`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskCreateError {
    /// Every slot in the task table is occupied.
    NoFreeTask,
    /// The task table had room, but the stack pool did not.
    NoFreeStack,
}

/// Halts the core after printing a diagnostic, for conditions the kernel has
/// no safe way to recover from (invariant violations, synchronous exceptions,
/// FIQ, SError). Never returns.
///
/// This is a function rather than a bare `loop` at each call site so that
/// every fatal path prints through the same format and so the "halt" policy
/// lives in exactly one place.
pub fn fatal(console: &crate::console::Console, reason: &str) -> ! {
    console.puts("\r\n*** FATAL: ");
    console.puts(reason);
    console.puts(" ***\r\n");
    loop {
        crate::arch::wfe();
    }
}
