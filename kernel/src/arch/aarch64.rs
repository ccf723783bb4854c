// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AArch64 exception entry: vector table, trap frame, and the IRQ path that
//! makes preemption possible.
//!
//! The table is sixteen 128-byte-aligned entries at a 2KiB-aligned base,
//! installed via `VBAR_EL1`. Synchronous exceptions and IRQs taken at EL1h
//! are the two entries that matter day to day: synchronous is unconditionally
//! fatal (there is no supervisor to hand a fault to), and IRQ is the
//! preemption path. FIQ and SError at EL1h report and halt rather than
//! silently hanging, even though `DAIF` leaves both masked for the kernel's
//! entire lifetime and neither should ever fire. Every remaining entry
//! (current-EL-SP0, lower-EL) hangs immediately; this kernel never takes
//! those by construction (single core, no EL0).
//!
//! # The SP-handoff trick
//!
//! The IRQ handler does not call a separate "context switch" routine. It
//! saves the interrupted task's full register state to *its own* stack,
//! passes that stack pointer to [`crate::task::schedule`], and trusts the
//! return value as the stack pointer to resume from. If the scheduler picks
//! a different task, that's a pointer onto a *different* stack holding a
//! frame in the exact same layout, real or fabricated; if it picks the same
//! task, it's the same pointer handed back. The assembly epilogue does not
//! know or care which happened: it just restores from whatever `x0` comes
//! back as and `eret`s. This is what lets a brand new task start running
//! through the ordinary interrupt-return path instead of a dedicated
//! bootstrap sequence.

use core::arch::{asm, naked_asm};

/// Saved register state and a pointer to this is what flows through
/// [`crate::task::schedule`] as a `usize`. Layout is load-bearing: the
/// assembly save/restore sequences below index into it by fixed byte
/// offsets, and [`crate::task::task_create`] fabricates one of these by
/// hand for a task that has never run.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TrapFrame {
    /// x0-x30. Index 0 is x0, index 30 is x30 (the link register).
    pub x: [u64; 31],
    pub spsr_el1: u64,
    pub elr_el1: u64,
    /// Reserved so the frame is 272 bytes (a multiple of 16); never read or
    /// written by the save/restore macros below.
    _pad: u64,
}

const TRAP_FRAME_SIZE: usize = core::mem::size_of::<TrapFrame>();
const _: () = assert!(TRAP_FRAME_SIZE == 272);

/// `PSTATE` for a freshly fabricated task: EL1 with SPSel=1 (EL1h), all
/// interrupt masks clear so the task starts with IRQs enabled.
const SPSR_EL1H_IRQ_ENABLED: u64 = 0b0101;

impl TrapFrame {
    /// Builds the frame a new task's stack starts with, so the ordinary
    /// interrupt-return path can boot it exactly like a preempted one.
    ///
    /// `x0` carries `arg`; every other GPR starts zeroed. `ELR_EL1` is the
    /// entry point `eret` will jump to; `SPSR_EL1` selects EL1h with
    /// interrupts unmasked.
    pub fn fabricate(entry: extern "C" fn(usize) -> !, arg: usize) -> TrapFrame {
        let mut frame = TrapFrame {
            x: [0; 31],
            spsr_el1: SPSR_EL1H_IRQ_ENABLED,
            elr_el1: entry as usize as u64,
            _pad: 0,
        };
        frame.x[0] = arg as u64;
        frame
    }
}

macro_rules! vector_entry {
    ($handler:ident) => {
        concat!(".align 7\n", "b ", stringify!($handler), "\n")
    };
}

/// The exception vector table. Must be installed via [`install_vectors`]
/// before interrupts are unmasked.
///
/// # Safety
///
/// Naked function; relies on the caller never branching into it directly.
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".vectors")]
pub unsafe extern "C" fn _vectors() {
    naked_asm!(
        ".align 11",
        vector_entry!(hang_el1t),
        vector_entry!(hang_el1t),
        vector_entry!(hang_el1t),
        vector_entry!(hang_el1t),
        vector_entry!(sync_el1h),
        vector_entry!(irq_el1h),
        vector_entry!(fiq_el1h),
        vector_entry!(serror_el1h),
        vector_entry!(hang_el0_64),
        vector_entry!(hang_el0_64),
        vector_entry!(hang_el0_64),
        vector_entry!(hang_el0_64),
        vector_entry!(hang_el0_32),
        vector_entry!(hang_el0_32),
        vector_entry!(hang_el0_32),
        vector_entry!(hang_el0_32),
    );
}

/// Current EL with SP0: never entered (EL1h is used exclusively).
#[unsafe(naked)]
unsafe extern "C" fn hang_el1t() {
    naked_asm!("b .");
}

/// FIQ at EL1h. `DAIF.F` is never cleared, so this is unreachable in
/// practice; still reports and halts rather than silently hanging, matching
/// every other fatal path's contract.
#[unsafe(naked)]
unsafe extern "C" fn fiq_el1h() {
    naked_asm!(save_frame!(), "mov x0, sp", "bl fiq_handler", "b .");
}

/// SError at EL1h. `DAIF.A` is never cleared, so this is unreachable in
/// practice; same reasoning as [`fiq_el1h`].
#[unsafe(naked)]
unsafe extern "C" fn serror_el1h() {
    naked_asm!(save_frame!(), "mov x0, sp", "bl serror_handler", "b .");
}

/// Lower-EL exceptions: unreachable, there is no EL0 in this system.
#[unsafe(naked)]
unsafe extern "C" fn hang_el0_64() {
    naked_asm!("b .");
}

#[unsafe(naked)]
unsafe extern "C" fn hang_el0_32() {
    naked_asm!("b .");
}

macro_rules! save_frame {
    () => {
        concat!(
            "sub sp, sp, #272\n",
            "stp x0, x1, [sp, #0]\n",
            "stp x2, x3, [sp, #16]\n",
            "stp x4, x5, [sp, #32]\n",
            "stp x6, x7, [sp, #48]\n",
            "stp x8, x9, [sp, #64]\n",
            "stp x10, x11, [sp, #80]\n",
            "stp x12, x13, [sp, #96]\n",
            "stp x14, x15, [sp, #112]\n",
            "stp x16, x17, [sp, #128]\n",
            "stp x18, x19, [sp, #144]\n",
            "stp x20, x21, [sp, #160]\n",
            "stp x22, x23, [sp, #176]\n",
            "stp x24, x25, [sp, #192]\n",
            "stp x26, x27, [sp, #208]\n",
            "stp x28, x29, [sp, #224]\n",
            "str x30, [sp, #240]\n",
            "mrs x0, spsr_el1\n",
            "mrs x1, elr_el1\n",
            "stp x0, x1, [sp, #248]\n",
        )
    };
}

macro_rules! restore_frame_from_sp_and_eret {
    () => {
        concat!(
            "ldp x0, x1, [sp, #248]\n",
            "msr spsr_el1, x0\n",
            "msr elr_el1, x1\n",
            "ldp x0, x1, [sp, #0]\n",
            "ldp x2, x3, [sp, #16]\n",
            "ldp x4, x5, [sp, #32]\n",
            "ldp x6, x7, [sp, #48]\n",
            "ldp x8, x9, [sp, #64]\n",
            "ldp x10, x11, [sp, #80]\n",
            "ldp x12, x13, [sp, #96]\n",
            "ldp x14, x15, [sp, #112]\n",
            "ldp x16, x17, [sp, #128]\n",
            "ldp x18, x19, [sp, #144]\n",
            "ldp x20, x21, [sp, #160]\n",
            "ldp x22, x23, [sp, #176]\n",
            "ldp x24, x25, [sp, #192]\n",
            "ldp x26, x27, [sp, #208]\n",
            "ldp x28, x29, [sp, #224]\n",
            "ldr x30, [sp, #240]\n",
            "add sp, sp, #272\n",
            "eret\n",
        )
    };
}

/// Synchronous exceptions are fatal by policy: save enough to report what
/// happened, then hand off to Rust, which never returns.
#[unsafe(naked)]
unsafe extern "C" fn sync_el1h() {
    naked_asm!(
        save_frame!(),
        "mov x0, sp",
        "bl sync_exception_handler",
        "b .",
    );
}

/// The IRQ path. Saves the interrupted task's frame, asks the scheduler for
/// the stack pointer to resume from, and restores from whatever comes back.
#[unsafe(naked)]
unsafe extern "C" fn irq_el1h() {
    naked_asm!(
        save_frame!(),
        "mov x0, sp",
        "bl irq_handler",
        "mov sp, x0",
        restore_frame_from_sp_and_eret!(),
    );
}

/// Called from `sync_el1h` with a pointer to the saved frame. Reads
/// `ESR_EL1` for diagnostics and halts; there is no recovery path for a
/// synchronous exception in this system.
#[unsafe(no_mangle)]
extern "C" fn sync_exception_handler(frame: *const TrapFrame) -> ! {
    let frame = unsafe { &*frame };
    let esr_el1: u64;
    unsafe {
        asm!("mrs {0}, esr_el1", out(reg) esr_el1, options(nomem, nostack, readonly));
    }
    let console = crate::startup::console();
    console.puts("\r\nsynchronous exception\n  ELR_EL1: ");
    console.put_hex(frame.elr_el1);
    console.puts("\n  SPSR_EL1: ");
    console.put_hex(frame.spsr_el1);
    console.puts("\n  ESR_EL1: ");
    console.put_hex(esr_el1);
    console.puts("\n");
    crate::err::fatal(console, "synchronous exception")
}

/// Called from `irq_el1h` with the interrupted task's stack pointer. Reads
/// the GIC's IAR, dispatches to the timer if that's the source, ends the
/// interrupt, and defers to the scheduler for the stack pointer to resume
/// from — the one indirection that makes preemption happen.
#[unsafe(no_mangle)]
extern "C" fn irq_handler(sp_in: usize) -> usize {
    let gic = crate::startup::gic();
    let irq = gic.read_iar();

    if irq == crate::config::GIC_SPURIOUS_IRQ {
        gic.write_eoir(irq);
        return sp_in;
    }

    if irq == crate::config::TIMER_IRQ {
        crate::startup::timer().handle_irq();
        gic.write_eoir(irq);
        return crate::task::schedule(sp_in);
    }

    // Unhandled IRQ: acknowledge so the line doesn't wedge, log, and keep
    // running the interrupted task. Nothing in this system raises one yet.
    let console = crate::startup::console();
    console.puts("unhandled IRQ id=");
    console.put_dec(irq as u64);
    console.puts("\n");
    gic.write_eoir(irq);
    sp_in
}

/// Called from `fiq_el1h`. FIQ is masked for the kernel's entire lifetime;
/// reaching this means `DAIF.F` was cleared somewhere it shouldn't have been.
#[unsafe(no_mangle)]
extern "C" fn fiq_handler(_frame: *const TrapFrame) -> ! {
    crate::err::fatal(crate::startup::console(), "unexpected FIQ")
}

/// Called from `serror_el1h`. SError is masked for the kernel's entire
/// lifetime; reaching this means `DAIF.A` was cleared somewhere it shouldn't
/// have been, or the platform raised one regardless.
#[unsafe(no_mangle)]
extern "C" fn serror_handler(_frame: *const TrapFrame) -> ! {
    crate::err::fatal(crate::startup::console(), "unexpected SError")
}

/// Points `VBAR_EL1` at the vector table. Must run before interrupts are
/// unmasked.
///
/// # Safety
///
/// Must be called exactly once, during startup, before any exception can be
/// taken.
pub unsafe fn install_vectors() {
    unsafe {
        asm!(
            "adr {tmp}, _vectors",
            "msr vbar_el1, {tmp}",
            "isb",
            tmp = out(reg) _,
            options(nomem, nostack),
        );
    }
}

/// Unmasks IRQs at the core (clears `DAIF.I`).
pub fn enable_irq() {
    unsafe {
        asm!("msr daifclr, #2", options(nomem, nostack));
    }
}

/// Masks IRQs at the core (sets `DAIF.I`).
pub fn disable_irq() {
    unsafe {
        asm!("msr daifset, #2", options(nomem, nostack));
    }
}

/// Waits for an event or interrupt, whichever comes first.
pub fn wfe() {
    unsafe {
        asm!("wfe", options(nomem, nostack));
    }
}

/// Waits for an interrupt.
pub fn wfi() {
    unsafe {
        asm!("wfi", options(nomem, nostack));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_frame_is_272_bytes() {
        assert_eq!(core::mem::size_of::<TrapFrame>(), 272);
    }

    extern "C" fn dummy_entry(_arg: usize) -> ! {
        loop {}
    }

    #[test]
    fn fabricate_places_arg_in_x0_and_entry_in_elr() {
        let frame = TrapFrame::fabricate(dummy_entry, 0xdead_beef);
        assert_eq!(frame.x[0], 0xdead_beef);
        assert_eq!(frame.elr_el1, dummy_entry as usize as u64);
        assert_eq!(frame.spsr_el1, SPSR_EL1H_IRQ_ENABLED);
        assert!(frame.x[1..].iter().all(|&r| r == 0));
    }
}
