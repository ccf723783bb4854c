// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side stand-in for [`super::aarch64`].
//!
//! No assembly, no MMIO, no real stack switching: enough of the surface to
//! let [`crate::task`]'s bookkeeping (stack pool, ready queue, scheduler
//! transitions) run as ordinary `#[test]`s. [`TrapFrame::fabricate`] builds
//! the same struct the real backend does, since the fabrication logic itself
//! is exactly what those tests are checking.

use core::sync::atomic::{AtomicBool, Ordering};

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TrapFrame {
    pub x: [u64; 31],
    pub spsr_el1: u64,
    pub elr_el1: u64,
    _pad: u64,
}

const _: () = assert!(core::mem::size_of::<TrapFrame>() == 272);

const SPSR_EL1H_IRQ_ENABLED: u64 = 0b0101;

impl TrapFrame {
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

static IRQ_ENABLED: AtomicBool = AtomicBool::new(false);

/// No vector table to install; records nothing, does nothing.
pub unsafe fn install_vectors() {}

pub fn enable_irq() {
    IRQ_ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable_irq() {
    IRQ_ENABLED.store(false, Ordering::SeqCst);
}

/// Lets tests assert a task didn't forget to unmask interrupts.
pub fn irq_enabled() -> bool {
    IRQ_ENABLED.load(Ordering::SeqCst)
}

pub fn wfe() {}

pub fn wfi() {}
