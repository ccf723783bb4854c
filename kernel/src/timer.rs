// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EL1 physical timer driver.
//!
//! Programs `CNTP_TVAL_EL0` against the frequency reported in `CNTFRQ_EL0` to
//! produce a fixed tick interval, then re-arms by rewriting `CNTP_TVAL_EL0` to
//! the same interval on every tick. The generic timer recomputes its compare
//! value relative to the current count when `TVAL` is written, which is what
//! makes re-arming this simple: there's no separate "clear pending" step
//! beyond the GIC's EOI.

use core::arch::asm;

const CNTP_CTL_ENABLE: u64 = 1 << 0;

/// QEMU's `virt` machine reports a real `CNTFRQ_EL0`, but this is the value
/// it uses if a host ever doesn't (62.5 MHz), kept as a documented fallback
/// rather than a silent zero-divide.
const FALLBACK_CNTFRQ_HZ: u64 = 62_500_000;

pub struct Timer {
    interval_ticks: u64,
}

impl Timer {
    /// Programs the timer for a tick every `interval_ms` milliseconds and
    /// enables it. Does not touch the GIC; the caller is expected to enable
    /// the timer's IRQ line there (see [`crate::config::TIMER_IRQ`]).
    pub fn init_periodic(interval_ms: u32) -> Self {
        let cntfrq = read_cntfrq();
        let cntfrq = if cntfrq == 0 { FALLBACK_CNTFRQ_HZ } else { cntfrq };
        let interval_ticks = cntfrq / 1000 * interval_ms as u64;

        write_cntp_tval(interval_ticks);
        write_cntp_ctl(CNTP_CTL_ENABLE);

        Timer { interval_ticks }
    }

    /// Re-arms the timer for the next tick. Called from the IRQ handler once
    /// the GIC has told us ID 30 is what fired.
    pub fn handle_irq(&self) {
        write_cntp_tval(self.interval_ticks);
    }

    /// The programmed tick interval, in counter ticks. Exposed for
    /// diagnostics only.
    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }
}

fn read_cntfrq() -> u64 {
    let val: u64;
    unsafe {
        asm!("mrs {0}, cntfrq_el0", out(reg) val, options(nomem, nostack, readonly));
    }
    val
}

fn write_cntp_tval(val: u64) {
    unsafe {
        asm!("msr cntp_tval_el0, {0}", in(reg) val, options(nomem, nostack));
    }
}

fn write_cntp_ctl(val: u64) {
    unsafe {
        asm!("msr cntp_ctl_el0, {0}", in(reg) val, options(nomem, nostack));
    }
}
