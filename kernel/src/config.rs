// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time configuration.
//!
//! Everything the rest of the kernel treats as fixed at build time lives
//! here. This system targets exactly one board (QEMU `virt`, GICv2), so
//! there is no per-board selection to make.

/// Maximum number of task slots in the task table.
pub const MAX_TASKS: usize = 16;

/// Stack size, in bytes, allotted to each task slot.
pub const TASK_STACK_SIZE: usize = 4096;

/// Timer tick interval, in milliseconds.
pub const TICK_INTERVAL_MS: u32 = 10;

/// PL011 UART base address on the QEMU `virt` machine.
pub const UART0_BASE: usize = 0x0900_0000;

/// GICv2 distributor base address on the QEMU `virt` machine.
pub const GICD_BASE: usize = 0x0800_0000;

/// GICv2 CPU interface base address on the QEMU `virt` machine.
pub const GICC_BASE: usize = 0x0801_0000;

/// IRQ ID of the EL1 physical timer (a PPI) on the QEMU `virt` machine.
pub const TIMER_IRQ: u32 = 30;

/// GIC's "no pending interrupt" sentinel returned by IAR.
pub const GIC_SPURIOUS_IRQ: u32 = 1023;
