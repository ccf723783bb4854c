// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![no_std]
#![no_main]

use core::arch::global_asm;
use kernel::startup::{self, BootTasks};

/// `_start`: the very first instruction to run. Sets the boot stack
/// pointer, zeroes BSS, then falls into `board_main`. Kept in assembly
/// because there is no runtime crate to do this for AArch64 bare metal the
/// way `cortex-m-rt` does for Cortex-M.
global_asm!(
    r#"
.section .text._start, "ax"
.global _start
_start:
    adrp x0, __boot_stack_top
    add x0, x0, :lo12:__boot_stack_top
    mov sp, x0

    adrp x0, __bss_start
    add x0, x0, :lo12:__bss_start
    adrp x1, __bss_end
    add x1, x1, :lo12:__bss_end
0:
    cmp x0, x1
    b.ge 1f
    str xzr, [x0], #8
    b 0b
1:
    bl board_main
    b .
"#
);

/// Busy-loops for roughly `cycles` iterations, printing nothing: a
/// placeholder workload for the demonstration tasks below so preemption has
/// something to interleave.
fn spin(cycles: u64) {
    let mut x: u64 = 0;
    for _ in 0..cycles {
        x = x.wrapping_add(1);
        core::hint::black_box(&mut x);
    }
}

/// Demonstration task A: prints "A" for five iterations, then exits.
extern "C" fn task_a(_arg: usize) -> ! {
    for _ in 0..5 {
        startup::console().puts("A");
        spin(2_000_000);
    }
    kernel::task::task_exit();
}

/// Demonstration task B: prints "B" for seven iterations, then exits.
extern "C" fn task_b(_arg: usize) -> ! {
    for _ in 0..7 {
        startup::console().puts("B");
        spin(1_500_000);
    }
    kernel::task::task_exit();
}

/// The idle task: always runnable, never on the ready queue, just waits for
/// the next interrupt forever.
extern "C" fn idle_task(_arg: usize) -> ! {
    loop {
        kernel::arch::wfi();
    }
}

#[unsafe(no_mangle)]
extern "C" fn board_main() -> ! {
    unsafe {
        startup::start_kernel(BootTasks {
            idle_entry: idle_task,
            tasks: &[(task_a, 0, "A"), (task_b, 0, "B")],
        })
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    semihosting::println!("PANIC: {info}");
    semihosting::process::abort();
}
