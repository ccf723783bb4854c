// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup.
//!
//! Brings up the console, installs the vector table, initializes the GIC
//! and timer, builds the task table (idle task plus whatever the board
//! wants running at boot), unmasks interrupts, and `eret`s into the first
//! scheduled task through the same restore sequence the IRQ epilogue uses.
//! Everything after that runs only because the timer tick keeps landing in
//! the architecture's IRQ handler and handing control to a task; this
//! function itself never runs again.

use crate::config;
use crate::console::Console;
use crate::gic::Gic;
use crate::timer::Timer;

static mut CONSOLE: Option<Console> = None;
static mut GIC: Option<Gic> = None;
static mut TIMER: Option<Timer> = None;

/// The console singleton, valid from partway through [`start_kernel`]
/// onward. Used by [`crate::arch`] and [`crate::err`] to print diagnostics
/// from exception context.
pub fn console() -> &'static Console {
    unsafe { (*core::ptr::addr_of!(CONSOLE)).as_ref() }
        .expect("console() called before start_kernel installed it")
}

/// The GIC singleton. See [`console`].
pub fn gic() -> &'static Gic {
    unsafe { (*core::ptr::addr_of!(GIC)).as_ref() }.expect("gic() called before start_kernel installed it")
}

/// The timer singleton. See [`console`].
pub fn timer() -> &'static Timer {
    unsafe { (*core::ptr::addr_of!(TIMER)).as_ref() }
        .expect("timer() called before start_kernel installed it")
}

/// A board-supplied description of what to run at boot: the idle task plus
/// zero or more ordinary tasks. `boot` builds one of these and passes it
/// in; this module doesn't know or care what the tasks actually do.
pub struct BootTasks {
    pub idle_entry: extern "C" fn(usize) -> !,
    pub tasks: &'static [(extern "C" fn(usize) -> !, usize, &'static str)],
}

/// Brings the kernel up and never returns: the last thing this function
/// does is become the idle task's first `eret`, after which control lives
/// entirely in the scheduler and the tasks it runs.
///
/// # Safety
///
/// Must be called exactly once, from `_start`, before any exception can be
/// taken and with the boot stack still in its initial state.
pub unsafe fn start_kernel(boot: BootTasks) -> ! {
    let console = unsafe { Console::new(config::UART0_BASE) };
    unsafe {
        CONSOLE = Some(console);
    }
    let console = self::console();
    crate::klog!(console, "picos-aarch64 kernel initializing...");

    unsafe {
        crate::arch::install_vectors();
    }
    crate::klog!(console, "exception vectors installed");

    let gic = unsafe { Gic::new(config::GICD_BASE, config::GICC_BASE) };
    gic.init();
    gic.enable(config::TIMER_IRQ, 0x01, 0x80);
    unsafe {
        GIC = Some(gic);
    }
    crate::klog!(console, "GIC initialized, timer IRQ enabled");

    let timer = Timer::init_periodic(config::TICK_INTERVAL_MS);
    console.puts("timer armed for ");
    console.put_dec(config::TICK_INTERVAL_MS as u64);
    console.puts("ms ticks (");
    console.put_dec(timer.interval_ticks());
    console.puts(" counter ticks)\n");
    unsafe {
        TIMER = Some(timer);
    }

    crate::task::init();

    crate::task::spawn_idle(boot.idle_entry).unwrap_or_else(|_| {
        crate::err::fatal(console, "failed to create idle task")
    });
    crate::klog!(console, "idle task created");

    for &(entry, arg, name) in boot.tasks {
        match crate::task::task_create(entry, arg, name) {
            Ok(pid) => {
                console.puts("task '");
                console.puts(name);
                console.puts("' created, pid=");
                console.put_dec(pid as u64);
                console.puts("\n");
            }
            Err(_) => {
                console.puts("task '");
                console.puts(name);
                console.puts("' failed to create (resource exhaustion)\n");
            }
        }
    }

    let first_sp = crate::task::first_stack_pointer();
    crate::klog!(console, "entering first task");

    // IRQs stay masked at the core (DAIF.I set since reset) until the frame
    // restore below does `eret`, which atomically loads SPSR_EL1 and with
    // it the fabricated frame's unmasked interrupt state. There is no
    // separate "now enable interrupts" step: unmasking and starting the
    // first task happen in the same instruction.
    enter_first_task(first_sp)
}

/// Jumps into the first task's fabricated trap frame by the same restore
/// sequence the IRQ epilogue uses, so the bootstrap path and the ordinary
/// preemption path share exactly one way of starting a task's register
/// state running.
fn enter_first_task(sp: usize) -> ! {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "mov sp, {sp}",
            "ldp x0, x1, [sp, #248]",
            "msr spsr_el1, x0",
            "msr elr_el1, x1",
            "ldp x0, x1, [sp, #0]",
            "ldp x2, x3, [sp, #16]",
            "ldp x4, x5, [sp, #32]",
            "ldp x6, x7, [sp, #48]",
            "ldp x8, x9, [sp, #64]",
            "ldp x10, x11, [sp, #80]",
            "ldp x12, x13, [sp, #96]",
            "ldp x14, x15, [sp, #112]",
            "ldp x16, x17, [sp, #128]",
            "ldp x18, x19, [sp, #144]",
            "ldp x20, x21, [sp, #160]",
            "ldp x22, x23, [sp, #176]",
            "ldp x24, x25, [sp, #192]",
            "ldp x26, x27, [sp, #208]",
            "ldp x28, x29, [sp, #224]",
            "ldr x30, [sp, #240]",
            "add sp, sp, #272",
            "eret",
            sp = in(reg) sp,
            options(noreturn),
        );
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = sp;
        unreachable!("enter_first_task is only reachable on real hardware")
    }
}
