// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task control blocks, the stack pool, the ready queue, and the scheduler.
//!
//! Everything here is single-core and runs either with interrupts disabled
//! (task creation, which the startup sequence does before unmasking IRQs)
//! or from inside the IRQ handler itself (the scheduler), so none of it
//! needs locks: `crate::task` *is* the critical section, the same
//! assumption the original task subsystem made.

use crate::arch::TrapFrame;
use crate::config::{MAX_TASKS, TASK_STACK_SIZE};
use crate::err::TaskCreateError;

/// `Blocked` is carried for forward compatibility with a future blocking
/// primitive; nothing in this kernel currently puts a task into it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Unused,
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// One task's bookkeeping. `saved_sp` points at a [`TrapFrame`] sitting on
/// that task's own stack, real if the task has been preempted at least
/// once, fabricated if it never has.
#[derive(Clone, Copy)]
pub struct Tcb {
    pub pid: u32,
    pub state: TaskState,
    pub saved_sp: usize,
    pub stack_base: usize,
    pub stack_size: usize,
    pub stack_index: usize,
    /// Reserved for a future MMU; always null. Never read.
    pub page_table_base: usize,
    pub name: &'static str,
    /// Index of the next TCB in the ready queue, or `usize::MAX` if this
    /// task is not currently queued. Must be reset to `usize::MAX` whenever
    /// a task leaves the queue; a stale link here is the one bug class the
    /// original intrusive-list design is prone to.
    pub next_in_queue: usize,
}

const NONE: usize = usize::MAX;

const UNUSED_TCB: Tcb = Tcb {
    pid: 0,
    state: TaskState::Unused,
    saved_sp: 0,
    stack_base: 0,
    stack_size: 0,
    stack_index: NONE,
    page_table_base: 0,
    name: "",
    next_in_queue: NONE,
};

#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Stack([u8; TASK_STACK_SIZE]);

const EMPTY_STACK: Stack = Stack([0; TASK_STACK_SIZE]);

struct Kernel {
    tasks: [Tcb; MAX_TASKS],
    stacks: [Stack; MAX_TASKS],
    /// One bit per stack slot; `true` means allocated. A plain bool array
    /// rather than a packed bitmap: `MAX_TASKS` is small enough that the
    /// extra bytes don't matter and the reclaim logic reads far more
    /// clearly this way.
    stack_used: [bool; MAX_TASKS],
    next_pid: u32,
    ready_head: usize,
    ready_tail: usize,
    current: usize,
    idle: usize,
}

static mut KERNEL: Kernel = Kernel {
    tasks: [UNUSED_TCB; MAX_TASKS],
    stacks: [EMPTY_STACK; MAX_TASKS],
    stack_used: [false; MAX_TASKS],
    next_pid: 1,
    ready_head: NONE,
    ready_tail: NONE,
    current: NONE,
    idle: NONE,
};

/// # Safety
///
/// Caller must already be in the single-core, IRQs-disabled-or-within-IRQ
/// critical section every other function in this module assumes.
#[allow(static_mut_refs)]
unsafe fn kernel() -> &'static mut Kernel {
    unsafe { &mut *core::ptr::addr_of_mut!(KERNEL) }
}

fn alloc_stack(k: &mut Kernel) -> Option<usize> {
    k.stack_used.iter().position(|&used| !used).inspect(|&i| {
        k.stack_used[i] = true;
    })
}

fn free_stack(k: &mut Kernel, index: usize) {
    k.stack_used[index] = false;
}

fn push_ready(k: &mut Kernel, index: usize) {
    k.tasks[index].next_in_queue = NONE;
    if k.ready_tail == NONE {
        k.ready_head = index;
    } else {
        k.tasks[k.ready_tail].next_in_queue = index;
    }
    k.ready_tail = index;
}

fn pop_ready(k: &mut Kernel) -> Option<usize> {
    if k.ready_head == NONE {
        return None;
    }
    let index = k.ready_head;
    k.ready_head = k.tasks[index].next_in_queue;
    if k.ready_head == NONE {
        k.ready_tail = NONE;
    }
    k.tasks[index].next_in_queue = NONE;
    Some(index)
}

/// Sets up the task table and stack pool. Must run once, before the first
/// call to [`task_create`].
pub fn init() {
    let k = unsafe { kernel() };
    *k = Kernel {
        tasks: [UNUSED_TCB; MAX_TASKS],
        stacks: [EMPTY_STACK; MAX_TASKS],
        stack_used: [false; MAX_TASKS],
        next_pid: 1,
        ready_head: NONE,
        ready_tail: NONE,
        current: NONE,
        idle: NONE,
    };
}

/// Creates a task running `entry(arg)` and places it on the ready queue.
///
/// Fabricates the initial [`TrapFrame`] at the top of the new stack so the
/// ordinary interrupt-return path can start the task: the new task's first
/// instruction runs exactly the way a preempted task's next instruction
/// would, through `eret`.
pub fn task_create(
    entry: extern "C" fn(usize) -> !,
    arg: usize,
    name: &'static str,
) -> Result<u32, TaskCreateError> {
    let k = unsafe { kernel() };

    let slot = k
        .tasks
        .iter()
        .position(|t| t.state == TaskState::Unused)
        .ok_or(TaskCreateError::NoFreeTask)?;

    let stack_index = alloc_stack(k).ok_or(TaskCreateError::NoFreeStack)?;

    let pid = k.next_pid;
    k.next_pid += 1;

    let frame = TrapFrame::fabricate(entry, arg);
    let stack_base = k.stacks[stack_index].0.as_ptr() as usize;
    let stack_top = stack_base + TASK_STACK_SIZE;
    let frame_addr = (stack_top - core::mem::size_of::<TrapFrame>()) & !0xF;
    unsafe {
        core::ptr::write(frame_addr as *mut TrapFrame, frame);
    }

    k.tasks[slot] = Tcb {
        pid,
        state: TaskState::Ready,
        saved_sp: frame_addr,
        stack_base,
        stack_size: TASK_STACK_SIZE,
        stack_index,
        page_table_base: 0,
        name,
        next_in_queue: NONE,
    };

    push_ready(k, slot);

    Ok(pid)
}

/// Marks the running task a zombie. Its stack and slot are reclaimed the
/// next time [`schedule`] runs, not here: the task calling this is still
/// executing on the stack that's about to be freed.
pub fn task_exit() -> ! {
    let k = unsafe { kernel() };
    if k.current != NONE {
        k.tasks[k.current].state = TaskState::Zombie;
    }
    crate::arch::wfi();
    loop {
        crate::arch::wfi();
    }
}

/// Marks a task slot UNUSED and gives its stack back to the pool. Called
/// from [`schedule`] for the outgoing task once it's safe to do so: after
/// its context has already been saved and we're about to switch away from
/// it for good.
fn reap(k: &mut Kernel, index: usize) {
    free_stack(k, k.tasks[index].stack_index);
    k.tasks[index] = UNUSED_TCB;
}

/// The scheduler. Takes the stack pointer of whichever task was just
/// interrupted (or, for the very first call, the boot stack) and returns
/// the stack pointer to resume from.
///
/// Reaps a zombie if the outgoing task became one, puts a still-ready
/// outgoing task back on the tail of the queue, pops the next ready task
/// (falling back to the idle task if the queue is empty), and hands back
/// its saved stack pointer.
pub fn schedule(sp_in: usize) -> usize {
    let k = unsafe { kernel() };

    let prev = k.current;
    if prev != NONE {
        if prev != k.idle && k.tasks[prev].state == TaskState::Zombie {
            reap(k, prev);
        } else if prev == k.idle {
            k.tasks[prev].saved_sp = sp_in;
        } else if k.tasks[prev].state == TaskState::Running {
            k.tasks[prev].state = TaskState::Ready;
            k.tasks[prev].saved_sp = sp_in;
            push_ready(k, prev);
        }
    }

    let next = pop_ready(k).unwrap_or(k.idle);
    k.tasks[next].state = TaskState::Running;
    k.current = next;
    k.tasks[next].saved_sp
}

/// Creates the idle task and removes it from the ready queue: it is the
/// scheduler's fallback when the queue is empty, never something picked up
/// by the normal FIFO rotation.
///
/// Must be called before any other [`task_create`], while the ready queue
/// is still empty — it unlinks the new task by resetting the queue rather
/// than walking the list for a predecessor, which only holds if the idle
/// task is the sole entry.
pub fn spawn_idle(entry: extern "C" fn(usize) -> !) -> Result<(), TaskCreateError> {
    let k = unsafe { kernel() };
    debug_assert_eq!(k.ready_head, NONE, "spawn_idle must run before other tasks");

    let pid = task_create(entry, 0, "idle")?;
    let k = unsafe { kernel() };
    let index = k
        .tasks
        .iter()
        .position(|t| t.pid == pid)
        .expect("just-created idle task must exist");
    k.ready_head = NONE;
    k.ready_tail = NONE;
    k.tasks[index].next_in_queue = NONE;
    k.idle = index;
    Ok(())
}

/// Returns the stack pointer [`crate::startup`] should switch to for the
/// very first scheduling decision: the idle task's saved (fabricated)
/// frame, with `current` left unset so the bookkeeping in [`schedule`]
/// treats it as the first call.
pub fn first_stack_pointer() -> usize {
    let k = unsafe { kernel() };
    let index = pop_ready(k).unwrap_or(k.idle);
    k.tasks[index].state = TaskState::Running;
    k.current = index;
    k.tasks[index].saved_sp
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn task_a(_arg: usize) -> ! {
        loop {}
    }

    fn reset() {
        init();
    }

    #[test]
    fn create_assigns_increasing_pids() {
        reset();
        let p1 = task_create(task_a, 0, "a").unwrap();
        let p2 = task_create(task_a, 0, "b").unwrap();
        assert!(p2 > p1);
    }

    #[test]
    fn stack_exhaustion_is_reported_before_table_exhaustion_would_be() {
        reset();
        // MAX_TASKS stacks total; this loop alone can exhaust them.
        for _ in 0..MAX_TASKS {
            task_create(task_a, 0, "t").unwrap();
        }
        assert_eq!(
            task_create(task_a, 0, "overflow"),
            Err(TaskCreateError::NoFreeTask)
        );
    }

    #[test]
    fn ready_queue_is_fifo() {
        reset();
        let pa = task_create(task_a, 0, "a").unwrap();
        let pb = task_create(task_a, 0, "b").unwrap();
        let k = unsafe { kernel() };
        let first = pop_ready(k).unwrap();
        let second = pop_ready(k).unwrap();
        assert_eq!(k.tasks[first].pid, pa);
        assert_eq!(k.tasks[second].pid, pb);
    }

    #[test]
    fn schedule_requeues_still_running_task_at_tail() {
        reset();
        spawn_idle(task_a).unwrap();
        let pa = task_create(task_a, 0, "a").unwrap();
        let pb = task_create(task_a, 0, "b").unwrap();

        let sp = first_stack_pointer();
        let k = unsafe { kernel() };
        assert_eq!(k.tasks[k.current].pid, pa);

        // "a" is preempted while still runnable: schedule() should hand
        // control to "b" next and put "a" back at the tail.
        let next_sp = schedule(sp);
        let k = unsafe { kernel() };
        assert_eq!(k.tasks[k.current].pid, pb);
        assert_ne!(next_sp, 0);
    }

    #[test]
    fn zombie_task_is_reaped_and_stack_reclaimed() {
        reset();
        spawn_idle(task_a).unwrap();
        let pa = task_create(task_a, 0, "a").unwrap();

        let sp = first_stack_pointer();
        {
            let k = unsafe { kernel() };
            assert_eq!(k.tasks[k.current].pid, pa);
            k.tasks[k.current].state = TaskState::Zombie;
        }

        schedule(sp);

        let k = unsafe { kernel() };
        assert!(k
            .tasks
            .iter()
            .all(|t| t.pid != pa || t.state == TaskState::Unused));
        // The reclaimed stack slot must be available to a new task.
        let stacks_free_before = k.stack_used.iter().filter(|&&u| !u).count();
        drop(k);
        task_create(task_a, 0, "c").unwrap();
        let k = unsafe { kernel() };
        let stacks_free_after = k.stack_used.iter().filter(|&&u| !u).count();
        assert_eq!(stacks_free_before, stacks_free_after + 1);
    }

    #[test]
    fn empty_ready_queue_falls_back_to_idle() {
        reset();
        spawn_idle(task_a).unwrap();
        let sp = first_stack_pointer();
        {
            let k = unsafe { kernel() };
            k.tasks[k.current].state = TaskState::Zombie;
        }
        schedule(sp);
        let k = unsafe { kernel() };
        assert_eq!(k.current, k.idle);
    }
}
