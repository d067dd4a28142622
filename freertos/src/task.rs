// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Tasks
//!
//! A [`Task`] owns a kernel task together with the routine it runs.  The routine is moved into a
//! context that lives as long as the kernel task does: in the kernel heap for [`Dynamic`] tasks,
//! or inside the [`TaskStorage`] for static ones, next to the stack and control block.  Dropping
//! the `Task` deletes the kernel task first, and only then frees the context.
//!
//! ```ignore
//! let blinker = TaskBuilder::new()
//!     .name("blink")
//!     .priority(2)
//!     .spawn(move || loop {
//!         led.toggle();
//!         sleep(Duration::millis(500));
//!     })?;
//! ```
//!
//! When its routine returns, the task suspends itself, and stays that way until the `Task` is
//! dropped.
//!
//! Deleting a task is forcible.  It stops wherever it is, and nothing on its stack is dropped.  A
//! task deleted while holding a mutex leaves it held.
//!
//! ## Referring to tasks
//!
//! A [`TaskRef`] borrows a task, and carries the operations that act on it: suspend and resume,
//! priority, and notifications.  It is tied to the [`Task`] it came from, so it cannot be used
//! after the task is deleted.  The running task is available through [`current`], and a [`Task`]
//! that should run for the rest of the program can be turned into a `TaskRef<'static>` with
//! [`Task::detach`].  A [`TaskId`] is only an identity, for comparisons.
//!
//! [`Dynamic`]: crate::object::Dynamic

use core::cell::UnsafeCell;
use core::ffi::{c_void, CStr};
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{addr_of_mut, null_mut};

use log::trace;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::{configMAX_PRIORITIES, configMAX_TASK_NAME_LEN, configMINIMAL_STACK_SIZE};
use crate::error::{to_result, Error, Result};
use crate::isr::TaskWoken;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    configSTACK_DEPTH_TYPE, pdFALSE, pdTRUE, taskYIELD, uxTaskGetNumberOfTasks, vTaskDelete,
    xTaskGetCurrentTaskHandle, xTaskGetSchedulerState, StackType_t, StaticTask_t, TaskHandle_t,
    UBaseType_t,
};
use crate::time::Timeout;

#[cfg(configUSE_TASK_NOTIFICATIONS)]
mod periodic;

#[cfg(configUSE_TASK_NOTIFICATIONS)]
pub use periodic::{Periodic, PeriodicTask, STOP_INDEX};

/// The length of a task name, including its terminating nul.
pub const NAME_LEN: usize = configMAX_TASK_NAME_LEN as usize;

/// The code a task runs.
///
/// Implemented for every `FnOnce() + Send + 'static` closure.  It can also be implemented
/// directly, for a task whose state is a named type.
pub trait TaskRoutine: Send + 'static {
    /// Run the task.  Called exactly once, on the new task.
    fn run(self);
}

impl<F: FnOnce() + Send + 'static> TaskRoutine for F {
    fn run(self) {
        self()
    }
}

/// The routine of a task, for as long as the kernel task may run.
#[doc(hidden)]
pub struct TaskContext<R> {
    routine: UnsafeCell<Option<R>>,
    finished: AtomicBool,
}

impl<R> TaskContext<R> {
    fn new(routine: R) -> TaskContext<R> {
        TaskContext {
            routine: UnsafeCell::new(Some(routine)),
            finished: AtomicBool::new(false),
        }
    }
}

/// The kernel entry point for a task running `R`.
unsafe extern "C" fn task_entry<R: TaskRoutine>(arg: *mut c_void) {
    let context = &*(arg as *const TaskContext<R>);
    // Only this task touches the routine until it is deleted.
    if let Some(routine) = (*context.routine.get()).take() {
        routine.run();
    }
    context.finished.store(true, Ordering::Release);

    // Returning from a task function is not allowed.  Wait here to be deleted by the owner.
    loop {
        #[cfg(INCLUDE_vTaskSuspend)]
        crate::raw::vTaskSuspend(null_mut());
        #[cfg(not(INCLUDE_vTaskSuspend))]
        crate::raw::vTaskDelay(crate::raw::portMAX_DELAY);
    }
}

/// Static storage for a task: the control block, a stack of `STACK` words, and the routine.
///
/// A `static` needs a type it can name, so the routine here is either a function pointer or a
/// type implementing [`TaskRoutine`]:
///
/// ```ignore
/// static WORKER: StaticStorage<TaskStorage<fn(), 1024>> = StaticStorage::new();
///
/// let worker = TaskBuilder::new().name("worker").spawn_in(&WORKER, worker_main as fn())?;
/// ```
#[repr(C)]
pub struct TaskStorage<R, const STACK: usize> {
    control: StaticTask_t,
    stack: [StackType_t; STACK],
    context: TaskContext<R>,
}

/// An allocation strategy that can create a task running `R`.
pub trait TaskAllocator<R: TaskRoutine>: Allocation {
    /// Create the task, returning it and the context it runs from.
    ///
    /// # Safety
    ///
    /// On success, the context must be released with [`free_context`](Self::free_context) after
    /// the kernel task has been deleted.
    #[doc(hidden)]
    unsafe fn create_task(
        &self,
        settings: &TaskSettings<'_>,
        routine: R,
    ) -> Result<(TaskHandle_t, *mut TaskContext<R>)>;

    /// Drop the context, and free it if it was allocated.
    ///
    /// # Safety
    ///
    /// The kernel task running from the context must have been deleted.
    #[doc(hidden)]
    unsafe fn free_context(&self, context: *mut TaskContext<R>);
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<R: TaskRoutine> TaskAllocator<R> for Dynamic {
    unsafe fn create_task(
        &self,
        settings: &TaskSettings<'_>,
        routine: R,
    ) -> Result<(TaskHandle_t, *mut TaskContext<R>)> {
        use crate::heap::KernelBox;

        let context = KernelBox::new(TaskContext::new(routine))?.into_raw();
        let mut handle = null_mut();
        let created = crate::raw::xTaskCreate(
            Some(task_entry::<R>),
            settings.name.as_ptr() as *const _,
            settings.stack_depth,
            context as *mut c_void,
            settings.priority,
            &mut handle,
        );
        if created != crate::raw::pdPASS {
            drop(KernelBox::from_raw(context));
            return Err(Error::OutOfMemory);
        }
        Ok((handle, context))
    }

    unsafe fn free_context(&self, context: *mut TaskContext<R>) {
        drop(crate::heap::KernelBox::from_raw(context));
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<R: TaskRoutine, const STACK: usize> TaskAllocator<R>
    for &'static StaticStorage<TaskStorage<R, STACK>>
{
    unsafe fn create_task(
        &self,
        settings: &TaskSettings<'_>,
        routine: R,
    ) -> Result<(TaskHandle_t, *mut TaskContext<R>)> {
        // The stack size is fixed by the storage, and the builder's is ignored.
        let stack_depth = to_kernel::<configSTACK_DEPTH_TYPE>(STACK)?;
        let storage = self.claim()?;
        let context = addr_of_mut!((*storage).context);
        context.write(TaskContext::new(routine));
        let handle = crate::raw::xTaskCreateStatic(
            Some(task_entry::<R>),
            settings.name.as_ptr() as *const _,
            stack_depth,
            context as *mut c_void,
            settings.priority,
            addr_of_mut!((*storage).stack) as *mut StackType_t,
            addr_of_mut!((*storage).control),
        );
        if handle.is_null() {
            core::ptr::drop_in_place(context);
            self.unclaim();
            return Err(Error::InvalidArgument);
        }
        Ok((handle, context))
    }

    unsafe fn free_context(&self, context: *mut TaskContext<R>) {
        core::ptr::drop_in_place(context);
    }
}

/// A size or priority in the kernel's own type, or [`Error::InvalidArgument`] if it doesn't fit.
fn to_kernel<T: TryFrom<usize>>(value: usize) -> Result<T> {
    T::try_from(value).map_err(|_| Error::InvalidArgument)
}

/// The checked settings a task is created with.
#[doc(hidden)]
pub struct TaskSettings<'a> {
    name: &'a [u8; NAME_LEN],
    stack_depth: configSTACK_DEPTH_TYPE,
    priority: UBaseType_t,
}

/// Settings for a new task.
pub struct TaskBuilder {
    name: [u8; NAME_LEN],
    stack_depth: usize,
    priority: usize,
    start_suspended: bool,
}

impl TaskBuilder {
    /// Start from the defaults: no name, the minimal stack, and priority 1.
    pub fn new() -> TaskBuilder {
        TaskBuilder {
            name: [0; NAME_LEN],
            stack_depth: configMINIMAL_STACK_SIZE as usize,
            priority: 1,
            start_suspended: false,
        }
    }

    /// Name the task.  The kernel copies the name, truncated to `NAME_LEN - 1` bytes.
    pub fn name(mut self, name: &str) -> TaskBuilder {
        let mut len = name.len().min(NAME_LEN - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.name = [0; NAME_LEN];
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        self
    }

    /// The stack size, in words of `StackType_t`, for a dynamically allocated task.  A size too
    /// large for `configSTACK_DEPTH_TYPE` fails the spawn with [`Error::InvalidArgument`].
    pub fn stack_depth(mut self, words: usize) -> TaskBuilder {
        self.stack_depth = words;
        self
    }

    /// The priority, from 0 (idle) to `configMAX_PRIORITIES - 1`.
    pub fn priority(mut self, priority: usize) -> TaskBuilder {
        self.priority = priority;
        self
    }

    /// Create the task suspended, so it won't run until resumed.
    #[cfg(INCLUDE_vTaskSuspend)]
    pub fn start_suspended(mut self, suspended: bool) -> TaskBuilder {
        self.start_suspended = suspended;
        self
    }

    /// Create a task from the kernel heap.
    #[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
    pub fn spawn<R: TaskRoutine>(self, routine: R) -> Result<Task<R, Dynamic>> {
        self.spawn_with(Dynamic, routine)
    }

    /// Create a task in static storage.
    #[cfg(configSUPPORT_STATIC_ALLOCATION)]
    pub fn spawn_in<R: TaskRoutine, const STACK: usize>(
        self,
        storage: &'static StaticStorage<TaskStorage<R, STACK>>,
        routine: R,
    ) -> Result<Task<R, &'static StaticStorage<TaskStorage<R, STACK>>>> {
        self.spawn_with(storage, routine)
    }

    /// Create a task in the given allocation.
    pub fn spawn_with<R: TaskRoutine, A: TaskAllocator<R>>(
        self,
        alloc: A,
        routine: R,
    ) -> Result<Task<R, A>> {
        let settings = TaskSettings {
            name: &self.name,
            stack_depth: to_kernel(self.stack_depth)?,
            priority: to_kernel(self.priority)?,
        };
        if settings.priority >= configMAX_PRIORITIES as UBaseType_t || settings.stack_depth == 0 {
            return Err(Error::InvalidArgument);
        }

        // Holding the scheduler keeps a suspended task from running before it is suspended.
        let lock = self
            .start_suspended
            .then(crate::critical::SchedulerLock::lock);
        let (handle, context) = unsafe { alloc.create_task(&settings, routine)? };
        #[cfg(INCLUDE_vTaskSuspend)]
        {
            if self.start_suspended {
                unsafe { crate::raw::vTaskSuspend(handle) };
            }
        }
        drop(lock);

        trace!("task {:?} created", handle);
        Ok(Task {
            task: TaskRef::new(handle),
            context,
            alloc,
        })
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A kernel task, and the routine it runs.
///
/// Dropping this deletes the task.
pub struct Task<R: TaskRoutine, A: TaskAllocator<R> = Dynamic> {
    task: TaskRef<'static>,
    context: *mut TaskContext<R>,
    alloc: A,
}

// The context is only used by the kernel task itself.
unsafe impl<R: TaskRoutine, A: TaskAllocator<R> + Send> Send for Task<R, A> {}
unsafe impl<R: TaskRoutine, A: TaskAllocator<R> + Sync> Sync for Task<R, A> {}

impl<R: TaskRoutine, A: TaskAllocator<R>> Task<R, A> {
    /// A reference to the task, valid while this is.
    pub fn task_ref(&self) -> TaskRef<'_> {
        self.task
    }

    /// The identity of the task.
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Has the routine returned?  The task stays suspended from then on.
    pub fn is_finished(&self) -> bool {
        // The context lives until this is dropped.
        unsafe { (*self.context).finished.load(Ordering::Acquire) }
    }

    /// Delete the task now.  The same as dropping it.
    pub fn delete(self) {
        drop(self)
    }

    /// Let the task run for the rest of the program.
    ///
    /// The task and its context are never freed, so the reference is good forever.
    pub fn detach(self) -> TaskRef<'static> {
        let task = self.task;
        core::mem::forget(self);
        task
    }
}

impl<R: TaskRoutine, A: TaskAllocator<R>> Drop for Task<R, A> {
    fn drop(&mut self) {
        trace!("task {:?} deleted", self.task.handle);
        unsafe {
            vTaskDelete(self.task.handle);
            self.alloc.free_context(self.context);
            self.alloc.release();
        }
    }
}

impl<R: TaskRoutine, A: TaskAllocator<R>> fmt::Debug for Task<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task {:?}", self.task)
    }
}

/// A task whose routine is a boxed closure, so tasks with different closures have one type.
#[cfg(all(feature = "alloc", configSUPPORT_DYNAMIC_ALLOCATION))]
pub type BoxedTask = Task<alloc::boxed::Box<dyn FnOnce() + Send>, Dynamic>;

/// Spawn a task with the default settings, running a boxed closure.
#[cfg(all(feature = "alloc", configSUPPORT_DYNAMIC_ALLOCATION))]
pub fn spawn<F: FnOnce() + Send + 'static>(f: F) -> Result<BoxedTask> {
    let routine: alloc::boxed::Box<dyn FnOnce() + Send> = alloc::boxed::Box::new(f);
    TaskBuilder::new().spawn(routine)
}

/// The identity of a task.  It can only be compared, not used to act on the task.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

impl TaskId {
    fn of(handle: TaskHandle_t) -> TaskId {
        TaskId(handle as usize)
    }

    /// A task id from a raw handle, or None for a null one.
    pub fn from_raw(handle: TaskHandle_t) -> Option<TaskId> {
        (!handle.is_null()).then(|| TaskId::of(handle))
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({:#x})", self.0)
    }
}

/// The state of a task, as the scheduler sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// The task querying its own state.
    Running,
    /// Able to run, and waiting for the processor.
    Ready,
    /// Waiting on a delay or a kernel object.
    Blocked,
    /// Suspended, or blocked with no timeout.
    Suspended,
    /// Deleted, and not yet cleaned up by the idle task.
    Deleted,
    /// Not a valid task.
    Invalid,
}

impl TaskState {
    fn from_raw(state: crate::raw::eTaskState) -> TaskState {
        use crate::raw::{eBlocked, eDeleted, eReady, eRunning, eSuspended};

        match state {
            s if s == eRunning => TaskState::Running,
            s if s == eReady => TaskState::Ready,
            s if s == eBlocked => TaskState::Blocked,
            s if s == eSuspended => TaskState::Suspended,
            s if s == eDeleted => TaskState::Deleted,
            _ => TaskState::Invalid,
        }
    }
}

/// A task name, copied out of the control block.
#[derive(Clone, Copy)]
pub struct TaskName {
    buf: [u8; NAME_LEN],
    len: usize,
}

impl TaskName {
    fn from_cstr(name: &CStr) -> TaskName {
        let bytes = name.to_bytes();
        let len = bytes.len().min(NAME_LEN);
        let mut buf = [0; NAME_LEN];
        buf[..len].copy_from_slice(&bytes[..len]);
        TaskName { buf, len }
    }

    /// The name as a string.  A name that is not valid UTF-8 is cut at the first bad byte.
    pub fn as_str(&self) -> &str {
        let bytes = &self.buf[..self.len];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// An update to a task's notification value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notify {
    /// Mark the notification pending, leaving the value alone.
    NoAction,
    /// OR bits into the value.
    SetBits(u32),
    /// Add one to the value.
    Increment,
    /// Replace the value.
    SetValueWithOverwrite(u32),
    /// Replace the value, unless a previous notification is still pending.  In that case the
    /// notify fails with [`Error::Full`].
    SetValueWithoutOverwrite(u32),
}

impl Notify {
    fn raw(self) -> (u32, crate::raw::eNotifyAction) {
        use crate::raw::{eIncrement, eNoAction, eSetBits, eSetValueWithOverwrite};
        use crate::raw::eSetValueWithoutOverwrite;

        match self {
            Notify::NoAction => (0, eNoAction),
            Notify::SetBits(bits) => (bits, eSetBits),
            Notify::Increment => (0, eIncrement),
            Notify::SetValueWithOverwrite(value) => (value, eSetValueWithOverwrite),
            Notify::SetValueWithoutOverwrite(value) => (value, eSetValueWithoutOverwrite),
        }
    }
}

/// Check a notification index against the configured array size.
fn notify_index(index: usize) -> Result<UBaseType_t> {
    if index >= crate::config::configTASK_NOTIFICATION_ARRAY_ENTRIES as usize {
        Err(Error::InvalidArgument)
    } else {
        Ok(index as UBaseType_t)
    }
}

/// A borrowed kernel task.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaskRef<'a> {
    handle: TaskHandle_t,
    _task: PhantomData<&'a ()>,
}

// All operations go through the kernel.
unsafe impl Send for TaskRef<'_> {}
unsafe impl Sync for TaskRef<'_> {}

impl<'a> TaskRef<'a> {
    fn new(handle: TaskHandle_t) -> TaskRef<'a> {
        TaskRef {
            handle,
            _task: PhantomData,
        }
    }

    /// A reference to a task created outside of this crate.
    ///
    /// # Safety
    ///
    /// The handle must be valid, and the task must not be deleted while the reference is in use.
    pub unsafe fn from_raw(handle: TaskHandle_t) -> TaskRef<'a> {
        TaskRef::new(handle)
    }

    /// The raw handle, for calling the kernel directly.
    pub fn as_raw(&self) -> TaskHandle_t {
        self.handle
    }

    /// The identity of this task.
    pub fn id(&self) -> TaskId {
        TaskId::of(self.handle)
    }

    /// Suspend the task until it is resumed.  Suspensions do not nest.
    #[cfg(INCLUDE_vTaskSuspend)]
    pub fn suspend(&self) {
        unsafe { crate::raw::vTaskSuspend(self.handle) }
    }

    /// Resume a suspended task.
    #[cfg(INCLUDE_vTaskSuspend)]
    pub fn resume(&self) {
        unsafe { crate::raw::vTaskResume(self.handle) }
    }

    /// Resume a suspended task from an interrupt handler.
    #[cfg(all(INCLUDE_vTaskSuspend, INCLUDE_xTaskResumeFromISR))]
    pub fn resume_isr(&self, woken: &mut TaskWoken) {
        if unsafe { crate::raw::xTaskResumeFromISR(self.handle) } != pdFALSE {
            woken.wake();
        }
    }

    /// Wake the task early from a delay or a blocking call, which then times out.  Returns false
    /// if the task was not blocked.
    #[cfg(INCLUDE_xTaskAbortDelay)]
    pub fn abort_delay(&self) -> bool {
        unsafe { crate::raw::xTaskAbortDelay(self.handle) != pdFALSE }
    }

    /// The task's priority.
    #[cfg(INCLUDE_uxTaskPriorityGet)]
    pub fn priority(&self) -> usize {
        unsafe { crate::raw::uxTaskPriorityGet(self.handle) as usize }
    }

    /// The task's priority, from an interrupt handler.
    #[cfg(INCLUDE_uxTaskPriorityGet)]
    pub fn priority_isr(&self) -> usize {
        unsafe { crate::raw::uxTaskPriorityGetFromISR(self.handle) as usize }
    }

    /// Change the task's priority.
    #[cfg(INCLUDE_vTaskPrioritySet)]
    pub fn set_priority(&self, priority: usize) -> Result<()> {
        if priority >= configMAX_PRIORITIES as usize {
            return Err(Error::InvalidArgument);
        }
        unsafe { crate::raw::vTaskPrioritySet(self.handle, priority as UBaseType_t) };
        Ok(())
    }

    /// The task's state.
    #[cfg(INCLUDE_eTaskGetState)]
    pub fn state(&self) -> TaskState {
        TaskState::from_raw(unsafe { crate::raw::eTaskGetState(self.handle) })
    }

    /// The task's name.
    pub fn name(&self) -> TaskName {
        let name = unsafe { CStr::from_ptr(crate::raw::pcTaskGetName(self.handle)) };
        TaskName::from_cstr(name)
    }

    /// The least free stack space the task has had, in words.
    #[cfg(INCLUDE_uxTaskGetStackHighWaterMark2)]
    pub fn stack_high_water_mark(&self) -> usize {
        // The full width of configSTACK_DEPTH_TYPE, not cut down to UBaseType_t.
        unsafe { crate::raw::uxTaskGetStackHighWaterMark2(self.handle) as usize }
    }

    /// The least free stack space the task has had, in words.
    #[cfg(all(INCLUDE_uxTaskGetStackHighWaterMark, not(INCLUDE_uxTaskGetStackHighWaterMark2)))]
    pub fn stack_high_water_mark(&self) -> usize {
        unsafe { crate::raw::uxTaskGetStackHighWaterMark(self.handle) as usize }
    }

    /// What the kernel's trace facility knows about the task.
    ///
    /// Measuring the free stack walks the whole stack, so it is only done with `with_stack`.
    #[cfg(configUSE_TRACE_FACILITY)]
    pub fn status(&self, with_stack: bool) -> TaskStatus {
        let mut raw = core::mem::MaybeUninit::<crate::raw::TaskStatus_t>::uninit();
        let free_stack = if with_stack { pdTRUE } else { pdFALSE };
        unsafe {
            crate::raw::vTaskGetInfo(self.handle, raw.as_mut_ptr(), free_stack, crate::raw::eInvalid);
            TaskStatus::from_raw(raw.assume_init_ref(), with_stack)
        }
    }

    /// Set the task's application tag.  The kernel only keeps it, for the application's own hooks
    /// and for trace tools.
    #[cfg(configUSE_APPLICATION_TASK_TAG)]
    pub fn set_tag(&self, tag: crate::raw::TaskHookFunction_t) {
        unsafe { crate::raw::vTaskSetApplicationTaskTag(self.handle, tag) }
    }

    /// The task's application tag.
    #[cfg(configUSE_APPLICATION_TASK_TAG)]
    pub fn tag(&self) -> crate::raw::TaskHookFunction_t {
        unsafe { crate::raw::xTaskGetApplicationTaskTag(self.handle) }
    }

    /// The task's application tag, from an interrupt handler.
    #[cfg(configUSE_APPLICATION_TASK_TAG)]
    pub fn tag_isr(&self) -> crate::raw::TaskHookFunction_t {
        unsafe { crate::raw::xTaskGetApplicationTaskTagFromISR(self.handle) }
    }

    /// Send the task a notification on index 0.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify(&self, action: Notify) -> Result<()> {
        self.notify_indexed(0, action)
    }

    /// Send the task a notification on the given index.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_indexed(&self, index: usize, action: Notify) -> Result<()> {
        self.generic_notify(index, action, null_mut())
    }

    /// Notify on the given index, and return the notification value from before the update.
    ///
    /// A [`Notify::SetValueWithoutOverwrite`] that finds a notification pending fails with
    /// [`Error::Full`], and the value is left as it was.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_and_query(&self, index: usize, action: Notify) -> Result<u32> {
        let mut previous = 0;
        self.generic_notify(index, action, &mut previous)?;
        Ok(previous)
    }

    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    fn generic_notify(&self, index: usize, action: Notify, previous: *mut u32) -> Result<()> {
        let index = notify_index(index)?;
        let (value, action) = action.raw();
        let sent = unsafe {
            crate::raw::xTaskGenericNotify(self.handle, index, value, action, previous)
        };
        to_result(sent, Error::Full)
    }

    /// Notify from an interrupt handler, on index 0.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_isr(&self, action: Notify, woken: &mut TaskWoken) -> Result<()> {
        self.notify_indexed_isr(0, action, woken)
    }

    /// Notify from an interrupt handler, on the given index.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_indexed_isr(
        &self,
        index: usize,
        action: Notify,
        woken: &mut TaskWoken,
    ) -> Result<()> {
        self.generic_notify_isr(index, action, null_mut(), woken)
    }

    /// [`notify_and_query`](Self::notify_and_query) from an interrupt handler.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_and_query_isr(
        &self,
        index: usize,
        action: Notify,
        woken: &mut TaskWoken,
    ) -> Result<u32> {
        let mut previous = 0;
        self.generic_notify_isr(index, action, &mut previous, woken)?;
        Ok(previous)
    }

    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    fn generic_notify_isr(
        &self,
        index: usize,
        action: Notify,
        previous: *mut u32,
        woken: &mut TaskWoken,
    ) -> Result<()> {
        let index = notify_index(index)?;
        let (value, action) = action.raw();
        let sent = unsafe {
            crate::raw::xTaskGenericNotifyFromISR(
                self.handle,
                index,
                value,
                action,
                previous,
                woken.as_ptr(),
            )
        };
        to_result(sent, Error::Full)
    }

    /// Increment the notification value on index 0, as a lightweight counting semaphore.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_give(&self) {
        // Increment cannot fail.
        let _ = self.notify(Notify::Increment);
    }

    /// [`notify_give`](Self::notify_give) from an interrupt handler.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_give_isr(&self, woken: &mut TaskWoken) {
        unsafe {
            crate::raw::vTaskGenericNotifyGiveFromISR(
                self.handle,
                crate::raw::tskDEFAULT_INDEX_TO_NOTIFY,
                woken.as_ptr(),
            )
        }
    }

    /// Clear a pending notification.  Returns true if one was pending.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_state_clear(&self, index: usize) -> Result<bool> {
        let index = notify_index(index)?;
        Ok(unsafe { crate::raw::xTaskGenericNotifyStateClear(self.handle, index) != pdFALSE })
    }

    /// Clear bits in a notification value.  Returns the value before the clear.
    #[cfg(configUSE_TASK_NOTIFICATIONS)]
    pub fn notify_value_clear(&self, index: usize, bits: u32) -> Result<u32> {
        let index = notify_index(index)?;
        Ok(unsafe { crate::raw::ulTaskGenericNotifyValueClear(self.handle, index, bits) })
    }
}

impl fmt::Debug for TaskRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.handle, self.name())
    }
}

/// The running task.
///
/// It is neither `Send` nor `Sync`, so it cannot be handed to another task.
pub struct CurrentTask {
    task: TaskRef<'static>,
    _nosend: PhantomData<*const ()>,
}

impl CurrentTask {
    /// A reference to the running task, valid for this borrow.
    pub fn task_ref(&self) -> TaskRef<'_> {
        self.task
    }

    /// The identity of the running task.
    pub fn id(&self) -> TaskId {
        self.task.id()
    }
}

/// The running task.
#[cfg(INCLUDE_xTaskGetCurrentTaskHandle)]
pub fn current() -> CurrentTask {
    CurrentTask {
        task: TaskRef::new(unsafe { xTaskGetCurrentTaskHandle() }),
        _nosend: PhantomData,
    }
}

/// The identity of the running task.
#[cfg(INCLUDE_xTaskGetCurrentTaskHandle)]
pub fn current_id() -> TaskId {
    TaskId::of(unsafe { xTaskGetCurrentTaskHandle() })
}

/// Let other ready tasks of the same priority run.
pub fn yield_now() {
    unsafe { taskYIELD() }
}

/// The number of tasks the kernel knows about.
pub fn task_count() -> usize {
    unsafe { uxTaskGetNumberOfTasks() as usize }
}

/// The kernel's idle task.  It is never deleted.
#[cfg(INCLUDE_xTaskGetIdleTaskHandle)]
pub fn idle_task() -> TaskRef<'static> {
    TaskRef::new(unsafe { crate::raw::xTaskGetIdleTaskHandle() })
}

/// A task, as the kernel's trace facility reports it.
#[cfg(configUSE_TRACE_FACILITY)]
#[derive(Clone, Copy, Debug)]
pub struct TaskStatus {
    /// Which task.
    pub id: TaskId,
    /// Its name.
    pub name: TaskName,
    /// The number the kernel gave it at creation.
    pub number: usize,
    /// Its state when the status was taken.
    pub state: TaskState,
    /// Its priority, including any inherited from a mutex.
    pub priority: usize,
    /// The priority it would return to without inheritance.
    pub base_priority: usize,
    /// Run time counted for it, when the kernel gathers run time stats.
    pub run_time: u32,
    /// The least free stack it has had, in words, if that was measured.
    pub stack_high_water_mark: Option<usize>,
}

#[cfg(configUSE_TRACE_FACILITY)]
impl TaskStatus {
    /// # Safety
    ///
    /// The name in `raw` must still point into a live control block.
    unsafe fn from_raw(raw: &crate::raw::TaskStatus_t, with_stack: bool) -> TaskStatus {
        TaskStatus {
            id: TaskId::of(raw.xHandle),
            name: TaskName::from_cstr(CStr::from_ptr(raw.pcTaskName)),
            number: raw.xTaskNumber as usize,
            state: TaskState::from_raw(raw.eCurrentState),
            priority: raw.uxCurrentPriority as usize,
            base_priority: raw.uxBasePriority as usize,
            run_time: raw.ulRunTimeCounter,
            stack_high_water_mark: with_stack.then_some(raw.usStackHighWaterMark as usize),
        }
    }
}

/// Every task in the system, taken at one moment.
#[cfg(configUSE_TRACE_FACILITY)]
pub struct SystemState<const N: usize> {
    tasks: [Option<TaskStatus>; N],
    total_run_time: u32,
}

#[cfg(configUSE_TRACE_FACILITY)]
impl<const N: usize> SystemState<N> {
    /// The status of each task.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskStatus> {
        self.tasks.iter().flatten()
    }

    /// How many tasks there were.
    pub fn count(&self) -> usize {
        self.tasks().count()
    }

    /// The run time counter total, when the kernel gathers run time stats.
    pub fn total_run_time(&self) -> u32 {
        self.total_run_time
    }
}

/// The status of every task, for up to `N` of them.
///
/// The kernel reports nothing at all when there are more than `N` tasks, and this fails with
/// [`Error::InvalidArgument`].  The raw reports are gathered on the stack, so keep `N` modest.
#[cfg(configUSE_TRACE_FACILITY)]
pub fn system_state<const N: usize>() -> Result<SystemState<N>> {
    use core::mem::MaybeUninit;

    use crate::raw::TaskStatus_t;

    let mut raw = MaybeUninit::<[TaskStatus_t; N]>::uninit();
    let first = raw.as_mut_ptr() as *mut TaskStatus_t;
    let mut total_run_time = 0;
    // No task can be deleted while its name is copied out.
    let _lock = crate::critical::SchedulerLock::lock();
    let count = unsafe { crate::raw::uxTaskGetSystemState(first, to_kernel(N)?, &mut total_run_time) }
        as usize;
    if count == 0 || count > N {
        return Err(Error::InvalidArgument);
    }

    let mut tasks = [None; N];
    for (i, slot) in tasks.iter_mut().take(count).enumerate() {
        // The kernel filled in the first `count` entries.
        *slot = Some(unsafe { TaskStatus::from_raw(&*first.add(i), true) });
    }
    Ok(SystemState {
        tasks,
        total_run_time,
    })
}

/// The state of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// [`start_scheduler`] hasn't been called.
    NotStarted,
    /// Tasks are being scheduled.
    Running,
    /// A [`SchedulerLock`](crate::critical::SchedulerLock) is held.
    Suspended,
}

/// The state of the scheduler.
///
/// The kernel always has this with timers, as the daemon needs it.
#[cfg(any(INCLUDE_xTaskGetSchedulerState, configUSE_TIMERS))]
pub fn scheduler_state() -> SchedulerState {
    use crate::raw::{taskSCHEDULER_NOT_STARTED, taskSCHEDULER_SUSPENDED};

    match unsafe { xTaskGetSchedulerState() } {
        s if s == taskSCHEDULER_NOT_STARTED => SchedulerState::NotStarted,
        s if s == taskSCHEDULER_SUSPENDED => SchedulerState::Suspended,
        _ => SchedulerState::Running,
    }
}

/// Start the scheduler.  This returns only if the kernel could not create its own tasks, which
/// halts the system.
pub fn start_scheduler() -> ! {
    unsafe {
        crate::raw::vTaskStartScheduler();
        log::error!("scheduler failed to start");
        crate::raw::rust_freertos_halt()
    }
}

/// Wait for the notification value on `index` to be non-zero, then decrement it (or clear it, with
/// `clear_on_exit`).  Returns the value before the change.
#[cfg(configUSE_TASK_NOTIFICATIONS)]
pub fn notify_take<T>(index: usize, clear_on_exit: bool, timeout: T) -> Result<u32>
where
    T: Into<Timeout>,
{
    let index = notify_index(index)?;
    let timeout = timeout.into();
    let clear = if clear_on_exit { pdTRUE } else { pdFALSE };
    let value = unsafe { crate::raw::ulTaskGenericNotifyTake(index, clear, timeout.0) };
    if value == 0 {
        Err(if timeout.is_no_wait() {
            Error::Empty
        } else {
            Error::Timeout
        })
    } else {
        Ok(value)
    }
}

/// Wait for a notification on `index`.
///
/// Bits in `clear_on_entry` are cleared from the value before waiting, if no notification is
/// already pending.  Bits in `clear_on_exit` are cleared after one arrives.  Returns the value
/// before the exit clear.
#[cfg(configUSE_TASK_NOTIFICATIONS)]
pub fn notify_wait<T>(index: usize, clear_on_entry: u32, clear_on_exit: u32, timeout: T) -> Result<u32>
where
    T: Into<Timeout>,
{
    let index = notify_index(index)?;
    let timeout = timeout.into();
    let mut value = 0;
    let got = unsafe {
        crate::raw::xTaskGenericNotifyWait(
            index,
            clear_on_entry,
            clear_on_exit,
            &mut value,
            timeout.0,
        )
    };
    let err = if timeout.is_no_wait() {
        Error::Empty
    } else {
        Error::Timeout
    };
    to_result(got, err)?;
    Ok(value)
}

/// Clear a pending notification on the running task.
#[cfg(configUSE_TASK_NOTIFICATIONS)]
pub fn notify_state_clear(index: usize) -> Result<bool> {
    let index = notify_index(index)?;
    Ok(unsafe { crate::raw::xTaskGenericNotifyStateClear(null_mut(), index) != pdFALSE })
}

/// Clear bits in the running task's notification value, returning the value before.
#[cfg(configUSE_TASK_NOTIFICATIONS)]
pub fn notify_value_clear(index: usize, bits: u32) -> Result<u32> {
    let index = notify_index(index)?;
    Ok(unsafe { crate::raw::ulTaskGenericNotifyValueClear(null_mut(), index, bits) })
}
