// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Tasks, notifications and the scheduler.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::MaybeUninit;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use once_cell::sync::Lazy;

use super::heap::{kernel_box, release, Placement};
use super::{count, lock, now_ticks, wait_on, SendPtr, SLICE};
use crate::config::{
    configMAX_PRIORITIES, configMAX_TASK_NAME_LEN, configMINIMAL_STACK_SIZE,
    configTASK_NOTIFICATION_ARRAY_ENTRIES,
};
use crate::{
    configRUN_TIME_COUNTER_TYPE, configSTACK_DEPTH_TYPE, eBlocked, eDeleted, eIncrement, eInvalid,
    eNotifyAction, eReady, eRunning, eSetBits, eSetValueWithOverwrite, eSetValueWithoutOverwrite,
    eSuspended, eTaskState, errCOULD_NOT_ALLOCATE_REQUIRED_MEMORY, pdFAIL, pdFALSE, pdPASS,
    pdTRUE, BaseType_t, StackType_t, TaskFunction_t, TaskHandle_t, TaskHookFunction_t,
    TaskStatus_t, TickType_t, UBaseType_t, taskSCHEDULER_RUNNING, taskSCHEDULER_SUSPENDED,
    tskIDLE_PRIORITY, tskTaskControlBlock,
};

const NOTIFY_ENTRIES: usize = configTASK_NOTIFICATION_ARRAY_ENTRIES as usize;

/// Priority given to host threads adopted as tasks.
const ADOPTED_PRIORITY: UBaseType_t = tskIDLE_PRIORITY + 1;

#[derive(Clone, Copy, PartialEq, Eq)]
enum NotifyState {
    NotWaiting,
    Waiting,
    Received,
}

#[derive(Clone, Copy)]
struct Slot {
    value: u32,
    state: NotifyState,
}

/// The shared part of a task.  The task's own thread keeps a reference, so this outlives the
/// control block when the task is deleted.
pub(super) struct Tcb {
    id: usize,
    name: &'static CStr,
    stack_depth: configSTACK_DEPTH_TYPE,
    priority: AtomicUsize,
    suspended: AtomicBool,
    deleted: AtomicBool,
    abort: AtomicBool,
    blocked: AtomicBool,
    /// The thread is parked after deletion, or its task function returned.
    dead: AtomicBool,
    notify: Mutex<[Slot; NOTIFY_ENTRIES]>,
    cv: Condvar,
    tag: Mutex<TaskHookFunction_t>,
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
static TASK_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Every live task, by handle, for `uxTaskGetSystemState`.
static TASKS: Mutex<Vec<usize>> = Mutex::new(Vec::new());

fn register(handle: TaskHandle_t) {
    lock(&TASKS).push(handle as usize);
}

fn unregister(handle: TaskHandle_t) {
    lock(&TASKS).retain(|&h| h != handle as usize);
}

/// Names are kept for the whole run.  A name read from a status report stays readable after the
/// task is deleted, which a target only promises while the scheduler is suspended.
static NAMES: Mutex<Vec<&'static CStr>> = Mutex::new(Vec::new());

fn intern(name: CString) -> &'static CStr {
    let mut names = lock(&NAMES);
    if let Some(known) = names.iter().find(|known| **known == name.as_c_str()) {
        return known;
    }
    let name: &'static CStr = Box::leak(name.into_boxed_c_str());
    names.push(name);
    name
}

impl Tcb {
    fn new(name: &[u8], stack_depth: configSTACK_DEPTH_TYPE, priority: UBaseType_t) -> Arc<Tcb> {
        let max = (configMAX_TASK_NAME_LEN as usize).saturating_sub(1);
        let name: Vec<u8> = name.iter().copied().take_while(|&b| b != 0).take(max).collect();
        Arc::new(Tcb {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: intern(CString::new(name).unwrap_or_default()),
            stack_depth,
            priority: AtomicUsize::new(clamp_priority(priority) as usize),
            suspended: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            blocked: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            notify: Mutex::new(
                [Slot {
                    value: 0,
                    state: NotifyState::NotWaiting,
                }; NOTIFY_ENTRIES],
            ),
            cv: Condvar::new(),
            tag: Mutex::new(None),
        })
    }

    pub(super) fn id(&self) -> usize {
        self.id
    }

    pub(super) fn priority(&self) -> UBaseType_t {
        self.priority.load(Ordering::Acquire) as UBaseType_t
    }

    pub(super) fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    /// Is there a suspend, delete or abort request pending?
    pub(super) fn has_request(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
            || self.deleted.load(Ordering::Acquire)
            || self.abort.load(Ordering::Acquire)
    }

    fn wake(&self) {
        let _guard = lock(&self.notify);
        self.cv.notify_all();
    }
}

fn clamp_priority(priority: UBaseType_t) -> UBaseType_t {
    priority.min(configMAX_PRIORITIES as UBaseType_t - 1)
}

/// What a `TaskHandle_t` points at.
pub struct SimTask {
    tcb: Arc<Tcb>,
    placement: Placement,
    /// Adopted host threads own their control block through [`Current`].
    adopted: bool,
}

/// Storage for a statically allocated task.
#[repr(transparent)]
pub struct StaticTask_t {
    _slot: MaybeUninit<SimTask>,
}

struct Current {
    handle: TaskHandle_t,
    tcb: Arc<Tcb>,
    owned: Option<Box<SimTask>>,
}

impl Drop for Current {
    fn drop(&mut self) {
        if self.owned.is_some() {
            unregister(self.handle);
            TASK_COUNT.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Current>> = const { RefCell::new(None) };
}

fn adopt(name: &[u8], priority: UBaseType_t) -> Current {
    let tcb = Tcb::new(name, 0, priority);
    let owned = Box::new(SimTask {
        tcb: tcb.clone(),
        placement: Placement::Static,
        adopted: true,
    });
    TASK_COUNT.fetch_add(1, Ordering::AcqRel);
    let handle = &*owned as *const SimTask as TaskHandle_t;
    register(handle);
    Current {
        handle,
        tcb,
        owned: Some(owned),
    }
}

/// The handle and shared state of the calling task, adopting the host thread if needed.
pub(super) fn current() -> (TaskHandle_t, Arc<Tcb>) {
    CURRENT.with(|c| {
        let mut c = c.borrow_mut();
        let cur = c.get_or_insert_with(|| {
            let name = thread::current().name().unwrap_or("host").as_bytes().to_vec();
            adopt(&name, ADOPTED_PRIORITY)
        });
        (cur.handle, cur.tcb.clone())
    })
}

pub(super) fn current_tcb() -> Arc<Tcb> {
    current().1
}

pub(super) fn current_priority() -> UBaseType_t {
    current_tcb().priority()
}

/// Make the calling host thread a task with the given name and priority.
pub(super) fn adopt_as(name: &str, priority: UBaseType_t) -> TaskHandle_t {
    CURRENT.with(|c| {
        let cur = adopt(name.as_bytes(), priority);
        let handle = cur.handle;
        *c.borrow_mut() = Some(cur);
        handle
    })
}

unsafe fn sim_task<'a>(handle: TaskHandle_t) -> &'a SimTask {
    &*(handle as *const SimTask)
}

/// Resolve a handle argument, where NULL means the calling task.
unsafe fn target(handle: TaskHandle_t) -> (TaskHandle_t, Arc<Tcb>) {
    if handle.is_null() {
        current()
    } else {
        (handle, sim_task(handle).tcb.clone())
    }
}

/// Act on pending requests for the calling task.  Blocks while suspended, never returns if the
/// task has been deleted.  Returns whether a delay was aborted.
pub(super) fn checkpoint(me: &Tcb) -> bool {
    loop {
        if me.deleted.load(Ordering::Acquire) {
            park_dead(me);
        }
        if !me.suspended.load(Ordering::Acquire) {
            break;
        }
        let guard = lock(&me.notify);
        let _ = me.cv.wait_timeout(guard, SLICE);
    }
    me.abort.swap(false, Ordering::AcqRel)
}

/// A deleted task's thread stops here.  Destructors of anything on its stack are not run, just as
/// on a target.
fn park_dead(me: &Tcb) -> ! {
    me.dead.store(true, Ordering::Release);
    me.wake();
    loop {
        thread::park();
    }
}

static SCHEDULER: Lazy<(Mutex<usize>, Condvar)> = Lazy::new(Default::default);

fn wait_for_scheduler(me: &Tcb) {
    let (mutex, cv) = &*SCHEDULER;
    loop {
        {
            let suspended = lock(mutex);
            if *suspended == 0 {
                return;
            }
            let _ = cv.wait_timeout(suspended, SLICE);
        }
        if me.deleted.load(Ordering::Acquire) {
            park_dead(me);
        }
    }
}

unsafe fn task_main(
    handle: SendPtr<tskTaskControlBlock>,
    tcb: Arc<Tcb>,
    code: unsafe extern "C" fn(*mut c_void),
    param: SendPtr<c_void>,
) {
    CURRENT.with(|c| {
        *c.borrow_mut() = Some(Current {
            handle: handle.0,
            tcb: tcb.clone(),
            owned: None,
        })
    });
    wait_for_scheduler(&tcb);
    checkpoint(&tcb);

    code(param.0);

    if !tcb.deleted.load(Ordering::Acquire) {
        log::warn!("task {:?} returned from its task function", tcb.name);
    }
    tcb.dead.store(true, Ordering::Release);
    tcb.wake();
}

/// Start the host thread for a task whose control block is at `task`.
unsafe fn start(task: *mut SimTask, code: unsafe extern "C" fn(*mut c_void), param: *mut c_void) -> bool {
    let tcb = (*task).tcb.clone();
    let handle = SendPtr(task as TaskHandle_t);
    let param = SendPtr(param);
    let name = tcb.name.to_string_lossy().into_owned();
    let spawned = thread::Builder::new()
        .name(name)
        .spawn(move || unsafe { task_main(handle, tcb, code, param) });
    match spawned {
        Ok(_) => {
            register(handle.0);
            TASK_COUNT.fetch_add(1, Ordering::AcqRel);
            count(|s| s.creates += 1);
            true
        }
        Err(e) => {
            log::error!("unable to start task thread: {}", e);
            false
        }
    }
}

fn name_bytes<'a>(name: *const c_char) -> &'a [u8] {
    if name.is_null() {
        b""
    } else {
        unsafe { CStr::from_ptr(name) }.to_bytes()
    }
}

pub unsafe extern "C" fn xTaskCreate(
    pxTaskCode: TaskFunction_t,
    pcName: *const c_char,
    uxStackDepth: configSTACK_DEPTH_TYPE,
    pvParameters: *mut c_void,
    uxPriority: UBaseType_t,
    pxCreatedTask: *mut TaskHandle_t,
) -> BaseType_t {
    let Some(code) = pxTaskCode else {
        return errCOULD_NOT_ALLOCATE_REQUIRED_MEMORY;
    };
    let tcb = Tcb::new(name_bytes(pcName), uxStackDepth, uxPriority);
    let task = kernel_box(SimTask {
        tcb,
        placement: Placement::Heap,
        adopted: false,
    });
    if task.is_null() {
        return errCOULD_NOT_ALLOCATE_REQUIRED_MEMORY;
    }
    if !start(task, code, pvParameters) {
        release(task, Placement::Heap);
        return errCOULD_NOT_ALLOCATE_REQUIRED_MEMORY;
    }
    if !pxCreatedTask.is_null() {
        *pxCreatedTask = task as TaskHandle_t;
    }
    pdPASS
}

pub unsafe extern "C" fn xTaskCreateStatic(
    pxTaskCode: TaskFunction_t,
    pcName: *const c_char,
    uxStackDepth: configSTACK_DEPTH_TYPE,
    pvParameters: *mut c_void,
    uxPriority: UBaseType_t,
    puxStackBuffer: *mut StackType_t,
    pxTaskBuffer: *mut StaticTask_t,
) -> TaskHandle_t {
    let Some(code) = pxTaskCode else {
        return null_mut();
    };
    if puxStackBuffer.is_null() || pxTaskBuffer.is_null() {
        return null_mut();
    }
    // The host thread has its own stack; the buffer is only checked for presence.
    let task = pxTaskBuffer as *mut SimTask;
    task.write(SimTask {
        tcb: Tcb::new(name_bytes(pcName), uxStackDepth, uxPriority),
        placement: Placement::Static,
        adopted: false,
    });
    if !start(task, code, pvParameters) {
        release(task, Placement::Static);
        return null_mut();
    }
    task as TaskHandle_t
}

unsafe fn free_task(handle: TaskHandle_t) {
    let task = handle as *mut SimTask;
    if (*task).adopted {
        return;
    }
    unregister(handle);
    let placement = (*task).placement;
    release(task, placement);
    TASK_COUNT.fetch_sub(1, Ordering::AcqRel);
    count(|s| s.deletes += 1);
}

pub unsafe extern "C" fn vTaskDelete(xTaskToDelete: TaskHandle_t) {
    let (me, _) = current();
    let (handle, tcb) = target(xTaskToDelete);
    tcb.deleted.store(true, Ordering::Release);

    if handle == me {
        free_task(handle);
        park_dead(&tcb);
    }

    tcb.wake();
    loop {
        if tcb.dead.load(Ordering::Acquire) {
            break;
        }
        let guard = lock(&tcb.notify);
        let _ = tcb.cv.wait_timeout(guard, SLICE);
    }
    free_task(handle);
}

pub unsafe extern "C" fn vTaskSuspend(xTaskToSuspend: TaskHandle_t) {
    let (me, _) = current();
    let (handle, tcb) = target(xTaskToSuspend);
    tcb.suspended.store(true, Ordering::Release);
    if handle == me {
        checkpoint(&tcb);
    } else {
        tcb.wake();
    }
}

pub unsafe extern "C" fn vTaskResume(xTaskToResume: TaskHandle_t) {
    if xTaskToResume.is_null() {
        return;
    }
    let tcb = &sim_task(xTaskToResume).tcb;
    tcb.suspended.store(false, Ordering::Release);
    tcb.wake();
}

pub unsafe extern "C" fn xTaskResumeFromISR(xTaskToResume: TaskHandle_t) -> BaseType_t {
    if xTaskToResume.is_null() {
        return pdFALSE;
    }
    let tcb = &sim_task(xTaskToResume).tcb;
    let was = tcb.suspended.swap(false, Ordering::AcqRel);
    tcb.wake();
    if was && tcb.priority() > current_priority() {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn uxTaskPriorityGet(xTask: TaskHandle_t) -> UBaseType_t {
    target(xTask).1.priority()
}

pub unsafe extern "C" fn uxTaskPriorityGetFromISR(xTask: TaskHandle_t) -> UBaseType_t {
    target(xTask).1.priority()
}

pub unsafe extern "C" fn vTaskPrioritySet(xTask: TaskHandle_t, uxNewPriority: UBaseType_t) {
    target(xTask)
        .1
        .priority
        .store(clamp_priority(uxNewPriority) as usize, Ordering::Release);
}

pub unsafe extern "C" fn eTaskGetState(xTask: TaskHandle_t) -> eTaskState {
    let (me, _) = current();
    let (handle, tcb) = target(xTask);
    state_of(handle, &tcb, me)
}

fn state_of(handle: TaskHandle_t, tcb: &Tcb, me: TaskHandle_t) -> eTaskState {
    if tcb.deleted.load(Ordering::Acquire) || tcb.dead.load(Ordering::Acquire) {
        eDeleted
    } else if handle == me {
        eRunning
    } else if tcb.suspended.load(Ordering::Acquire) {
        eSuspended
    } else if tcb.blocked.load(Ordering::Acquire) {
        eBlocked
    } else {
        eReady
    }
}

pub unsafe extern "C" fn pcTaskGetName(xTaskToQuery: TaskHandle_t) -> *mut c_char {
    let (handle, _) = target(xTaskToQuery);
    // The name lives as long as the control block.
    sim_task(handle).tcb.name.as_ptr() as *mut c_char
}

/// The simulator can't measure stack use, and reports the whole stack as unused.
pub unsafe extern "C" fn uxTaskGetStackHighWaterMark(xTask: TaskHandle_t) -> UBaseType_t {
    target(xTask).1.stack_depth as UBaseType_t
}

pub unsafe extern "C" fn uxTaskGetStackHighWaterMark2(xTask: TaskHandle_t) -> configSTACK_DEPTH_TYPE {
    target(xTask).1.stack_depth
}

/// Fill `status` for the task at `handle`, as seen from the task `me`.
unsafe fn fill_status(
    handle: TaskHandle_t,
    me: TaskHandle_t,
    status: *mut TaskStatus_t,
    free_stack: bool,
    state: eTaskState,
) {
    let tcb = &sim_task(handle).tcb;
    let priority = tcb.priority();
    status.write(TaskStatus_t {
        xHandle: handle,
        pcTaskName: tcb.name.as_ptr(),
        xTaskNumber: tcb.id as UBaseType_t,
        eCurrentState: if state == eInvalid {
            state_of(handle, tcb, me)
        } else {
            state
        },
        uxCurrentPriority: priority,
        // Without priority inheritance the two are the same.
        uxBasePriority: priority,
        // Run time stats are not kept.
        ulRunTimeCounter: 0,
        pxStackBase: null_mut(),
        usStackHighWaterMark: if free_stack { tcb.stack_depth } else { 0 },
    });
}

pub unsafe extern "C" fn vTaskGetInfo(
    xTask: TaskHandle_t,
    pxTaskStatus: *mut TaskStatus_t,
    xGetFreeStackSpace: BaseType_t,
    eState: eTaskState,
) {
    let (me, _) = current();
    let (handle, _) = target(xTask);
    fill_status(handle, me, pxTaskStatus, xGetFreeStackSpace != pdFALSE, eState);
}

pub unsafe extern "C" fn uxTaskGetSystemState(
    pxTaskStatusArray: *mut TaskStatus_t,
    uxArraySize: UBaseType_t,
    pulTotalRunTime: *mut configRUN_TIME_COUNTER_TYPE,
) -> UBaseType_t {
    // Adopting the caller registers it, so that comes before taking the list.
    let (me, _) = current();
    idle_task();
    if !pulTotalRunTime.is_null() {
        *pulTotalRunTime = 0;
    }
    let tasks = lock(&TASKS);
    if tasks.len() > uxArraySize as usize {
        return 0;
    }
    for (i, &handle) in tasks.iter().enumerate() {
        fill_status(handle as TaskHandle_t, me, pxTaskStatusArray.add(i), true, eInvalid);
    }
    tasks.len() as UBaseType_t
}

/// The simulator's idle task has no thread.  It only exists to be found.
static IDLE: Lazy<usize> = Lazy::new(|| {
    let task = Box::leak(Box::new(SimTask {
        tcb: Tcb::new(b"IDLE", configMINIMAL_STACK_SIZE as configSTACK_DEPTH_TYPE, tskIDLE_PRIORITY),
        placement: Placement::Static,
        adopted: true,
    }));
    let handle = task as *mut SimTask as TaskHandle_t;
    register(handle);
    TASK_COUNT.fetch_add(1, Ordering::AcqRel);
    handle as usize
});

fn idle_task() -> TaskHandle_t {
    *IDLE as TaskHandle_t
}

pub unsafe extern "C" fn xTaskGetIdleTaskHandle() -> TaskHandle_t {
    idle_task()
}

pub unsafe extern "C" fn vTaskSetApplicationTaskTag(
    xTask: TaskHandle_t,
    pxHookFunction: TaskHookFunction_t,
) {
    *lock(&target(xTask).1.tag) = pxHookFunction;
}

pub unsafe extern "C" fn xTaskGetApplicationTaskTag(xTask: TaskHandle_t) -> TaskHookFunction_t {
    *lock(&target(xTask).1.tag)
}

pub unsafe extern "C" fn xTaskGetApplicationTaskTagFromISR(
    xTask: TaskHandle_t,
) -> TaskHookFunction_t {
    xTaskGetApplicationTaskTag(xTask)
}

pub unsafe extern "C" fn xTaskAbortDelay(xTask: TaskHandle_t) -> BaseType_t {
    if xTask.is_null() {
        return pdFAIL;
    }
    let tcb = &sim_task(xTask).tcb;
    if tcb.blocked.load(Ordering::Acquire) {
        tcb.abort.store(true, Ordering::Release);
        tcb.wake();
        pdPASS
    } else {
        pdFAIL
    }
}

pub unsafe extern "C" fn xTaskGetCurrentTaskHandle() -> TaskHandle_t {
    current().0
}

pub unsafe extern "C" fn xTaskGetTickCount() -> TickType_t {
    now_ticks()
}

pub unsafe extern "C" fn xTaskGetTickCountFromISR() -> TickType_t {
    now_ticks()
}

pub unsafe extern "C" fn uxTaskGetNumberOfTasks() -> UBaseType_t {
    TASK_COUNT.load(Ordering::Acquire) as UBaseType_t
}

pub unsafe extern "C" fn vTaskDelay(xTicksToDelay: TickType_t) {
    if xTicksToDelay == 0 {
        thread::yield_now();
        return;
    }
    let me = current_tcb();
    let _ = wait_on(&me.notify, &me.cv, xTicksToDelay, None, |_| false);
}

pub unsafe extern "C" fn xTaskDelayUntil(
    pxPreviousWakeTime: *mut TickType_t,
    xTimeIncrement: TickType_t,
) -> BaseType_t {
    let now = now_ticks();
    let previous = *pxPreviousWakeTime;
    let wake = previous.wrapping_add(xTimeIncrement);

    // The same overflow reasoning as the kernel.
    let should_delay = if now < previous {
        wake < previous && wake > now
    } else {
        wake < previous || wake > now
    };
    *pxPreviousWakeTime = wake;

    if should_delay {
        vTaskDelay(wake.wrapping_sub(now));
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn vTaskSuspendAll() {
    *lock(&SCHEDULER.0) += 1;
}

pub unsafe extern "C" fn xTaskResumeAll() -> BaseType_t {
    let (mutex, cv) = &*SCHEDULER;
    let mut suspended = lock(mutex);
    *suspended = suspended.saturating_sub(1);
    if *suspended == 0 {
        cv.notify_all();
    }
    pdFALSE
}

pub unsafe extern "C" fn xTaskGetSchedulerState() -> BaseType_t {
    if *lock(&SCHEDULER.0) > 0 {
        taskSCHEDULER_SUSPENDED
    } else {
        taskSCHEDULER_RUNNING
    }
}

/// Tasks already run as soon as they are created, so this just parks the caller.
pub unsafe extern "C" fn vTaskStartScheduler() {
    super::timer::ensure_daemon();
    loop {
        thread::park();
    }
}

/// Apply a notification, returning the result and whether the task was waiting for it.
unsafe fn notify(
    handle: TaskHandle_t,
    index: UBaseType_t,
    value: u32,
    action: eNotifyAction,
    previous: *mut u32,
) -> (BaseType_t, Option<Arc<Tcb>>) {
    if handle.is_null() || index as usize >= NOTIFY_ENTRIES {
        return (pdFAIL, None);
    }
    let tcb = sim_task(handle).tcb.clone();
    let mut slots = lock(&tcb.notify);
    let slot = &mut slots[index as usize];
    if !previous.is_null() {
        *previous = slot.value;
    }
    let original = slot.state;
    slot.state = NotifyState::Received;

    let mut result = pdPASS;
    match action {
        eSetBits => slot.value |= value,
        eIncrement => slot.value = slot.value.wrapping_add(1),
        eSetValueWithOverwrite => slot.value = value,
        eSetValueWithoutOverwrite => {
            if original != NotifyState::Received {
                slot.value = value;
            } else {
                result = pdFAIL;
            }
        }
        _ => (),
    }
    tcb.cv.notify_all();
    drop(slots);

    let waiting = (original == NotifyState::Waiting).then_some(tcb);
    (result, waiting)
}

unsafe fn report_woken(waiting: Option<Arc<Tcb>>, woken: *mut BaseType_t) {
    if let Some(tcb) = waiting {
        if !woken.is_null() && tcb.priority() > current_priority() {
            *woken = pdTRUE;
        }
    }
}

pub unsafe extern "C" fn xTaskGenericNotify(
    xTaskToNotify: TaskHandle_t,
    uxIndexToNotify: UBaseType_t,
    ulValue: u32,
    eAction: eNotifyAction,
    pulPreviousNotificationValue: *mut u32,
) -> BaseType_t {
    notify(xTaskToNotify, uxIndexToNotify, ulValue, eAction, pulPreviousNotificationValue).0
}

pub unsafe extern "C" fn xTaskGenericNotifyFromISR(
    xTaskToNotify: TaskHandle_t,
    uxIndexToNotify: UBaseType_t,
    ulValue: u32,
    eAction: eNotifyAction,
    pulPreviousNotificationValue: *mut u32,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> BaseType_t {
    let (result, waiting) = notify(
        xTaskToNotify,
        uxIndexToNotify,
        ulValue,
        eAction,
        pulPreviousNotificationValue,
    );
    report_woken(waiting, pxHigherPriorityTaskWoken);
    result
}

pub unsafe extern "C" fn vTaskGenericNotifyGiveFromISR(
    xTaskToNotify: TaskHandle_t,
    uxIndexToNotify: UBaseType_t,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) {
    let (_, waiting) = notify(xTaskToNotify, uxIndexToNotify, 0, eIncrement, null_mut());
    report_woken(waiting, pxHigherPriorityTaskWoken);
}

pub unsafe extern "C" fn ulTaskGenericNotifyTake(
    uxIndexToWaitOn: UBaseType_t,
    xClearCountOnExit: BaseType_t,
    xTicksToWait: TickType_t,
) -> u32 {
    let index = uxIndexToWaitOn as usize;
    if index >= NOTIFY_ENTRIES {
        return 0;
    }
    let me = current_tcb();
    {
        let mut slots = lock(&me.notify);
        if slots[index].value == 0 {
            slots[index].state = NotifyState::Waiting;
        }
    }
    let (mut slots, _) = wait_on(&me.notify, &me.cv, xTicksToWait, None, |s| s[index].value != 0);
    let slot = &mut slots[index];
    let value = slot.value;
    if value != 0 {
        slot.value = if xClearCountOnExit != pdFALSE { 0 } else { value - 1 };
    }
    slot.state = NotifyState::NotWaiting;
    value
}

pub unsafe extern "C" fn xTaskGenericNotifyWait(
    uxIndexToWaitOn: UBaseType_t,
    ulBitsToClearOnEntry: u32,
    ulBitsToClearOnExit: u32,
    pulNotificationValue: *mut u32,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    let index = uxIndexToWaitOn as usize;
    if index >= NOTIFY_ENTRIES {
        return pdFALSE;
    }
    let me = current_tcb();
    {
        let mut slots = lock(&me.notify);
        let slot = &mut slots[index];
        if slot.state != NotifyState::Received {
            slot.value &= !ulBitsToClearOnEntry;
            slot.state = NotifyState::Waiting;
        }
    }
    let (mut slots, _) = wait_on(&me.notify, &me.cv, xTicksToWait, None, |s| {
        s[index].state == NotifyState::Received
    });
    let slot = &mut slots[index];
    if !pulNotificationValue.is_null() {
        *pulNotificationValue = slot.value;
    }
    let result = if slot.state == NotifyState::Received {
        slot.value &= !ulBitsToClearOnExit;
        pdTRUE
    } else {
        pdFALSE
    };
    slot.state = NotifyState::NotWaiting;
    result
}

pub unsafe extern "C" fn xTaskGenericNotifyStateClear(
    xTask: TaskHandle_t,
    uxIndexToClear: UBaseType_t,
) -> BaseType_t {
    let index = uxIndexToClear as usize;
    if index >= NOTIFY_ENTRIES {
        return pdFAIL;
    }
    let (_, tcb) = target(xTask);
    let mut slots = lock(&tcb.notify);
    if slots[index].state == NotifyState::Received {
        slots[index].state = NotifyState::NotWaiting;
        pdPASS
    } else {
        pdFAIL
    }
}

pub unsafe extern "C" fn ulTaskGenericNotifyValueClear(
    xTask: TaskHandle_t,
    uxIndexToClear: UBaseType_t,
    ulBitsToClear: u32,
) -> u32 {
    let index = uxIndexToClear as usize;
    if index >= NOTIFY_ENTRIES {
        return 0;
    }
    let (_, tcb) = target(xTask);
    let mut slots = lock(&tcb.notify);
    let old = slots[index].value;
    slots[index].value &= !ulBitsToClear;
    old
}
