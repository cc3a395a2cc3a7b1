//! Test doubles: a deterministic event loop driven by hand and a transfer
//! engine driven by per-test hooks.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wireline::{
    Completion, EngineHost, EngineRejected, EventLoop, Interest, ReadyCallback, SocketId,
    SocketWatch, Task, TimeoutChange, Timer, TimerCallback, TransferEngine, TransferId,
    TransferResult, TransferSpec,
};

// ── Manual event loop ───────────────────────────────────────────────────

/// A reactor where nothing fires until the test says so. Sockets are
/// numbered handles; watches, the timer deadline, and posted tasks are all
/// inspectable.
#[derive(Clone, Default)]
pub struct ManualLoop {
    state: Arc<Mutex<LoopState>>,
}

#[derive(Default)]
struct LoopState {
    next_socket: u64,
    open: Vec<u64>,
    closed: Vec<u64>,
    watches: HashMap<u64, WatchEntry>,
    /// Ready callbacks retained past watch teardown, to model a readiness
    /// notification already queued when the engine closed the socket.
    stale_ready: HashMap<u64, ReadyCallback>,
    timer: Option<TimerState>,
    posted: Vec<Task>,
}

struct WatchEntry {
    interest: Interest,
    on_ready: ReadyCallback,
}

struct TimerState {
    on_fire: TimerCallback,
    deadline: Option<Duration>,
}

impl ManualLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the context timer if armed. Returns whether it fired.
    pub fn fire_timer(&self) -> bool {
        let on_fire = {
            let mut state = self.state.lock().unwrap();
            match state.timer.as_mut() {
                Some(timer) if timer.deadline.is_some() => {
                    timer.deadline = None;
                    Some(timer.on_fire.clone())
                }
                _ => None,
            }
        };
        match on_fire {
            Some(on_fire) => {
                on_fire();
                true
            }
            None => false,
        }
    }

    /// Deliver readiness for a currently watched socket.
    pub fn fire_ready(&self, socket: SocketId, readiness: Interest) -> bool {
        let on_ready = {
            let state = self.state.lock().unwrap();
            state
                .watches
                .get(&socket.raw())
                .map(|entry| entry.on_ready.clone())
        };
        match on_ready {
            Some(on_ready) => {
                on_ready(readiness);
                true
            }
            None => false,
        }
    }

    /// Deliver a readiness notification that was queued before the watch
    /// was torn down.
    pub fn fire_stale_ready(&self, socket: SocketId, readiness: Interest) -> bool {
        let on_ready = {
            let state = self.state.lock().unwrap();
            state.stale_ready.get(&socket.raw()).cloned()
        };
        match on_ready {
            Some(on_ready) => {
                on_ready(readiness);
                true
            }
            None => false,
        }
    }

    /// Run every task handed to `post`. Returns how many ran.
    pub fn run_posted(&self) -> usize {
        let tasks: Vec<Task> = {
            let mut state = self.state.lock().unwrap();
            state.posted.drain(..).collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn timer_deadline(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap()
            .timer
            .as_ref()
            .and_then(|timer| timer.deadline)
    }

    pub fn watch_interest(&self, socket: SocketId) -> Option<Interest> {
        self.state
            .lock()
            .unwrap()
            .watches
            .get(&socket.raw())
            .map(|entry| entry.interest)
    }

    pub fn last_opened(&self) -> Option<SocketId> {
        self.state
            .lock()
            .unwrap()
            .open
            .last()
            .copied()
            .map(SocketId::from_raw)
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn closed_count(&self) -> usize {
        self.state.lock().unwrap().closed.len()
    }

    pub fn is_open(&self, socket: SocketId) -> bool {
        self.state.lock().unwrap().open.contains(&socket.raw())
    }
}

impl EventLoop for ManualLoop {
    fn open_socket(&self) -> io::Result<SocketId> {
        let mut state = self.state.lock().unwrap();
        state.next_socket += 1;
        let raw = state.next_socket;
        state.open.push(raw);
        Ok(SocketId::from_raw(raw))
    }

    fn close_socket(&self, socket: SocketId) {
        let mut state = self.state.lock().unwrap();
        let raw = socket.raw();
        assert!(
            !state.watches.contains_key(&raw),
            "closed socket {raw} while still watched"
        );
        let position = state
            .open
            .iter()
            .position(|open| *open == raw)
            .unwrap_or_else(|| panic!("closed unknown socket {raw}"));
        state.open.remove(position);
        state.closed.push(raw);
    }

    fn watch(
        &self,
        socket: SocketId,
        on_ready: ReadyCallback,
    ) -> io::Result<Box<dyn SocketWatch>> {
        let mut state = self.state.lock().unwrap();
        let raw = socket.raw();
        assert!(state.open.contains(&raw), "watch on unopened socket {raw}");
        state.stale_ready.insert(raw, on_ready.clone());
        state.watches.insert(
            raw,
            WatchEntry {
                interest: Interest::NONE,
                on_ready,
            },
        );
        Ok(Box::new(ManualWatch {
            state: self.state.clone(),
            raw,
        }))
    }

    fn timer(&self, on_fire: TimerCallback) -> Box<dyn Timer> {
        let mut state = self.state.lock().unwrap();
        state.timer = Some(TimerState {
            on_fire,
            deadline: None,
        });
        Box::new(ManualTimer {
            state: self.state.clone(),
        })
    }

    fn post(&self, task: Task) {
        self.state.lock().unwrap().posted.push(task);
    }
}

struct ManualWatch {
    state: Arc<Mutex<LoopState>>,
    raw: u64,
}

impl SocketWatch for ManualWatch {
    fn request(&mut self, interest: Interest) {
        if let Some(entry) = self.state.lock().unwrap().watches.get_mut(&self.raw) {
            entry.interest = interest;
        }
    }
}

impl Drop for ManualWatch {
    fn drop(&mut self) {
        self.state.lock().unwrap().watches.remove(&self.raw);
    }
}

struct ManualTimer {
    state: Arc<Mutex<LoopState>>,
}

impl Timer for ManualTimer {
    fn arm(&mut self, after: Duration) {
        if let Some(timer) = self.state.lock().unwrap().timer.as_mut() {
            timer.deadline = Some(after);
        }
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.state.lock().unwrap().timer.as_mut() {
            timer.deadline = None;
        }
    }
}

// ── Scripted engine ─────────────────────────────────────────────────────

pub type AddHook = Box<
    dyn FnMut(&mut EngineCore, TransferId, &TransferSpec, &mut dyn EngineHost) -> Result<(), EngineRejected>
        + Send,
>;
pub type SocketHook = Box<dyn FnMut(&mut EngineCore, SocketId, Interest, &mut dyn EngineHost) + Send>;
pub type TimeoutHook = Box<dyn FnMut(&mut EngineCore, &mut dyn EngineHost) + Send>;

/// Bookkeeping shared between the engine and the test's [`EngineProbe`].
#[derive(Default)]
pub struct EngineCore {
    pub active: Vec<TransferId>,
    pub specs: HashMap<TransferId, TransferSpec>,
    pub added: Vec<TransferId>,
    pub removed: Vec<TransferId>,
    pub done: VecDeque<Completion>,
    pub sockets_driven: Vec<(SocketId, Interest)>,
    pub timeouts_driven: usize,
}

impl EngineCore {
    /// Mark a transfer finished: it stops running and a completion is
    /// queued for the next drain.
    pub fn finish(&mut self, id: TransferId, result: TransferResult) {
        self.active.retain(|active| *active != id);
        self.done.push_back(Completion { id, result });
    }
}

#[derive(Default)]
struct Hooks {
    on_add: Option<AddHook>,
    on_socket: Option<SocketHook>,
    on_timeout: Option<TimeoutHook>,
}

/// A transfer engine whose behavior each test scripts through hooks.
///
/// Without hooks: `add` accepts the transfer and asks for an immediate
/// timeout (the kick a real multiplexer uses to start I/O), drives are
/// recorded, and nothing ever completes until a hook calls
/// [`EngineCore::finish`].
pub struct ScriptedEngine {
    core: Arc<Mutex<EngineCore>>,
    hooks: Arc<Mutex<Hooks>>,
}

impl ScriptedEngine {
    pub fn new() -> (ScriptedEngine, EngineProbe) {
        let core = Arc::new(Mutex::new(EngineCore::default()));
        let hooks = Arc::new(Mutex::new(Hooks::default()));
        let engine = ScriptedEngine {
            core: core.clone(),
            hooks: hooks.clone(),
        };
        (engine, EngineProbe { core, hooks })
    }
}

impl TransferEngine for ScriptedEngine {
    fn add(
        &mut self,
        id: TransferId,
        spec: TransferSpec,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineRejected> {
        let mut hook = self.hooks.lock().unwrap().on_add.take();
        let result = {
            let mut core = self.core.lock().unwrap();
            core.added.push(id);
            let result = match hook.as_mut() {
                Some(on_add) => on_add(&mut core, id, &spec, host),
                None => {
                    host.reschedule_timeout(TimeoutChange::After(Duration::ZERO));
                    Ok(())
                }
            };
            if result.is_ok() {
                core.active.push(id);
                core.specs.insert(id, spec);
            }
            result
        };
        if let Some(on_add) = hook {
            self.hooks.lock().unwrap().on_add = Some(on_add);
        }
        result
    }

    fn remove(&mut self, id: TransferId, _host: &mut dyn EngineHost) {
        let mut core = self.core.lock().unwrap();
        core.removed.push(id);
        core.active.retain(|active| *active != id);
    }

    fn drive_socket(
        &mut self,
        socket: SocketId,
        readiness: Interest,
        host: &mut dyn EngineHost,
    ) -> usize {
        let mut hook = self.hooks.lock().unwrap().on_socket.take();
        let running = {
            let mut core = self.core.lock().unwrap();
            core.sockets_driven.push((socket, readiness));
            if let Some(on_socket) = hook.as_mut() {
                on_socket(&mut core, socket, readiness, host);
            }
            core.active.len()
        };
        if let Some(on_socket) = hook {
            self.hooks.lock().unwrap().on_socket = Some(on_socket);
        }
        running
    }

    fn drive_timeout(&mut self, host: &mut dyn EngineHost) -> usize {
        let mut hook = self.hooks.lock().unwrap().on_timeout.take();
        let running = {
            let mut core = self.core.lock().unwrap();
            core.timeouts_driven += 1;
            if let Some(on_timeout) = hook.as_mut() {
                on_timeout(&mut core, host);
            }
            core.active.len()
        };
        if let Some(on_timeout) = hook {
            self.hooks.lock().unwrap().on_timeout = Some(on_timeout);
        }
        running
    }

    fn pop_completion(&mut self) -> Option<Completion> {
        self.core.lock().unwrap().done.pop_front()
    }
}

/// The test's handle on a [`ScriptedEngine`] boxed away inside a context.
pub struct EngineProbe {
    core: Arc<Mutex<EngineCore>>,
    hooks: Arc<Mutex<Hooks>>,
}

impl EngineProbe {
    pub fn set_add_hook(&self, hook: AddHook) {
        self.hooks.lock().unwrap().on_add = Some(hook);
    }

    pub fn set_socket_hook(&self, hook: SocketHook) {
        self.hooks.lock().unwrap().on_socket = Some(hook);
    }

    pub fn set_timeout_hook(&self, hook: TimeoutHook) {
        self.hooks.lock().unwrap().on_timeout = Some(hook);
    }

    pub fn added(&self) -> Vec<TransferId> {
        self.core.lock().unwrap().added.clone()
    }

    pub fn removed(&self) -> Vec<TransferId> {
        self.core.lock().unwrap().removed.clone()
    }

    pub fn active_count(&self) -> usize {
        self.core.lock().unwrap().active.len()
    }

    pub fn spec(&self, id: TransferId) -> Option<TransferSpec> {
        self.core.lock().unwrap().specs.get(&id).cloned()
    }

    pub fn timeouts_driven(&self) -> usize {
        self.core.lock().unwrap().timeouts_driven
    }

    pub fn sockets_driven(&self) -> Vec<(SocketId, Interest)> {
        self.core.lock().unwrap().sockets_driven.clone()
    }
}
