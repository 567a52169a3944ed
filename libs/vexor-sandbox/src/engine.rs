/// Isolated Execution Engine - One QuickJS Isolate Per Request
///
/// **Core Responsibility:**
/// Compile a bundle and run it inside a fresh embedded JavaScript runtime,
/// returning the raw serialized result for the evaluator to check.
///
/// **Isolation Rules:**
/// 1. A new runtime + context is created for every request, never reused
/// 2. Only ECMAScript intrinsics exist: no module loader, filesystem,
///    network, environment or process APIs
/// 3. Memory is capped by the runtime allocator
/// 4. Wall-clock time is capped by an interrupt handler the interpreter
///    polls, so runaway loops are terminated rather than asked to stop
/// 5. The isolate is released on every exit path (dispose, `?`, panic)
///
/// **Non-Responsibilities:**
/// - Does not interpret results (evaluator's job)
/// - Does not schedule or bound concurrency (executor's job)

use rquickjs::function::Constructor;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Persistent, Runtime, Value};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::bundler::Bundle;
use crate::error::{SandboxError, SourceOrigin};

/// Interpreter stack ceiling; deep recursion becomes a catchable RangeError
const DEFAULT_MAX_STACK_BYTES: usize = 512 * 1024;

/// Resource limits applied to a single isolate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub memory_limit_mb: u32,
    pub max_stack_bytes: usize,
}

impl EngineLimits {
    pub fn new(memory_limit_mb: u32) -> Self {
        Self {
            memory_limit_mb,
            max_stack_bytes: DEFAULT_MAX_STACK_BYTES,
        }
    }

    pub fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb as usize * 1024 * 1024
    }
}

/// Lifecycle of an isolate
///
/// `Created → Compiling → Running → {Completed | TimedOut | RuntimeError |
/// CompilationError} → Disposed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Compiling,
    Running,
    Completed,
    TimedOut,
    RuntimeError,
    CompilationError,
    Disposed,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Completed
                | EngineState::TimedOut
                | EngineState::RuntimeError
                | EngineState::CompilationError
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Created => "created",
            EngineState::Compiling => "compiling",
            EngineState::Running => "running",
            EngineState::Completed => "completed",
            EngineState::TimedOut => "timed_out",
            EngineState::RuntimeError => "runtime_error",
            EngineState::CompilationError => "compilation_error",
            EngineState::Disposed => "disposed",
        };
        write!(f, "{}", name)
    }
}

/// Deadline shared between the host and the interpreter's interrupt handler
///
/// A deadline of zero means disarmed. Once the deadline passes, every poll
/// keeps returning true, so a script that catches the interrupt is
/// interrupted again at the next poll.
#[derive(Debug)]
pub struct Watchdog {
    epoch: Instant,
    deadline_nanos: AtomicU64,
    fired: AtomicBool,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline_nanos: AtomicU64::new(0),
            fired: AtomicBool::new(false),
        }
    }

    pub fn arm(&self, timeout: Duration) {
        let deadline = self.elapsed_nanos().saturating_add(timeout.as_nanos() as u64).max(1);
        self.fired.store(false, Ordering::SeqCst);
        self.deadline_nanos.store(deadline, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.deadline_nanos.store(0, Ordering::SeqCst);
    }

    /// Whether the armed deadline was reached at least once
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Polled by the interpreter; `true` aborts the running script
    pub fn should_interrupt(&self) -> bool {
        let deadline = self.deadline_nanos.load(Ordering::SeqCst);
        if deadline == 0 || self.elapsed_nanos() < deadline {
            return false;
        }
        self.fired.store(true, Ordering::SeqCst);
        true
    }

    fn elapsed_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts isolates created and still alive, per executor
#[derive(Debug, Default)]
pub struct IsolateTracker {
    live: AtomicUsize,
    created: AtomicUsize,
}

impl IsolateTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Isolates not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Isolates ever created through this tracker
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn acquire(self: &Arc<Self>) -> IsolateLease {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        IsolateLease {
            tracker: Arc::clone(self),
        }
    }
}

/// Keeps an isolate counted as live until dropped
#[derive(Debug)]
struct IsolateLease {
    tracker: Arc<IsolateTracker>,
}

impl Drop for IsolateLease {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A compiled bundle, not yet executed
///
/// Borrows the engine that compiled it, so it cannot outlive the isolate
/// its function lives in.
pub struct CompiledUnit<'e> {
    function: Persistent<Function<'static>>,
    _engine: PhantomData<&'e IsolatedEngine>,
}

enum RunFailure {
    Thrown(String),
    OutOfMemory,
    Malformed(String),
    Host(String),
}

/// A single-use JavaScript isolate
///
/// Field order matters: the context must be released before the runtime.
pub struct IsolatedEngine {
    context: Context,
    runtime: Runtime,
    watchdog: Arc<Watchdog>,
    limits: EngineLimits,
    state: Cell<EngineState>,
    _lease: IsolateLease,
}

impl IsolatedEngine {
    /// Create a fresh runtime and context with limits and watchdog installed
    pub fn new(limits: EngineLimits, tracker: Arc<IsolateTracker>) -> Result<Self, SandboxError> {
        let runtime = Runtime::new().map_err(|e| {
            SandboxError::Infrastructure(format!("failed to create JavaScript runtime: {}", e))
        })?;
        runtime.set_memory_limit(limits.memory_limit_bytes());
        runtime.set_max_stack_size(limits.max_stack_bytes);

        let watchdog = Arc::new(Watchdog::new());
        let interrupt = Arc::clone(&watchdog);
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.should_interrupt())));

        let context = Context::full(&runtime).map_err(|e| {
            SandboxError::Infrastructure(format!("failed to create JavaScript context: {}", e))
        })?;

        let lease = tracker.acquire();
        debug!(
            memory_limit_mb = limits.memory_limit_mb,
            live_isolates = tracker.live(),
            "Isolate created"
        );

        Ok(Self {
            context,
            runtime,
            watchdog,
            limits,
            state: Cell::new(EngineState::Created),
            _lease: lease,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Parse the bundle as a function body without executing it
    ///
    /// The user unit and the test unit are parsed alone first. Each must be a
    /// complete expression by itself, so neither can close the scopes the
    /// bundle wraps it in.
    pub fn compile(&self, bundle: &Bundle) -> Result<CompiledUnit<'_>, SandboxError> {
        self.expect_state(EngineState::Created, "compile")?;
        self.state.set(EngineState::Compiling);

        type Attributed = (SourceOrigin, String);
        let compiled = self.context.with(|ctx| -> Result<Persistent<Function<'static>>, Attributed> {
            compile_body(&ctx, bundle.user_unit()).map_err(|e| (SourceOrigin::UserCode, e))?;
            compile_body(&ctx, bundle.test_unit()).map_err(|e| (SourceOrigin::GeneratedTests, e))?;
            compile_body(&ctx, bundle.source())
                .map(|function| Persistent::save(&ctx, function))
                .map_err(|e| (SourceOrigin::Bundle, e))
        });

        match compiled {
            Ok(function) => Ok(CompiledUnit {
                function,
                _engine: PhantomData,
            }),
            Err((origin, message)) => {
                self.state.set(EngineState::CompilationError);
                debug!(%origin, error = %message, "Bundle failed to compile");
                Err(SandboxError::Compilation { origin, message })
            }
        }
    }

    /// Invoke a compiled unit with the watchdog armed
    ///
    /// Returns the bundle's completion value, which must be a string.
    pub fn run(&self, unit: CompiledUnit<'_>, timeout: Duration) -> Result<String, SandboxError> {
        self.expect_state(EngineState::Compiling, "run")?;
        self.state.set(EngineState::Running);
        self.watchdog.arm(timeout);

        let outcome = self.context.with(|ctx| -> Result<String, RunFailure> {
            let function = unit
                .function
                .restore(&ctx)
                .map_err(|e| RunFailure::Host(e.to_string()))?;
            let value: Value = function.call(()).catch(&ctx).map_err(classify)?;
            completion_string(value)
        });

        self.watchdog.disarm();

        match outcome {
            Ok(raw) => {
                self.state.set(EngineState::Completed);
                Ok(raw)
            }
            Err(_) if self.watchdog.fired() => {
                self.state.set(EngineState::TimedOut);
                Err(SandboxError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Err(failure) => {
                self.state.set(EngineState::RuntimeError);
                Err(match failure {
                    RunFailure::OutOfMemory => SandboxError::OutOfMemory {
                        limit_mb: self.limits.memory_limit_mb,
                    },
                    RunFailure::Thrown(message) => SandboxError::Runtime(message),
                    RunFailure::Malformed(message) => SandboxError::MalformedResult(message),
                    RunFailure::Host(message) => SandboxError::Infrastructure(message),
                })
            }
        }
    }

    /// Release the isolate; consuming the engine makes this a one-shot
    pub fn dispose(self) {
        drop(self);
    }

    fn expect_state(&self, expected: EngineState, operation: &str) -> Result<(), SandboxError> {
        let current = self.state.get();
        if current != expected {
            return Err(SandboxError::Infrastructure(format!(
                "cannot {} an isolate in state {}",
                operation, current
            )));
        }
        Ok(())
    }
}

impl Drop for IsolatedEngine {
    fn drop(&mut self) {
        let final_state = self.state.replace(EngineState::Disposed);
        if !final_state.is_terminal() && final_state != EngineState::Created {
            warn!(state = %final_state, "Isolate released mid-run");
        }
        self.runtime.set_interrupt_handler(None);
        debug!(state = %final_state, "Isolate disposed");
    }
}

fn compile_body<'js>(ctx: &Ctx<'js>, source: &str) -> Result<Function<'js>, String> {
    let constructor: Constructor = ctx.globals().get("Function").catch(ctx).map_err(describe)?;
    constructor
        .construct::<_, Function>((source,))
        .catch(ctx)
        .map_err(describe)
}

fn completion_string(value: Value<'_>) -> Result<String, RunFailure> {
    match value.as_string() {
        Some(text) => text.to_string().map_err(|e| RunFailure::Malformed(e.to_string())),
        None => Err(RunFailure::Malformed(format!(
            "bundle completed with {} instead of a string",
            value.type_name()
        ))),
    }
}

fn classify(caught: CaughtError<'_>) -> RunFailure {
    if let CaughtError::Error(rquickjs::Error::Allocation) = caught {
        return RunFailure::OutOfMemory;
    }
    let message = describe(caught);
    if message.contains("out of memory") {
        RunFailure::OutOfMemory
    } else {
        RunFailure::Thrown(message)
    }
}

fn describe(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => {
            let message = exception.message().unwrap_or_default();
            match exception.get::<_, Option<String>>("name").ok().flatten() {
                Some(name) if !name.is_empty() && !message.starts_with(&name) => {
                    format!("{}: {}", name, message)
                }
                _ => message,
            }
        }
        CaughtError::Value(value) => format!("uncaught {} value", value.type_name()),
        CaughtError::Error(error) => error.to_string(),
    }
}
