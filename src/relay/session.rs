//! Per-thread embedded runtime sessions.
//!
//! A QuickJS runtime is not safe to share between threads, so every calling
//! thread gets its own, created on first use and kept until the thread exits
//! or its relay is dropped. There is no lock between sessions: the registry
//! is a thread-local map.
//!
//! ```text
//! thread A ──► SESSIONS(A) { relay 1 ─► RuntimeSession #1 }
//! thread B ──► SESSIONS(B) { relay 1 ─► RuntimeSession #2,
//!                            relay 2 ─► RuntimeSession #3 }
//! ```
//!
//! Entries are keyed by relay so two relays bound to different loggers never
//! share interpreter state. Each entry holds a weak handle to its relay's
//! liveness token; entries whose relay is gone are dropped the next time the
//! thread touches the registry. The map is only borrowed to look up or insert
//! an entry, never while a command runs, so a logger may log through another
//! relay on the same thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use rquickjs::function::Opt;
use rquickjs::{Context, Ctx, Exception, Function, Object, Runtime};
use tracing::{debug, trace};

use super::command::{LOGGER_BINDING, LogCommand, READ_ARTIFACT_FN};
use super::error::RelayError;
use super::logger::TestLogger;
use crate::config::RuntimeLimits;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SESSIONS: RefCell<HashMap<u64, SessionSlot>> = RefCell::new(HashMap::new());
}

/// Registry entry: the session plus a weak handle on its relay.
struct SessionSlot {
    alive: Weak<()>,
    session: Rc<RefCell<RuntimeSession>>,
}

impl SessionSlot {
    fn is_orphaned(&self) -> bool {
        self.alive.strong_count() == 0
    }
}

/// Process-unique identifier of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Snapshot of the calling thread's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub thread: ThreadId,
    pub commands_executed: u64,
}

/// What a new session needs: the logger to bind and the runtime limits.
///
/// Owned by exactly one relay. Dropping it orphans every session started
/// from it, on every thread.
pub(crate) struct SessionBootstrap {
    pub logger: Arc<dyn TestLogger>,
    pub limits: RuntimeLimits,
    liveness: Arc<()>,
}

impl SessionBootstrap {
    pub fn new(logger: Arc<dyn TestLogger>, limits: RuntimeLimits) -> Self {
        Self {
            logger,
            limits,
            liveness: Arc::new(()),
        }
    }
}

/// One embedded runtime with the logger already bound.
pub struct RuntimeSession {
    // Declared before the runtime so the context is released first.
    context: Context,
    _runtime: Runtime,
    id: SessionId,
    thread: ThreadId,
    commands_executed: u64,
}

impl RuntimeSession {
    fn start(bootstrap: &SessionBootstrap) -> Result<Self, RelayError> {
        let init = |e: rquickjs::Error| RelayError::SessionInit {
            cause: e.to_string(),
        };

        let runtime = Runtime::new().map_err(init)?;
        if let Some(mb) = bootstrap.limits.memory_limit_mb {
            runtime.set_memory_limit(mb.saturating_mul(1024 * 1024));
        }
        runtime.set_max_stack_size(bootstrap.limits.max_stack_size_kb.saturating_mul(1024));

        let context = Context::full(&runtime).map_err(init)?;
        context
            .with(|ctx| bind_logger(&ctx, &bootstrap.logger))
            .map_err(init)?;

        let session = Self {
            context,
            _runtime: runtime,
            id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            thread: thread::current().id(),
            commands_executed: 0,
        };
        debug!(
            target: "logrelay::session",
            session = %session.id, thread = ?session.thread,
            "Started embedded log runtime"
        );
        Ok(session)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            thread: self.thread,
            commands_executed: self.commands_executed,
        }
    }

    /// Run `command` once. Failures carry the command text; nothing is retried.
    pub fn execute(&mut self, command: LogCommand) -> Result<(), RelayError> {
        let script = command.into_script();
        trace!(target: "logrelay::session", session = %self.id, %script, "Executing log command");

        let outcome = self.context.with(|ctx| {
            ctx.eval::<(), _>(script.as_str())
                .map_err(|e| describe_error(&ctx, e))
        });

        match outcome {
            Ok(()) => {
                self.commands_executed += 1;
                Ok(())
            }
            Err(cause) => Err(RelayError::RuntimeExecution {
                command: script,
                cause,
            }),
        }
    }
}

/// Run `command` on the calling thread's session for relay `owner`,
/// starting that session first if needed.
pub(crate) fn execute_on_current(
    owner: u64,
    bootstrap: &SessionBootstrap,
    command: LogCommand,
) -> Result<(), RelayError> {
    let busy_command = command.as_str().to_string();
    with_current(owner, bootstrap, move |session| session.execute(command)).unwrap_or_else(|| {
        Err(RelayError::RuntimeExecution {
            command: busy_command,
            cause: "log session on this thread is busy (re-entrant log call)".into(),
        })
    })
}

/// Info for the calling thread's session, starting it if needed.
pub(crate) fn current_info(
    owner: u64,
    bootstrap: &SessionBootstrap,
) -> Result<SessionInfo, RelayError> {
    with_current(owner, bootstrap, |session| Ok(session.info())).unwrap_or_else(|| {
        Err(RelayError::SessionInit {
            cause: "log session on this thread is unavailable".into(),
        })
    })
}

/// Drop the calling thread's session for `owner`, if any.
pub(crate) fn release_current(owner: u64) {
    let released = SESSIONS
        .try_with(|cell| cell.try_borrow_mut().ok()?.remove(&owner))
        .ok()
        .flatten();
    // Dropped after the registry borrow ends; the logger may log on drop.
    if released.is_some() {
        trace!(target: "logrelay::session", relay = owner, "Released session");
    }
}

/// Number of sessions registered on the calling thread.
#[cfg(test)]
pub(crate) fn registered_on_current() -> usize {
    SESSIONS
        .try_with(|cell| cell.try_borrow().map(|sessions| sessions.len()).unwrap_or(0))
        .unwrap_or(0)
}

/// `None` when the session is unavailable: either this relay already has a
/// command running on this thread or the thread is being torn down.
fn with_current<R>(
    owner: u64,
    bootstrap: &SessionBootstrap,
    f: impl FnOnce(&mut RuntimeSession) -> Result<R, RelayError>,
) -> Option<Result<R, RelayError>> {
    let slot = match session_for(owner, bootstrap)? {
        Ok(session) => session,
        Err(e) => return Some(Err(e)),
    };
    let mut session = slot.try_borrow_mut().ok()?;
    Some(f(&mut session))
}

/// Look up or start the session for `owner`, pruning orphaned entries first.
fn session_for(
    owner: u64,
    bootstrap: &SessionBootstrap,
) -> Option<Result<Rc<RefCell<RuntimeSession>>, RelayError>> {
    SESSIONS
        .try_with(|cell| {
            let (existing, orphaned) = {
                let mut sessions = cell.try_borrow_mut().ok()?;
                let orphaned = take_orphaned(&mut sessions);
                let existing = sessions.get(&owner).map(|slot| Rc::clone(&slot.session));
                (existing, orphaned)
            };
            if !orphaned.is_empty() {
                debug!(
                    target: "logrelay::session",
                    count = orphaned.len(),
                    "Dropping sessions of released relays"
                );
            }
            drop(orphaned);

            if let Some(session) = existing {
                return Some(Ok(session));
            }
            let session = match RuntimeSession::start(bootstrap) {
                Ok(session) => Rc::new(RefCell::new(session)),
                Err(e) => return Some(Err(e)),
            };
            cell.try_borrow_mut().ok()?.insert(
                owner,
                SessionSlot {
                    alive: Arc::downgrade(&bootstrap.liveness),
                    session: Rc::clone(&session),
                },
            );
            Some(Ok(session))
        })
        .ok()
        .flatten()
}

fn take_orphaned(sessions: &mut HashMap<u64, SessionSlot>) -> Vec<SessionSlot> {
    let dead: Vec<u64> = sessions
        .iter()
        .filter(|(_, slot)| slot.is_orphaned())
        .map(|(owner, _)| *owner)
        .collect();
    dead.iter().filter_map(|owner| sessions.remove(owner)).collect()
}

/// Expose `logger` and `readArtifact` in the session's global scope.
fn bind_logger<'js>(ctx: &Ctx<'js>, logger: &Arc<dyn TestLogger>) -> rquickjs::Result<()> {
    let object = Object::new(ctx.clone())?;

    let sink = Arc::clone(logger);
    object.set(
        "trace",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, message: String| {
            deliver(&ctx, sink.trace(&message))
        })?,
    )?;

    let sink = Arc::clone(logger);
    object.set(
        "debug",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, message: String| {
            deliver(&ctx, sink.debug(&message))
        })?,
    )?;

    let sink = Arc::clone(logger);
    object.set(
        "info",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, message: String, html: Opt<bool>, escape: Opt<bool>| {
                let html = html.0.unwrap_or(false);
                let escape = escape.0.unwrap_or(!html);
                deliver(&ctx, sink.info(&message, html, escape))
            },
        )?,
    )?;

    let sink = Arc::clone(logger);
    object.set(
        "warn",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, message: String| {
            deliver(&ctx, sink.warn(&message))
        })?,
    )?;

    let globals = ctx.globals();
    globals.set(LOGGER_BINDING, object)?;
    globals.set(
        READ_ARTIFACT_FN,
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String| -> rquickjs::Result<String> {
                std::fs::read_to_string(&path).map_err(|e| {
                    Exception::throw_message(&ctx, &format!("cannot read {path}: {e}"))
                })
            },
        )?,
    )?;
    Ok(())
}

fn deliver(ctx: &Ctx<'_>, result: anyhow::Result<()>) -> rquickjs::Result<()> {
    result.map_err(|e| Exception::throw_message(ctx, &format!("{e:#}")))
}

/// Turn an eval error into readable text, pulling the thrown value's message
/// out of the context for exceptions.
fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    let thrown = ctx.catch();
    if let Some(message) = thrown
        .as_object()
        .and_then(|obj| obj.get::<_, String>("message").ok())
    {
        return message;
    }
    thrown
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| "uncaught exception".to_string())
}
