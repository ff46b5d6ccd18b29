use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex, OnceLock, Weak};
use std::thread::{self, ThreadId};

use logrelay::config::{Config, RuntimeLimits};
use logrelay::relay::{
    INLINE_LIMIT, LogCommand, LogRelay, OverflowChannel, RelayError, Severity, TestLogger,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    method: &'static str,
    message: String,
    html: bool,
    thread: ThreadId,
}

/// Logger that remembers every call, optionally failing all of them.
#[derive(Default)]
struct Recorder {
    entries: Mutex<Vec<Entry>>,
    fail: bool,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn record(&self, method: &'static str, message: &str, html: bool) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("logger rejected {method}");
        }
        self.entries.lock().unwrap().push(Entry {
            method,
            message: message.to_string(),
            html,
            thread: thread::current().id(),
        });
        Ok(())
    }

    fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }
}

impl TestLogger for Recorder {
    fn trace(&self, message: &str) -> anyhow::Result<()> {
        self.record("trace", message, false)
    }
    fn debug(&self, message: &str) -> anyhow::Result<()> {
        self.record("debug", message, false)
    }
    fn info(&self, message: &str, html: bool, _escape: bool) -> anyhow::Result<()> {
        self.record("info", message, html)
    }
    fn warn(&self, message: &str) -> anyhow::Result<()> {
        self.record("warn", message, false)
    }
}

fn relay_with(recorder: Arc<Recorder>, dir: &Path) -> LogRelay {
    relay_with_logger(recorder, dir)
}

fn files_in(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn hello_at_upper_case_info() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    relay.log("hello", "INFO").unwrap();

    let entries = recorder.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].method, "info");
    assert_eq!(entries[0].message, "hello");
    assert!(!entries[0].html);
}

#[test]
fn quotes_and_newlines_survive_the_inline_path() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let message = "it's ok\nline2";
    relay.log(message, "warn").unwrap();

    let command = LogCommand::inline(Severity::Warn.destination(), message);
    assert!(command.as_str().contains("it\\'s ok\\nline2"));
    assert_eq!(recorder.entries()[0].message, message);
    assert_eq!(recorder.entries()[0].method, "warn");
}

#[test]
fn tricky_inline_messages_arrive_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let samples = [
        "",
        "'); throw new Error('injected'); ('",
        "back\\slash \\n not a newline",
        "windows\r\nline endings",
        "\"double\" and `backtick` ${not_template}",
        "unicode ✓ 日本語",
        "nul\0byte",
        "\01 nul before a digit",
        "c0 \x01\x02\t\x0b\x0c\x1b[31m red \x7f",
    ];
    for sample in samples {
        relay.debug(sample).unwrap();
    }
    let got: Vec<String> = recorder.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(got, samples);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn html_goes_to_info_with_markup_flag() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    relay.log("<b>bold</b>", "Html").unwrap();
    relay.html(&format!("<pre>{}</pre>", "z".repeat(3000))).unwrap();

    let entries = recorder.entries();
    assert!(entries.iter().all(|e| e.method == "info" && e.html));
    assert_eq!(entries[1].message.len(), 3011);
}

#[test]
fn boundary_message_stays_inline() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let at_limit = "é".repeat(INLINE_LIMIT);
    relay.info(&at_limit).unwrap();
    assert_eq!(recorder.entries()[0].message, at_limit);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn long_message_is_spilled_read_back_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let message: String = (0..2000)
        .map(|i| match i % 7 {
            0 => '\'',
            1 => '\n',
            2 => '\\',
            _ => 'a',
        })
        .collect();
    relay.log(&message, "debug").unwrap();

    let entries = recorder.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].method, "debug");
    assert_eq!(entries[0].message.as_bytes(), message.as_bytes());
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn artifact_is_removed_when_the_logger_fails() {
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_with(Arc::new(Recorder::failing()), dir.path());

    let err = relay.log(&"y".repeat(5000), "warn").unwrap_err();
    match &err {
        RelayError::RuntimeExecution { command, cause } => {
            assert!(command.contains("readArtifact("));
            assert!(cause.contains("logger rejected warn"), "cause: {cause}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_fatal());
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn unwritable_overflow_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), &dir.path().join("missing"));

    relay.info("short messages still work").unwrap();
    let err = relay.info(&"x".repeat(INLINE_LIMIT + 1)).unwrap_err();
    assert!(matches!(err, RelayError::OverflowIo { .. }));
    assert!(err.is_fatal());
    assert_eq!(recorder.entries().len(), 1);
}

#[test]
fn bogus_level_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let err = relay.log("x", "bogus").unwrap_err();
    assert!(matches!(&err, RelayError::InvalidSeverity { level } if level == "bogus"));
    assert!(err.to_string().contains("bogus"));
    assert!(recorder.entries().is_empty());

    // Long messages with a bad level never touch the disk either.
    assert!(relay.log(&"x".repeat(4000), "bogus").is_err());
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn each_thread_gets_its_own_session() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = Arc::new(relay_with(recorder.clone(), dir.path()));
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = (0..2)
        .map(|n| {
            let relay = Arc::clone(&relay);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..20 {
                    relay.info(&format!("t{n}-{i}")).unwrap();
                    if i % 5 == 0 {
                        relay.debug(&format!("t{n}-{i}-{}", "L".repeat(1500))).unwrap();
                    }
                }
                let session = relay.current_session().unwrap();
                (thread::current().id(), session)
            })
        })
        .collect();
    let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let (thread_a, session_a) = &results[0];
    let (thread_b, session_b) = &results[1];
    assert_ne!(session_a.id, session_b.id);
    assert_eq!(&session_a.thread, thread_a);
    assert_eq!(&session_b.thread, thread_b);
    assert_eq!(session_a.commands_executed, 24);
    assert_eq!(session_b.commands_executed, 24);

    // Every message was delivered on the thread that logged it, in order.
    let entries = recorder.entries();
    for (n, thread) in [(0, thread_a), (1, thread_b)] {
        let prefix = format!("t{n}-");
        let mine: Vec<_> = entries
            .iter()
            .filter(|e| e.message.starts_with(&prefix))
            .collect();
        assert_eq!(mine.len(), 24);
        assert!(mine.iter().all(|e| &e.thread == thread));
        let infos: Vec<_> = mine
            .iter()
            .filter(|e| e.method == "info")
            .map(|e| e.message.clone())
            .collect();
        let expected: Vec<_> = (0..20).map(|i| format!("t{n}-{i}")).collect();
        assert_eq!(infos, expected);
    }
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn separate_relays_do_not_share_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let relay_one = relay_with(first.clone(), dir.path());
    let relay_two = relay_with(second.clone(), dir.path());

    relay_one.info("to one").unwrap();
    relay_two.info("to two").unwrap();

    assert_ne!(
        relay_one.current_session().unwrap().id,
        relay_two.current_session().unwrap().id
    );
    assert_eq!(first.entries()[0].message, "to one");
    assert_eq!(second.entries()[0].message, "to two");
    assert_eq!(first.entries().len(), 1);
}

#[test]
fn from_config_sweeps_stale_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let leftover = dir.path().join("cfg-crashed.log");
    fs::write(&leftover, "left behind").unwrap();

    let mut config = Config::default();
    config.overflow.dir = Some(dir.path().to_path_buf());
    config.overflow.prefix = "cfg-".into();
    config.overflow.stale_after_secs = 0;

    let recorder = Arc::new(Recorder::default());
    let relay = LogRelay::from_config(&config, recorder.clone());
    assert!(!leftover.exists());

    relay.warn(&"w".repeat(2048)).unwrap();
    assert_eq!(recorder.entries()[0].message.len(), 2048);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn multi_megabyte_message_with_default_limits() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    // 16 MiB of two-byte characters.
    let message = "é".repeat(8 * 1024 * 1024);
    relay.info(&message).unwrap();

    let entries = recorder.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message == message);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn control_characters_take_the_same_route_either_way() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let relay = relay_with(recorder.clone(), dir.path());

    let short = "nul\0byte\x07";
    let long = short.repeat(200);
    relay.warn(short).unwrap();
    relay.warn(&long).unwrap();

    let got: Vec<String> = recorder.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(got, [short.to_string(), long]);
}

#[test]
fn dropped_relays_do_not_leak_sessions_on_other_threads() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(Recorder::default());

    let (jobs, inbox) = mpsc::channel::<Option<Arc<LogRelay>>>();
    let (done, acks) = mpsc::channel::<()>();
    let worker = thread::spawn(move || {
        while let Some(relay) = inbox.recv().unwrap() {
            relay.info("from the worker").unwrap();
            drop(relay);
            done.send(()).unwrap();
        }
    });

    for _ in 0..50 {
        let relay = Arc::new(relay_with(logger.clone(), dir.path()));
        jobs.send(Some(Arc::clone(&relay))).unwrap();
        acks.recv().unwrap();
        // Last handle dropped here, away from the worker's session.
        drop(relay);
    }

    // Any later use of the registry on the worker prunes the dead entries.
    let other = Arc::new(relay_with(Arc::new(Recorder::default()), dir.path()));
    jobs.send(Some(other)).unwrap();
    acks.recv().unwrap();

    assert_eq!(Arc::strong_count(&logger), 1);
    assert_eq!(logger.entries().len(), 50);

    jobs.send(None).unwrap();
    worker.join().unwrap();
}

/// Logger that forwards every call into another relay.
struct Forward {
    inner: Arc<LogRelay>,
}

impl TestLogger for Forward {
    fn trace(&self, message: &str) -> anyhow::Result<()> {
        Ok(self.inner.trace(message)?)
    }
    fn debug(&self, message: &str) -> anyhow::Result<()> {
        Ok(self.inner.debug(message)?)
    }
    fn info(&self, message: &str, _html: bool, _escape: bool) -> anyhow::Result<()> {
        Ok(self.inner.info(message)?)
    }
    fn warn(&self, message: &str) -> anyhow::Result<()> {
        Ok(self.inner.warn(message)?)
    }
}

#[test]
fn logger_may_log_through_another_relay_on_the_same_thread() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let inner = Arc::new(relay_with(recorder.clone(), dir.path()));
    let outer = LogRelay::from_parts(
        Arc::new(Forward { inner }),
        OverflowChannel::new(dir.path(), "outer-"),
        RuntimeLimits::default(),
    );

    outer.debug("nested").unwrap();
    outer.warn(&"n".repeat(3000)).unwrap();

    let entries = recorder.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "nested");
    assert_eq!(entries[1].method, "warn");
    assert_eq!(entries[1].message.len(), 3000);
    assert_eq!(files_in(dir.path()), 0);
}

/// Logger that logs back through the relay it is bound to.
#[derive(Default)]
struct Echo {
    relay: OnceLock<Weak<LogRelay>>,
}

impl Echo {
    fn echo(&self, message: &str) -> anyhow::Result<()> {
        let relay = self.relay.get().and_then(Weak::upgrade);
        match relay {
            Some(relay) => Ok(relay.info(message)?),
            None => Ok(()),
        }
    }
}

impl TestLogger for Echo {
    fn trace(&self, message: &str) -> anyhow::Result<()> {
        self.echo(message)
    }
    fn debug(&self, message: &str) -> anyhow::Result<()> {
        self.echo(message)
    }
    fn info(&self, message: &str, _html: bool, _escape: bool) -> anyhow::Result<()> {
        self.echo(message)
    }
    fn warn(&self, message: &str) -> anyhow::Result<()> {
        self.echo(message)
    }
}

#[test]
fn same_relay_reentry_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let echo = Arc::new(Echo::default());
    let relay = Arc::new(relay_with_logger(echo.clone(), dir.path()));
    echo.relay.set(Arc::downgrade(&relay)).unwrap();

    let err = relay.debug("loop").unwrap_err();
    match &err {
        RelayError::RuntimeExecution { cause, .. } => {
            assert!(cause.contains("busy"), "cause: {cause}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_fatal());
}

fn relay_with_logger(logger: Arc<dyn TestLogger>, dir: &Path) -> LogRelay {
    LogRelay::from_parts(logger, OverflowChannel::new(dir, "itest-"), RuntimeLimits::default())
}
