use crate::runtime::{Builder, Runtime, UnhandledPanic};
use crate::task::Task;
use crate::yield_now;
use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Installs a `debug` fmt subscriber that writes through the test harness.
/// First call wins.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Serializes tests that touch the process environment.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock()
}

/// Local runtime that unwinds task panics into the test instead of aborting.
pub(crate) fn local_runtime() -> anyhow::Result<Runtime> {
    init_test_logging();

    Builder::new_local()
        .unhandled_panic(UnhandledPanic::Propagate)
        .try_build()
}

/// Ordered record of the steps taken by tasks.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Task named `label` that records `label0`, yields, `label1`, yields, ...
/// for `steps` steps, then completes without yielding again.
pub(crate) fn stepper(label: &str, steps: usize, journal: &Journal) -> Task {
    let label = label.to_string();
    let journal = journal.clone();

    Task::builder().name(label.clone()).build(async move {
        for i in 0..steps {
            journal.record(format!("{label}{i}"));
            yield_now().await;
        }
    })
}

/// Task that never completes and never wakes itself.
pub(crate) fn parked(journal: &Journal) -> Task {
    let journal = journal.clone();

    Task::builder().name("parked").build(async move {
        journal.record("parked");
        futures::future::pending::<()>().await;
    })
}
