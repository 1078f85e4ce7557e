//! The process-wide stop path a signal takes.
//!
//! Kept in its own test binary: it drives the global stop handle.

use std::thread;
use std::time::Duration;

use overlayd::lifecycle::signals;
use overlayd::pool::Threading;
use overlayd::subsystem::DefaultSubsystems;
use overlayd::{DaemonContext, Signal};

mod common;

#[test]
fn global_request_stop_ends_the_run_once() {
    assert!(!signals::request_stop(Signal::Interrupt));

    let tmp = tempfile::tempdir().unwrap();
    let path = common::netdb_config(tmp.path(), "");
    let mut ctx = DaemonContext::with_factory(DefaultSubsystems, Threading::Multi);
    let own = ctx.stop_handle();

    let stopper = thread::spawn(move || {
        assert!(common::wait_until(Duration::from_secs(5), || {
            signals::active().is_some_and(|active| std::sync::Arc::ptr_eq(&active, &own))
        }));
        thread::sleep(Duration::from_millis(20));
        let first = signals::request_stop(Signal::Interrupt);
        let second = signals::request_stop(Signal::Terminate);
        (first, second)
    });

    ctx.start(&path).unwrap();
    let (first, second) = stopper.join().unwrap();
    assert!(first);
    assert!(!second);

    assert_eq!(ctx.shutdown(), 0);
    assert!(signals::active().is_none());
    assert!(!signals::request_stop(Signal::Hangup));
}
