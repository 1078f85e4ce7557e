//! End-to-end session registration over TCP.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use overlayd::config::TomlConfigStore;
use overlayd::ev::TokioEventLoop;
use overlayd::logic::LogicScheduler;
use overlayd::pool::{Threading, WorkerPool};
use overlayd::router::{OverlayRouter, HELLO_PREFIX};
use overlayd::subsystem::{EventLoop, Logic, Router, ThreadPool};

mod common;

/// Worker pool, event loop and logic thread running in the background.
struct Harness {
    worker: Arc<dyn ThreadPool>,
    event_loop: Arc<dyn EventLoop>,
    logic: Arc<dyn Logic>,
    threads: Vec<JoinHandle<()>>,
}

impl Harness {
    fn new() -> Self {
        let worker: Arc<dyn ThreadPool> =
            Arc::new(WorkerPool::new(2, "worker", Threading::Multi).unwrap());
        let event_loop: Arc<dyn EventLoop> =
            Arc::new(TokioEventLoop::new(Threading::Multi).unwrap());
        let logic: Arc<dyn Logic> =
            Arc::new(LogicScheduler::new(Arc::clone(&worker), Threading::Multi));
        Self {
            worker,
            event_loop,
            logic,
            threads: Vec::new(),
        }
    }

    fn router(&self, toml: &str) -> OverlayRouter {
        let router = OverlayRouter::new(
            Arc::clone(&self.worker),
            Arc::clone(&self.event_loop),
            Arc::clone(&self.logic),
        );
        let store = TomlConfigStore::parse(Path::new("router.toml"), toml).unwrap();
        router.configure(&store).unwrap();
        router
    }

    fn spawn(&mut self) {
        let event_loop = Arc::clone(&self.event_loop);
        self.threads.push(thread::spawn(move || event_loop.run()));
        let logic = Arc::clone(&self.logic);
        self.threads.push(thread::spawn(move || logic.run_mainloop()));
    }

    fn stop(mut self) {
        self.event_loop.stop();
        self.logic.stop();
        for handle in self.threads.drain(..) {
            handle.join().unwrap();
        }
        self.worker.stop();
        self.worker.join();
    }
}

fn connect_with_hello(router: &OverlayRouter, netid: &str) -> (TcpStream, String) {
    let addr = router.local_addrs()[0];
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    writeln!(stream, "{} {}", HELLO_PREFIX, netid).unwrap();

    let mut line = String::new();
    BufReader::new(stream.try_clone().unwrap())
        .read_line(&mut line)
        .unwrap();
    (stream, line)
}

#[test]
fn inbound_peer_gets_a_session_until_it_leaves() {
    let mut harness = Harness::new();
    let router = harness.router("[bind]\nlocal = '127.0.0.1:0'\n");
    router.start();
    harness.spawn();

    let (client, hello) = connect_with_hello(&router, "overlay");
    assert_eq!(hello, format!("{} overlay\n", HELLO_PREFIX));
    assert!(common::wait_until(Duration::from_secs(5), || router.session_count() == 1));

    drop(client);
    assert!(common::wait_until(Duration::from_secs(5), || router.session_count() == 0));

    router.stop();
    harness.stop();
}

#[test]
fn peer_on_another_network_is_dropped() {
    let mut harness = Harness::new();
    let router = harness.router("[router]\nnetid = 'mainnet'\n\n[bind]\nlocal = '127.0.0.1:0'\n");
    router.start();
    harness.spawn();

    let (mut client, hello) = connect_with_hello(&router, "testnet");
    assert_eq!(hello, format!("{} mainnet\n", HELLO_PREFIX));

    let mut rest = Vec::new();
    let closed = client.read_to_end(&mut rest);
    assert!(closed.is_ok());
    assert_eq!(router.session_count(), 0);

    router.stop();
    harness.stop();
}

#[test]
fn configured_peer_is_dialed() {
    let mut harness = Harness::new();
    let listener = harness.router("[bind]\nlocal = '127.0.0.1:0'\n");
    let addr = listener.local_addrs()[0];
    let dialer = harness.router(&format!("[connect]\nseed = '{}'\n", addr));

    listener.start();
    dialer.start();
    harness.spawn();

    assert!(common::wait_until(Duration::from_secs(5), || {
        listener.session_count() == 1 && dialer.session_count() == 1
    }));
    assert_eq!(dialer.active_connections(), 1);

    dialer.stop();
    listener.stop();
    assert_eq!(dialer.session_count(), 0);
    harness.stop();
}

#[test]
fn stop_closes_open_connections() {
    let mut harness = Harness::new();
    let router = harness.router("[bind]\nlocal = '127.0.0.1:0'\n");
    router.start();
    harness.spawn();

    let (mut client, _) = connect_with_hello(&router, "overlay");
    assert!(common::wait_until(Duration::from_secs(5), || router.session_count() == 1));

    router.stop();
    let mut rest = Vec::new();
    assert!(client.read_to_end(&mut rest).is_ok());
    assert!(common::wait_until(Duration::from_secs(5), || router.active_connections() == 0));
    harness.stop();
}
