//! Network event loop.
//!
//! # Responsibilities
//! - Own the Tokio runtime all socket I/O is multiplexed on
//! - Run it on the network I/O thread until stopped
//! - Offer single-turn ticks for cooperative mode
//!
//! # Design Decisions
//! - Current-thread runtime: exactly one thread ever polls sockets
//! - Stop is a flag plus a `Notify` permit, so an early stop is never lost
//! - Tasks still pending at free are dropped with the runtime

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;

use crate::pool::Threading;
use crate::subsystem::EventLoop;

/// Event loop backed by a current-thread Tokio runtime.
pub struct TokioEventLoop {
    runtime: Runtime,
    stopping: AtomicBool,
    wake: Notify,
    threading: Threading,
}

impl TokioEventLoop {
    pub fn new(threading: Threading) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("overlayd-ev")
            .build()?;

        tracing::debug!(threading = ?threading, "Event loop created");
        Ok(Self {
            runtime,
            stopping: AtomicBool::new(false),
            wake: Notify::new(),
            threading,
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl EventLoop for TokioEventLoop {
    fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    fn run(&self) {
        tracing::info!(threading = ?self.threading, "Event loop running");
        self.runtime.block_on(async {
            loop {
                let notified = self.wake.notified();
                if self.is_stopping() {
                    break;
                }
                notified.await;
            }
        });
        tracing::info!("Event loop exited");
    }

    fn tick(&self) -> bool {
        if self.is_stopping() {
            return false;
        }
        self.runtime.block_on(tokio::task::yield_now());
        !self.is_stopping()
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn stop(&self) {
        self.request_stop();
        tracing::info!("Event loop stopped");
    }
}
