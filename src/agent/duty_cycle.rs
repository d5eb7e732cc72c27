//! Driver Duty Cycle
//!
//! [`DriverAgent`] owns everything the driver thread touches: the command
//! listener, the conductor behind it and the proxy that answers clients.
//! [`AgentRunner`] spins it on a dedicated OS thread.
//!
//! ## Idle Strategy
//!
//! Each cycle drains at most a bounded batch of commands and runs the
//! conductor's housekeeping. A cycle that found no work sleeps for
//! `idle_sleep` before trying again; a busy cycle loops immediately.

use crate::agent::DriverConfig;
use crate::client::ClientProxy;
use crate::conductor::RegistrationConductor;
use crate::dispatch::ClientListener;
use crate::errors::{epoch_millis, DistinctErrorLog, SharedErrorLog, SystemCounters};
use crate::queue::{ManyToOneRingBuffer, QueueResult, RingBufferConsumer};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The driver's single-threaded unit of work.
#[derive(Debug)]
pub struct DriverAgent {
    listener: ClientListener<RegistrationConductor, ClientProxy>,
    to_driver: Arc<ManyToOneRingBuffer>,
    to_clients: Arc<ManyToOneRingBuffer>,
    counters: SystemCounters,
    error_log: SharedErrorLog,
}

impl DriverAgent {
    /// Allocates the command queue and response buffer and wires the
    /// listener, conductor and client proxy together.
    pub fn new(config: &DriverConfig) -> QueueResult<Self> {
        let to_driver = Arc::new(ManyToOneRingBuffer::new(config.command_queue_capacity)?);
        let to_clients = Arc::new(ManyToOneRingBuffer::new(config.response_buffer_capacity)?);
        let consumer = RingBufferConsumer::claim(Arc::clone(&to_driver))?;

        let counters = SystemCounters::new();
        let error_log = DistinctErrorLog::shared(config.error_log_capacity);

        let conductor = RegistrationConductor::new(
            config.client_liveness_timeout,
            counters.client_timeouts.clone(),
        );
        let proxy = ClientProxy::new(Arc::clone(&to_clients), counters.dropped_responses.clone());

        let listener = ClientListener::new(
            consumer,
            conductor,
            proxy,
            counters.clone(),
            Arc::clone(&error_log),
        );

        Ok(Self {
            listener,
            to_driver,
            to_clients,
            counters,
            error_log,
        })
    }

    /// Runs one duty cycle and returns the amount of work done.
    ///
    /// The conductor clock advances before commands are drained, so commands
    /// received in this cycle are stamped with `now_ms`.
    pub fn do_work(&mut self, now_ms: i64) -> usize {
        let timeouts = self.listener.conductor_mut().do_work(now_ms);
        let commands = self.listener.receive();
        timeouts + commands
    }

    /// Queue clients write commands to.
    pub fn to_driver(&self) -> &Arc<ManyToOneRingBuffer> {
        &self.to_driver
    }

    /// Buffer error responses are written to.
    pub fn to_clients(&self) -> &Arc<ManyToOneRingBuffer> {
        &self.to_clients
    }

    pub fn counters(&self) -> &SystemCounters {
        &self.counters
    }

    pub fn error_log(&self) -> &SharedErrorLog {
        &self.error_log
    }

    pub fn conductor(&self) -> &RegistrationConductor {
        self.listener.conductor()
    }
}

/// A [`DriverAgent`] running on its own thread.
///
/// Dropping the runner stops the thread and waits for it.
#[derive(Debug)]
pub struct AgentRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<DriverAgent>>,
}

impl AgentRunner {
    /// Moves `agent` onto a new thread named `driver-conductor`.
    ///
    /// # Arguments
    ///
    /// * `agent` - The agent to run
    /// * `idle_sleep` - Pause after a cycle that did no work
    pub fn start(agent: DriverAgent, idle_sleep: Duration) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("driver-conductor".to_string())
            .spawn(move || run_duty_cycle(agent, flag, idle_sleep))?;

        info!(idle_sleep_ms = idle_sleep.as_millis() as u64, "Driver agent started");

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Returns true while the duty cycle thread has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signals the thread to stop and hands the agent back.
    ///
    /// Returns `None` if the runner was already stopped or the thread
    /// panicked.
    pub fn stop(&mut self) -> Option<DriverAgent> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;

        match handle.join() {
            Ok(agent) => {
                info!("Driver agent stopped");
                Some(agent)
            }
            Err(_) => {
                warn!("Driver agent thread panicked");
                None
            }
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_duty_cycle(mut agent: DriverAgent, running: Arc<AtomicBool>, idle_sleep: Duration) -> DriverAgent {
    while running.load(Ordering::Acquire) {
        let work_count = agent.do_work(epoch_millis());
        if work_count == 0 {
            thread::sleep(idle_sleep);
        }
    }

    debug!(
        commands = agent.counters.commands_received.get(),
        errors = agent.counters.errors.get(),
        "Duty cycle exited"
    );
    agent
}
