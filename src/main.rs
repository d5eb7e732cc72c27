//! FlashDriver - Control-Plane Command Dispatcher
//!
//! This is the main entry point for the driver binary.
//! It sets up logging, starts the duty cycle thread and the stats reporter,
//! and optionally runs a simulated client against the driver.

use anyhow::Context;
use flashdriver::agent::{AgentRunner, DriverAgent, DriverConfig, StatsReporter};
use flashdriver::client::{read_error_responses, DriverProxy};
use flashdriver::queue::{ManyToOneRingBuffer, RingBufferConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Binary configuration
#[derive(Default)]
struct Config {
    /// Driver settings
    driver: DriverConfig,
    /// Run a simulated client alongside the driver
    demo: bool,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--queue-capacity" | "-q" => {
                    let capacity: usize = parse_value(&args, i, "--queue-capacity");
                    config.driver.command_queue_capacity = capacity;
                    config.driver.response_buffer_capacity = capacity;
                    i += 2;
                }
                "--liveness-timeout-ms" => {
                    let ms: u64 = parse_value(&args, i, "--liveness-timeout-ms");
                    config.driver.client_liveness_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                "--idle-ms" => {
                    let ms: u64 = parse_value(&args, i, "--idle-ms");
                    config.driver.idle_sleep = Duration::from_millis(ms);
                    i += 2;
                }
                "--demo" => {
                    config.demo = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("FlashDriver version {}", flashdriver::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

/// Parses the value following the flag at `i`, exiting on error.
fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", flag, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
FlashDriver - Control-Plane Command Dispatcher

USAGE:
    flashdriver [OPTIONS]

OPTIONS:
    -q, --queue-capacity <BYTES>     Command and response buffer size, a power of two (default: 65536)
        --liveness-timeout-ms <MS>   Client liveness timeout (default: 10000)
        --idle-ms <MS>               Sleep after an idle duty cycle (default: 1)
        --demo                       Run a simulated client against the driver
    -v, --version                    Print version information
    -h, --help                       Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=flashdriver=trace

EXAMPLES:
    flashdriver                              # Start with defaults
    flashdriver --demo                       # Start and drive it with a test client
    flashdriver --queue-capacity 1048576     # 1 MiB command queue
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();

    info!(version = flashdriver::VERSION, "FlashDriver starting");

    let agent = DriverAgent::new(&config.driver).context("failed to create driver buffers")?;
    let counters = agent.counters().clone();
    let error_log = Arc::clone(agent.error_log());
    let to_driver = Arc::clone(agent.to_driver());
    let to_clients = Arc::clone(agent.to_clients());

    info!(
        queue_capacity = to_driver.capacity(),
        max_command_length = to_driver.max_msg_length(),
        liveness_timeout_ms = config.driver.client_liveness_timeout.as_millis() as u64,
        "Driver buffers allocated"
    );

    let mut runner = AgentRunner::start(agent, config.driver.idle_sleep)
        .context("failed to spawn duty cycle thread")?;
    let _reporter = StatsReporter::start(
        counters.clone(),
        Arc::clone(&error_log),
        config.driver.stats_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let demo = if config.demo {
        let responses = RingBufferConsumer::claim(to_clients)
            .context("response buffer already has a reader")?;
        Some(tokio::spawn(demo_client(to_driver, responses, shutdown_rx)))
    } else {
        None
    };

    info!("Driver running. Use Ctrl+C to shutdown gracefully.");
    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("Shutdown signal received, stopping driver...");

    let _ = shutdown_tx.send(true);
    if let Some(demo) = demo {
        let _ = demo.await;
    }

    if let Some(agent) = runner.stop() {
        info!(
            publications = agent.conductor().publication_count(),
            subscriptions = agent.conductor().subscription_count(),
            clients = agent.conductor().client_count(),
            "Final registrations"
        );
    }

    let log = error_log.lock().unwrap_or_else(|p| p.into_inner());
    for observation in log.observations() {
        info!(
            kind = observation.kind,
            code = %observation.code,
            count = observation.observation_count,
            error = %observation.message,
            "Distinct error"
        );
    }
    info!(
        commands = counters.commands_received.get(),
        errors = counters.errors.get(),
        unrecorded = log.unrecorded(),
        "Driver shutdown complete"
    );

    Ok(())
}

/// Simulated client that issues a mix of valid and invalid commands.
async fn demo_client(
    to_driver: Arc<ManyToOneRingBuffer>,
    mut responses: RingBufferConsumer,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut client = DriverProxy::new(Arc::clone(&to_driver), 1);
    let mut round: u64 = 0;

    // Registers once and then goes silent, so it times out
    let mut ghost = DriverProxy::new(to_driver, 2);
    if let Err(e) = ghost.add_subscription("aeron:ipc", 99) {
        warn!(error = %e, "Demo command rejected by queue");
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = shutdown_rx.changed() => {
                debug!("Demo client received shutdown signal");
                return;
            }
        }

        round += 1;
        if let Err(e) = demo_round(&mut client, round) {
            warn!(error = %e, "Demo command rejected by queue");
        }

        for response in read_error_responses(&mut responses, 64) {
            info!(
                correlation_id = response.correlation_id,
                code = %response.code,
                message = %response.message,
                "Error response received"
            );
        }
    }
}

fn demo_round(client: &mut DriverProxy, round: u64) -> flashdriver::queue::QueueResult<()> {
    client.send_keepalive()?;

    let publication = client.add_publication("aeron:udp?endpoint=localhost:40123", 1001)?;
    client.add_destination(publication, "aeron:udp?endpoint=localhost:40124")?;
    let spy = client.add_subscription("aeron-spy:aeron:udp?endpoint=localhost:40123", 1001)?;

    // Every third round sends commands the conductor rejects
    if round % 3 == 0 {
        client.add_subscription("udp://not-a-channel", 7)?;
        client.remove_publication(-1)?;
        client.remove_destination(publication, "aeron:udp?endpoint=nowhere:1")?;
    }

    client.remove_subscription(spy)?;
    client.remove_publication(publication)?;
    Ok(())
}
