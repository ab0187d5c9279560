//! # DShot Engine Bench
//!
//! Runs the DShot engine against a loopback peripheral with simulated ESCs.
//!
//! Every loop tick writes the bench throttle for all driven motors, starts a
//! burst, captures one motor's eRPM response and drains complete batches.

use anyhow::{Context, Result};
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};

use dshot_engine::config::Config;
use dshot_engine::dshot::protocol::{clamp_throttle, TELEMETRY_MOTORS};
use dshot_engine::telemetry::decoder::period_to_erpm;
use dshot_engine::telemetry::recorder::{JsonlRecorder, TelemetryRecord};
use dshot_engine::timer::loopback::{LoopbackPeripheral, LoopbackTimer};
use dshot_engine::timer::DshotDriver;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Microseconds per second, for loop period calculation
const MICROS_PER_SECOND: u64 = 1_000_000;

type BenchDriver = DshotDriver<LoopbackPeripheral, LoopbackTimer>;

/// Main entry point for the DShot bench
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first argument or `config/default.toml`)
///    - Lay out burst buffers and arm the outputs
///
/// 2. **Main Loop**
///    - Transmit, capture and decode at `loop_rate_hz`
///    - Log a summary every `summary_interval_batches` drained batches
///    - Record batches to JSONL when telemetry recording is enabled
///
/// 3. **Graceful Shutdown**
///    - Disarm outputs on Ctrl+C
///    - Flush the telemetry log
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded, the topology does not
/// fit the burst buffers, or the telemetry log directory cannot be created.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("DShot Engine v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let peripheral = LoopbackPeripheral::new(&config.bench.esc_periods);
    let mut driver = DshotDriver::from_config(&config, peripheral, LoopbackTimer::new());

    let channel_mask = driver
        .initialize(config.dshot.channel_mask, config.dshot.frequency_hz)
        .context("Failed to initialize DShot outputs")?;
    driver.set_armed(true)?;

    let mut recorder = if config.telemetry.enabled {
        Some(JsonlRecorder::from_config(&config.telemetry)?)
    } else {
        None
    };

    let throttle = clamp_throttle(config.bench.throttle);
    let mailbox = driver.mailbox();
    let stats = driver.stats();

    let mut tick = interval(loop_period(config.bench.loop_rate_hz));

    info!("Starting bench loop at {}Hz, throttle {}", config.bench.loop_rate_hz, throttle);
    info!("Press Ctrl+C to exit");

    let mut periods = [0u32; TELEMETRY_MOTORS];
    let mut batches: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = run_tick(&mut driver, channel_mask, throttle).await {
                    debug!("Failed to start burst: {}", e);
                    continue;
                }

                if !mailbox.drain(&mut periods) {
                    continue;
                }
                batches += 1;

                if let Some(recorder) = recorder.as_mut() {
                    let record = TelemetryRecord::new(batches, periods, stats.snapshot());
                    if let Err(e) = recorder.record(&record) {
                        warn!("Failed to record telemetry: {}", e);
                    }
                }

                if batches % config.bench.summary_interval_batches == 0 {
                    let snapshot = stats.snapshot();
                    info!(
                        "Batch {}: eRPM {:?}, decode success {:.1}% \
                         ({} bad nibble, {} bad CRC, {} no signal)",
                        batches,
                        periods.map(period_to_erpm),
                        snapshot.success_ratio() * 100.0,
                        snapshot.bad_nibble,
                        snapshot.bad_crc,
                        snapshot.no_signal
                    );
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                driver.set_armed(false)?;
                info!("Total batches drained: {}", batches);
                break;
            }
        }
    }

    if let Some(recorder) = recorder.as_mut() {
        recorder.flush()?;
    }

    Ok(())
}

/// One control tick: write commands, burst, capture and decode
async fn run_tick(
    driver: &mut BenchDriver,
    channel_mask: u32,
    throttle: u16,
) -> dshot_engine::error::Result<()> {
    for motor in (0..u32::BITS as usize).filter(|&motor| channel_mask & (1 << motor) != 0) {
        driver.set_command(motor, throttle, false);
    }

    driver.trigger_transmission()?;
    driver.on_transfer_complete();

    if let Some(delay) = driver.timer_mut().take_pending() {
        sleep(delay).await;
        driver.on_deferred_timeout();
    }

    Ok(())
}

/// Loop period for a control rate
fn loop_period(rate_hz: u32) -> Duration {
    Duration::from_micros(MICROS_PER_SECOND / u64::from(rate_hz.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_period_calculation() {
        assert_eq!(loop_period(1000), Duration::from_millis(1));
        assert_eq!(loop_period(8000), Duration::from_micros(125));
        assert_eq!(loop_period(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_ticks_drain_esc_periods() {
        let config =
            Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).unwrap();
        let peripheral = LoopbackPeripheral::new(&config.bench.esc_periods);
        let mut driver = DshotDriver::from_config(&config, peripheral, LoopbackTimer::new());
        let mask = driver.initialize(0x0F, 600_000).unwrap();
        driver.set_armed(true).unwrap();

        let mut periods = [0u32; TELEMETRY_MOTORS];
        for _ in 0..TELEMETRY_MOTORS {
            assert!(!driver.drain_periods(&mut periods));
            run_tick(&mut driver, mask, 48).await.unwrap();
        }

        assert!(driver.drain_periods(&mut periods));
        assert_eq!(periods.to_vec(), config.bench.esc_periods);
        assert_eq!(driver.peripheral().bursts(), 4);
    }

    #[test]
    fn test_default_config_path() {
        assert!(DEFAULT_CONFIG_PATH.ends_with(".toml"));
        assert!(Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).is_ok());
    }
}
