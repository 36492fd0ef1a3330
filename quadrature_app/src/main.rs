use std::time::Duration;

use anyhow::{Context, bail};
use crossbeam::channel::{self, select};

use quadrature_backend::{CpalSink, SinkDiagnostics, StreamFault};
use quadrature_core::{StreamFormat, StreamScheduler, StreamingSink, ToneConfig};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = ToneConfig::default();
    config.validate().context("invalid tone configuration")?;
    log::info!("tone configuration: {}", config.to_json()?);

    let report = config.frequency_report()?;
    log::info!(
        "tuning word {:#010x}: {:.6} Hz requested {:.0} Hz ({:+.3e} relative)",
        report.tuning_word,
        report.actual_hz,
        report.requested_hz,
        report.relative_error
    );
    log::debug!("frequency report: {}", report.to_json()?);

    let scheduler = StreamScheduler::from_config(&config)?;
    log::info!(
        "wavetable ready: {} entries, amplitude {}",
        scheduler.filler().wavetable().len(),
        scheduler.filler().wavetable().amplitude()
    );

    let mut sink = CpalSink::open_default().context("no usable output device")?;
    sink.configure(StreamFormat::from_config(&config))?;
    sink.start(Box::new(scheduler))?;

    supervise(&sink)
}

/// Idle loop: report diagnostics and watch for stream faults. Never returns
/// unless the device goes away.
fn supervise(sink: &CpalSink) -> anyhow::Result<()> {
    let faults = sink.faults();
    let ticker = channel::tick(REPORT_INTERVAL);
    let mut previous: Option<SinkDiagnostics> = None;

    loop {
        select! {
            recv(faults) -> fault => match fault {
                Ok(StreamFault::DeviceLost) => bail!("{}", StreamFault::DeviceLost),
                Ok(fault) => log::error!("{}", fault),
                Err(_) => bail!("stream fault channel closed"),
            },
            recv(ticker) -> _ => {
                if let Some(diagnostics) = sink.diagnostics(true) {
                    let new_faults = match &previous {
                        Some(earlier) => diagnostics.new_faults_since(earlier),
                        None => diagnostics.deadline.deadline_misses + diagnostics.overruns + diagnostics.contended,
                    };
                    if new_faults > 0 {
                        log::warn!("{} ({} new)", diagnostics, new_faults);
                    } else {
                        log::info!("{}", diagnostics);
                    }
                    previous = Some(diagnostics);
                }
            },
        }
    }
}
