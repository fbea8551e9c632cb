use anyhow::Result;
use cc128d::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    signals,
    sinks::Dispatcher,
    sources::{MessageDecoder, SerialLineSource},
    transform::{ClockReconciler, HostZone},
};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let source = SerialLineSource::open(&cfg.meter.port)?;
    let dispatcher = Dispatcher::open_all(&cfg.outputs).await?;

    let pipeline = Pipeline {
        source,
        decoder: MessageDecoder,
        clock: ClockReconciler::new(cfg.meter.use_system_clock, HostZone),
        dispatcher,
    };

    let cancel = CancellationToken::new();
    signals::spawn_termination_listener(cancel.clone());

    tracing::info!("starting read loop");
    match pipeline.run(cancel).await {
        Ok(summary) => {
            tracing::info!(
                readings = summary.readings,
                history_frames = summary.history_frames,
                "exiting"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "read loop failed");
            Err(e.into())
        }
    }
}
