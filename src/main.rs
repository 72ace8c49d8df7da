use least_loaded::{
    logging::{self, LogConfig},
    workload::{sine, Workload},
    Config, LoadBalancer,
};
use tokio::runtime::Builder;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(LogConfig::default().with_env_overrides());
    let config = Config::demo().with_env_overrides()?;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let pool = LoadBalancer::start(config.clone(), sine)?;

        // one line per observed transition: loads in heap order, mean, variance
        let monitor = pool.start_monitoring(|snapshot| {
            println!("{}", snapshot.report_line());
        });

        let producers = Workload::new(config.producer_count).spawn(&pool);

        tokio::signal::ctrl_c().await?;
        info!("interrupted, stopping producers");
        producers.stop();
        let report = producers.join().await;

        pool.shutdown().await?;
        pool.stop_monitoring(monitor);
        info!(
            sent = report.sent,
            succeeded = report.succeeded,
            failed = report.failed,
            "done"
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
