use gum::{Control, Signal, Supervisor, UnitKind, WorkUnit};
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};

#[derive(UnitKind)]
struct Ticker(Duration);

impl WorkUnit for Ticker {
    async fn run(self, ctl: Control) {
        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = ctl.stopped() => break,
                _ = tokio::time::sleep(self.0) => {
                    ticks += 1;
                    info!("{} tick {}", ctl.name(), ticks);
                }
            }
        }
        ctl.done();
    }
}

#[derive(UnitKind)]
#[unit(kind = "flaky")]
struct Flaky(u32);

impl WorkUnit for Flaky {
    async fn run(self, ctl: Control) {
        for attempt in 1..=self.0 {
            tokio::select! {
                _ = ctl.stopped() => return ctl.done(),
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    info!("{} attempt {}", ctl.name(), attempt);
                }
            }
        }
        ctl.fail(format!("gave up after {} attempts", self.0));
    }
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(LevelFilter::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let mut sup = Supervisor::new();
    sup.register(Ticker(Duration::from_millis(300)), "fast");
    sup.register(Ticker(Duration::from_millis(700)), "slow");
    sup.register(Flaky(5), "remote");
    sup.shutdown_on([Signal::Interrupt, Signal::Terminate]);

    let quit = sup.quit().unwrap();
    tokio::spawn(sup.run());

    // Ctrl-C before five seconds for a signal shutdown, otherwise `remote` fails.
    let report = quit.join().await;
    dbg!(report);
}
