//! Drives the notifier without a JVM: four threads "construct" objects and
//! announce them through a queued console sink.
//!
//! Run with `RUST_LOG=debug cargo run --example notify_demo`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use count_agent::core::notifier::AllocationNotifier;
use count_agent::sink::{ConsoleSink, QueuedSink};

#[derive(Debug)]
struct Widget {
    id: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let queue = QueuedSink::spawn(ConsoleSink::stdout(), 1_024)?;
    let notifier = Arc::new(AllocationNotifier::new(queue));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || {
                for i in 0..5 {
                    let widget = Arc::new(Widget { id: t * 100 + i });
                    notifier.new_event(Some(&widget));
                    log::debug!("constructed widget {}", widget.id);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().map_err(|_| "worker panicked")?;
    }
    notifier.new_event::<Arc<Widget>>(None);

    if !notifier.sink().flush(Duration::from_secs(5)) {
        log::warn!("queue did not drain in time");
    }
    log::info!("{}", notifier.metrics());
    Ok(())
}
