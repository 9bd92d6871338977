//! Quick benchmark of the tick loop and invalidation fan-out

use std::rc::Rc;
use std::time::Instant;

use stepbind::binding::listener;
use stepbind::task::{Script, Suspension};
use stepbind::{AsyncTask, Binding, RuntimeConfig, TickScheduler};

fn main() {
    println!("Tick Loop Performance Test");
    println!("==========================\n");

    for tasks in [100, 1_000, 10_000] {
        let config = RuntimeConfig {
            journal: false,
            ..RuntimeConfig::default()
        };
        let scheduler = TickScheduler::new(config);
        for _ in 0..tasks {
            AsyncTask::start(
                &scheduler,
                Script::new()
                    .wait(Suspension::NextTick)
                    .wait(Suspension::Ticks(2))
                    .nest(Script::new().wait(Suspension::NextTick)),
            );
        }

        let start = Instant::now();
        let report = scheduler.run_until_idle();
        let elapsed = start.elapsed();

        println!("Tasks: {tasks}");
        println!("  Ticks: {}, pending: {}", report.ticks, report.pending);
        println!("  Time: {:?}", elapsed);
        println!("  Per task: {:?}\n", elapsed / tasks);
    }

    println!("Invalidation Fan-out");
    println!("====================\n");

    let binding = Binding::create("bench", || AsyncTask::wrap(0u64), |_| AsyncTask::wrap(()), None, None);
    let hits = Rc::new(std::cell::Cell::new(0u64));
    for _ in 0..100 {
        let hits = Rc::clone(&hits);
        binding.subscribe(listener(move || hits.set(hits.get() + 1)));
    }

    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        binding.invalidate();
    }
    let elapsed = start.elapsed();

    println!("{} invalidations x {} subscribers:", iterations, binding.subscriber_count());
    println!("  Deliveries: {}", hits.get());
    println!("  Time: {:?}", elapsed);
    println!("  Per invalidation: {:?}", elapsed / iterations);
}
