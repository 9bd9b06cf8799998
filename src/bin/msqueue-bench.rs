use std::{ env, process };
use log::{ Log, LevelFilter, Metadata, Record };
use msqueue::Queue;
use msqueue::harness::{ self, Config };


struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger() {
    let level = env::var("MSQUEUE_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Info);

    if log::set_logger(&Logger).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    init_logger();

    let config = match Config::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            eprintln!("usage: msqueue-bench [threads] [duration_ms] [initial] [seed]");
            process::exit(2);
        }
    };

    log::debug!("{:?}", config);

    let queue = Queue::new();
    let report = harness::run(&queue, &config);

    log::info!(
        "enqueues: {}, dequeues: {}, empty: {}, {:.0} ops/s",
        report.enqueues(),
        report.dequeues(),
        report.empty(),
        report.throughput()
    );

    println!("Total iterations: {}", report.total());
}
