//! Throughput driver.
//!
//! A fixed set of workers start together on a barrier, then flip a fair coin
//! per iteration to either enqueue a random value or dequeue, until a stop
//! token fires. The per-worker operation counts are summed into a [`Report`].

use std::{ error, fmt, thread };
use std::sync::{ Arc, Barrier };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::{ Duration, Instant };
use rand_chacha::ChaCha8Rng;
use rand_core::{ RngCore, SeedableRng };
use crate::Queue;


pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_DURATION: Duration = Duration::from_millis(10_000);
pub const DEFAULT_SEED: u64 = 0x5eed;

/// Enqueued values are drawn from `1..=VALUE_RANGE`.
pub const VALUE_RANGE: u32 = 10_000;

/// Queue surface the driver needs.
pub trait ConcurrentQueue<T>: Sync {
    fn enqueue(&self, val: T);
    fn dequeue(&self) -> Option<T>;
}

impl<T: Send> ConcurrentQueue<T> for Queue<T> {
    #[inline]
    fn enqueue(&self, val: T) {
        Queue::enqueue(self, val)
    }

    #[inline]
    fn dequeue(&self) -> Option<T> {
        Queue::dequeue(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub threads: usize,
    pub duration: Duration,

    /// Elements enqueued before the workers start.
    pub initial: usize,
    pub seed: u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { name: &'static str, value: String },
    ZeroThreads,
    Unexpected(String)
}

/// Cooperative stop signal, checked by workers between operations.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub enqueues: u64,
    pub dequeues: u64,

    /// Dequeues that found the queue empty.
    pub empty: u64
}

#[derive(Debug, Clone)]
pub struct Report {
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration
}

impl Default for Config {
    fn default() -> Config {
        Config {
            threads: DEFAULT_THREADS,
            duration: DEFAULT_DURATION,
            initial: 0,
            seed: DEFAULT_SEED
        }
    }
}

impl Config {
    /// Parse positional `threads duration_ms initial [seed]`.
    ///
    /// Missing trailing arguments keep their defaults.
    pub fn from_args<I, S>(args: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>
    {
        fn parse<N: std::str::FromStr>(name: &'static str, value: &str) -> Result<N, ConfigError> {
            value.parse().map_err(|_| ConfigError::Invalid { name, value: value.to_owned() })
        }

        let mut config = Config::default();
        let mut args = args.into_iter();

        if let Some(arg) = args.next() {
            config.threads = parse("threads", arg.as_ref())?;
        }

        if let Some(arg) = args.next() {
            config.duration = Duration::from_millis(parse("duration", arg.as_ref())?);
        }

        if let Some(arg) = args.next() {
            config.initial = parse("initial", arg.as_ref())?;
        }

        if let Some(arg) = args.next() {
            config.seed = parse("seed", arg.as_ref())?;
        }

        if let Some(arg) = args.next() {
            return Err(ConfigError::Unexpected(arg.as_ref().to_owned()));
        }

        if config.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }

        Ok(config)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { name, value } => write!(f, "invalid {}: {:?}", name, value),
            ConfigError::ZeroThreads => f.write_str("threads must be at least 1"),
            ConfigError::Unexpected(arg) => write!(f, "unexpected argument: {:?}", arg)
        }
    }
}

impl error::Error for ConfigError {}

impl StopToken {
    pub fn new() -> StopToken {
        StopToken::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl WorkerReport {
    #[inline]
    pub fn ops(&self) -> u64 {
        self.enqueues + self.dequeues + self.empty
    }
}

impl Report {
    pub fn total(&self) -> u64 {
        self.workers.iter().map(WorkerReport::ops).sum()
    }

    pub fn enqueues(&self) -> u64 {
        self.workers.iter().map(|w| w.enqueues).sum()
    }

    pub fn dequeues(&self) -> u64 {
        self.workers.iter().map(|w| w.dequeues).sum()
    }

    pub fn empty(&self) -> u64 {
        self.workers.iter().map(|w| w.empty).sum()
    }

    /// Operations per second over the measured window.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();

        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Uniform value in `1..=range`.
#[inline]
pub fn rand_range<R: RngCore + ?Sized>(rng: &mut R, range: u32) -> u32 {
    debug_assert!(range > 0);

    1 + ((u64::from(rng.next_u32()) * u64::from(range)) >> 32) as u32
}

/// Independent generator for worker `index`.
pub fn worker_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ index as u64)
}

pub fn worker<Q, R>(queue: &Q, rng: &mut R, start: &Barrier, stop: &StopToken) -> WorkerReport
where
    Q: ConcurrentQueue<u32> + ?Sized,
    R: RngCore + ?Sized
{
    let mut report = WorkerReport::default();

    start.wait();

    while !stop.is_cancelled() {
        if rand_range(rng, 2) == 1 {
            queue.enqueue(rand_range(rng, VALUE_RANGE));
            report.enqueues += 1;
        } else if queue.dequeue().is_some() {
            report.dequeues += 1;
        } else {
            report.empty += 1;
        }
    }

    report
}

pub fn run<Q>(queue: &Q, config: &Config) -> Report
where
    Q: ConcurrentQueue<u32>
{
    let mut rng = ChaCha8Rng::seed_from_u64(!config.seed);
    for _ in 0..config.initial {
        queue.enqueue(rand_range(&mut rng, VALUE_RANGE));
    }

    log::debug!("prefilled {} elements", config.initial);

    let start = Barrier::new(config.threads + 1);
    let stop = StopToken::new();

    let (workers, elapsed) = thread::scope(|s| {
        let handles = (0..config.threads)
            .map(|index| {
                let mut rng = worker_rng(config.seed, index);
                let (start, stop) = (&start, &stop);

                s.spawn(move || worker(queue, &mut rng, start, stop))
            })
            .collect::<Vec<_>>();

        start.wait();
        let now = Instant::now();
        log::info!("{} workers started, running for {:?}", config.threads, config.duration);

        thread::sleep(config.duration);
        stop.cancel();

        let workers = handles.into_iter()
            .map(|h| h.join().unwrap_or_else(|err| std::panic::resume_unwind(err)))
            .collect::<Vec<_>>();

        (workers, now.elapsed())
    });

    for (index, report) in workers.iter().enumerate() {
        log::debug!("worker {}: {:?}", index, report);
    }

    Report { workers, elapsed }
}
