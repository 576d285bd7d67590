/// Producers and consumers sharing one bounded queue
extern crate blockq_lib;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use blockq_lib::{BoundedBlockingQueue, CancellationToken, QueueConfig, QueueError};
use chrono::Local;
use clap::Parser;
use rand::Rng;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Debug, Clone)]
struct Job {
    producer: usize,
    sequence: usize,
}

fn log(stdout: &Mutex<StandardStream>, color: Color, who: &str, message: &str) {
    let mut guard = stdout.lock().unwrap();
    let stdout = &mut *guard;
    let now = Local::now().format("%H:%M:%S%.3f");
    stdout
        .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))
        .unwrap();
    write!(stdout, "[{}] {:<12}", now, who).unwrap();
    stdout.reset().unwrap();
    writeln!(stdout, " {}", message).unwrap();
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Queue capacity
    #[arg(short, long, default_value_t = 4, conflicts_with = "unbounded")]
    capacity: usize,
    /// Use an unbounded queue instead of --capacity
    #[arg(short, long)]
    unbounded: bool,
    /// Path to a JSON queue config; overrides --capacity and --unbounded
    #[arg(long)]
    config: Option<String>,
    /// Number of producer threads
    #[arg(short, long, default_value_t = 2)]
    producers: usize,
    /// Number of consumer threads
    #[arg(short = 'n', long, default_value_t = 3)]
    consumers: usize,
    /// Jobs produced by each producer
    #[arg(short, long, default_value_t = 5)]
    jobs: usize,
    /// How long a producer waits for space before giving up on a job, in milliseconds
    #[arg(short, long, default_value_t = 200)]
    timeout_ms: u64,
}

fn main() {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => QueueConfig::from_json_file(path).unwrap(),
        None if args.unbounded => QueueConfig::unbounded(),
        None => QueueConfig::bounded(args.capacity),
    };
    let queue = Arc::new(BoundedBlockingQueue::<Job>::from_config(&config).unwrap());
    let token = CancellationToken::new();
    let stdout = Arc::new(Mutex::new(StandardStream::stdout(ColorChoice::Auto)));
    let timeout = Duration::from_millis(args.timeout_ms);

    let producers: Vec<_> = (0..args.producers)
        .map(|producer| {
            let queue = queue.clone();
            let token = token.clone();
            let stdout = stdout.clone();
            let jobs = args.jobs;
            thread::spawn(move || {
                let who = format!("producer-{}", producer);
                let mut rng = rand::thread_rng();
                for sequence in 0..jobs {
                    thread::sleep(Duration::from_millis(rng.gen_range(5..50)));
                    let job = Job { producer, sequence };
                    match queue.offer_timeout(job, timeout, &token) {
                        Ok(true) => log(&stdout, Color::Green, &who, &format!("queued #{}", sequence)),
                        Ok(false) => log(&stdout, Color::Yellow, &who, &format!("dropped #{} (queue full)", sequence)),
                        Err(err) => {
                            log(&stdout, Color::Red, &who, &err.to_string());
                            return;
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..args.consumers)
        .map(|consumer| {
            let queue = queue.clone();
            let token = token.clone();
            let stdout = stdout.clone();
            thread::spawn(move || {
                let who = format!("consumer-{}", consumer);
                let mut rng = rand::thread_rng();
                let mut handled = 0;
                loop {
                    match queue.take(&token) {
                        Ok(job) => {
                            handled += 1;
                            log(
                                &stdout,
                                Color::Cyan,
                                &who,
                                &format!("handling producer-{} #{}", job.producer, job.sequence),
                            );
                            thread::sleep(Duration::from_millis(rng.gen_range(20..80)));
                        }
                        Err(QueueError::Cancelled) => {
                            log(&stdout, Color::Magenta, &who, &format!("stopped after {} jobs", handled));
                            return handled;
                        }
                        Err(err) => panic!("unexpected queue error: {}", err),
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    // Let consumers finish what is left, then release the ones blocked on an empty queue.
    while !queue.is_empty() {
        thread::sleep(Duration::from_millis(10));
    }
    token.cancel();
    let handled: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
    log(
        &stdout,
        Color::White,
        "main",
        &format!("{} jobs handled, {:?}", handled, queue.signal_stats()),
    );
}
