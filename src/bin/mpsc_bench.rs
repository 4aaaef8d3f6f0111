//! MPSC queue throughput benchmark.
//!
//! Usage:
//!     cargo run --release --bin mpsc_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin the (first) producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin the consumer to CPU 2 (default: 2)

use std::env;
use std::hint;
use std::time::Instant;

use spool::sync::{mpsc, unbounded};

const QUEUE_SIZE: usize = 1 << 16;
const ITERATIONS: usize = 1 << 22;
const NUM_PRODUCERS: usize = 4;

type Payload = u64;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn bench_ring_single(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (producer, consumer) = mpsc::channel::<Payload>(QUEUE_SIZE).unwrap();

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for expected in 0..ITERATIONS as Payload {
            loop {
                if let Some(value) = consumer.pop() {
                    assert_eq!(value, expected, "data corruption");
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    pin_to_cpu(producer_cpu);
    let start = Instant::now();

    for i in 0..ITERATIONS as Payload {
        let mut item = i;
        // Spin on lossy rejection; the consumer drains continuously.
        while let Err(returned) = producer.push(item) {
            item = returned;
            hint::spin_loop();
        }
    }

    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("ring 1p/1c:  {} ops/ms", ops_per_ms);
}

fn bench_ring_multi(consumer_cpu: Option<usize>) {
    let (producer, consumer) = mpsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let per_producer = ITERATIONS / NUM_PRODUCERS;

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        let mut received = 0usize;
        while received < per_producer * NUM_PRODUCERS {
            if consumer.pop().is_some() {
                received += 1;
            } else {
                hint::spin_loop();
            }
        }
    });

    let start = Instant::now();

    let mut producers = vec![];
    for p in 0..NUM_PRODUCERS {
        let producer = producer.clone();
        producers.push(std::thread::spawn(move || {
            for i in 0..per_producer {
                let mut item = (p * per_producer + i) as Payload;
                while let Err(returned) = producer.push(item) {
                    item = returned;
                    hint::spin_loop();
                }
            }
        }));
    }

    for h in producers {
        h.join().unwrap();
    }
    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = (per_producer * NUM_PRODUCERS) as u128 * 1_000_000 / elapsed.as_nanos();
    println!("ring {NUM_PRODUCERS}p/1c:  {} ops/ms", ops_per_ms);
}

fn bench_linked_single(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (producer, consumer) = unbounded::channel::<Payload>();

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for expected in 0..ITERATIONS as Payload {
            loop {
                if let Some(value) = consumer.pop() {
                    assert_eq!(value, expected, "data corruption");
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    pin_to_cpu(producer_cpu);
    let start = Instant::now();

    for i in 0..ITERATIONS as Payload {
        producer.push(i);
    }

    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("linked 1p/1c: {} ops/ms", ops_per_ms);
}

fn main() {
    spool::trace::init_tracing();
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("spool MPSC (size={}, iters={}):", QUEUE_SIZE, ITERATIONS);
    bench_ring_single(producer_cpu, consumer_cpu);
    bench_ring_multi(consumer_cpu);
    bench_linked_single(producer_cpu, consumer_cpu);
}
