//! Stress helpers for trunkdb.
//!
//! These drive a resource from several threads and report what happened,
//! leaving the assertions to the calling test.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use trunkdb_core::{CommitPolicy, NodeContent, ResourceManager};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations each thread performs.
    pub operations_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 25,
        }
    }
}

/// Outcome of [`writer_contention`].
#[derive(Debug, Clone)]
pub struct WriterContentionReport {
    /// One operation per read-write transaction attempted.
    pub result: StressTestResult,
    /// Highest number of read-write transactions seen open at once.
    pub max_concurrent_writers: usize,
}

/// Lets `config.threads` threads repeatedly open a read-write transaction,
/// insert one node, commit and close.
///
/// The resource must be a JSON resource whose document is empty or an
/// array, and should not bound the write lock wait.
pub fn writer_contention(resource: &ResourceManager, config: &StressConfig) -> WriterContentionReport {
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let resource = resource.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations_per_thread;

            thread::spawn(move || {
                for _ in 0..operations {
                    let Ok(mut wtx) = resource.begin_node_trx(CommitPolicy::new()) else {
                        failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);

                    let outcome = append_to_array(&mut wtx).and_then(|()| wtx.commit().map(drop));

                    active.fetch_sub(1, Ordering::SeqCst);
                    let closed = wtx.close();
                    if outcome.is_ok() && closed.is_ok() {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    WriterContentionReport {
        result: StressTestResult::new(
            successful.load(Ordering::Relaxed),
            failed.load(Ordering::Relaxed),
            start.elapsed(),
        ),
        max_concurrent_writers: max_seen.load(Ordering::SeqCst),
    }
}

/// Inserts one number at the end of the top-level array, creating the
/// array first if the document is empty.
fn append_to_array(wtx: &mut trunkdb_core::NodeTrx) -> trunkdb_core::CoreResult<()> {
    wtx.move_to_document_root();
    if wtx.move_to_first_child() {
        wtx.insert_last_child(&NodeContent::number(1.0))?;
    } else {
        wtx.insert_first_child(&NodeContent::array())?;
    }
    Ok(())
}

/// Commits `config.operations_per_thread` revisions from one writer while
/// `config.threads` readers keep opening read-only transactions.
///
/// Every commit adds exactly one node, so a reader on revision `r` must see
/// `r` descendants under the document root, before and after the writer
/// moves on. A reader observing anything else counts as a failed
/// operation. The resource must be a fresh JSON resource.
pub fn readers_during_writes(resource: &ResourceManager, config: &StressConfig) -> StressTestResult {
    let done = Arc::new(AtomicBool::new(false));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let resource = resource.clone();
            let done = Arc::clone(&done);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let Ok(rtx) = resource.begin_node_read_only_trx() else {
                        failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };
                    let expected = u64::from(rtx.revision_number().as_u32());
                    let before = rtx.descendant_count();
                    thread::yield_now();
                    let after = rtx.descendant_count();
                    if before == expected && after == expected {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    let mut wtx = resource
        .begin_node_trx(CommitPolicy::new())
        .expect("Failed to begin writer");
    for _ in 0..config.operations_per_thread {
        append_to_array(&mut wtx).expect("Failed to insert");
        wtx.commit().expect("Failed to commit");
    }
    wtx.close().expect("Failed to close writer");
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().expect("reader thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
