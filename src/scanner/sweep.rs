//! Sweep driver: fan the top-level directories of the scan root out over a
//! worker pool, aggregate each one, and assemble the report.
//!
//! Each top-level directory is filled and extracted sequentially by a single
//! worker; only whole top-level subtrees run in parallel. Results are re-sorted
//! by name so the report does not depend on thread timing.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel as channel;

use crate::core::config::Config;
use crate::core::errors::{Result, UmcError};
use crate::logger::jsonl::{ActivityLog, EventType, LogEntry, Severity};
use crate::platform::storage::StorageBackend;
use crate::scanner::protection::ProtectedIndex;
use crate::scanner::report::{SweepReport, TopLevelReport, WhichList};
use crate::scanner::tree::{DirNode, ScanContext, extract_candidates};

/// Knobs of one sweep that are not part of the tree semantics.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub site: String,
    pub parallelism: usize,
    /// Top-level names never swept. Only checked directly under the root.
    pub dirs_to_avoid: Vec<String>,
    pub which_list: WhichList,
    /// Print per-top-level timing to stderr.
    pub verbose: bool,
}

impl SweepOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            site: config.site.name.clone(),
            parallelism: config.scan.parallelism,
            dirs_to_avoid: config.scan.dirs_to_avoid.clone(),
            which_list: config.output.which_list,
            verbose: false,
        }
    }
}

/// Build the shared context for a sweep starting at `now` (Unix seconds).
pub fn context_from_config(config: &Config, protected: ProtectedIndex, now: i64) -> ScanContext {
    ScanContext {
        lfn_root: config.scan.lfn_to_clean.clone(),
        pfn_root: config.scan.unmerged_dir_location.clone(),
        now,
        min_age: config.min_age_secs_i64(),
        protected,
    }
}

/// Current time in Unix seconds; captured once per sweep.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sweep every top-level directory under `ctx.pfn_root`.
///
/// The first storage failure stops the sweep: workers finish the directory
/// they hold, take no new work, and the error of the lowest-sorted failing
/// directory is returned.
pub fn run_sweep(
    ctx: Arc<ScanContext>,
    backend: Arc<dyn StorageBackend>,
    options: &SweepOptions,
    log: &ActivityLog,
) -> Result<SweepReport> {
    let started = Instant::now();

    let mut start = LogEntry::new(EventType::SweepStart, Severity::Info);
    start.site = Some(options.site.clone());
    start.path = Some(ctx.lfn_root.clone());
    start.details = Some(format!(
        "storage={} min_age={}s protected={}",
        backend.name(),
        ctx.min_age,
        ctx.protected.len()
    ));
    log.record(&start);

    let result = sweep_top_levels(&ctx, &backend, options, log);
    let elapsed_ms = elapsed_ms(started);

    match result {
        Ok((top_levels, skipped)) => {
            let report = SweepReport {
                site: options.site.clone(),
                storage: backend.name().to_string(),
                lfn_root: ctx.lfn_root.clone(),
                pfn_root: ctx.pfn_root.clone(),
                now: ctx.now,
                min_age_seconds: ctx.min_age,
                protected_entries: ctx.protected.len(),
                which_list: options.which_list,
                skipped,
                top_levels,
                elapsed_ms,
            };

            let mut done = LogEntry::new(EventType::SweepComplete, Severity::Info);
            done.site = Some(options.site.clone());
            done.path = Some(ctx.lfn_root.clone());
            done.candidates = Some(report.candidate_count() as u64);
            done.files = Some(report.top_levels.iter().map(TopLevelReport::total_files).sum());
            done.size = Some(report.total_bytes());
            done.duration_ms = Some(elapsed_ms);
            done.ok = Some(true);
            log.record(&done);
            Ok(report)
        }
        Err(err) => {
            let mut entry = LogEntry::error(&err);
            entry.site = Some(options.site.clone());
            entry.path = Some(ctx.lfn_root.clone());
            entry.duration_ms = Some(elapsed_ms);
            log.record(&entry);
            Err(err)
        }
    }
}

type TopLevelOutcome = (String, Result<TopLevelReport>);

fn sweep_top_levels(
    ctx: &Arc<ScanContext>,
    backend: &Arc<dyn StorageBackend>,
    options: &SweepOptions,
    log: &ActivityLog,
) -> Result<(Vec<TopLevelReport>, Vec<String>)> {
    let listing = backend.list(&ctx.pfn_root)?;
    let (skipped, to_sweep): (Vec<String>, Vec<String>) = listing
        .dirs
        .into_iter()
        .partition(|name| options.dirs_to_avoid.iter().any(|avoid| avoid == name));

    if to_sweep.is_empty() {
        return Ok((Vec::new(), skipped));
    }

    let workers = options.parallelism.max(1).min(to_sweep.len());
    let (work_tx, work_rx) = channel::bounded::<String>(to_sweep.len());
    let (result_tx, result_rx) = channel::unbounded::<TopLevelOutcome>();
    let abort = Arc::new(AtomicBool::new(false));

    for name in &to_sweep {
        work_tx
            .send(name.clone())
            .map_err(|e| UmcError::Worker {
                details: format!("work queue closed: {e}"),
            })?;
    }
    drop(work_tx);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let ctx = Arc::clone(ctx);
        let backend = Arc::clone(backend);
        let abort = Arc::clone(&abort);
        let log = log.clone();
        let with_files = options.which_list == WhichList::Files;
        let verbose = options.verbose;

        handles.push(thread::spawn(move || {
            while let Ok(name) = work_rx.recv() {
                if abort.load(Ordering::Acquire) {
                    break;
                }
                let outcome = sweep_one(&name, &ctx, backend.as_ref(), with_files);
                match &outcome {
                    Ok(top) => {
                        log_top_level(&log, &ctx, top);
                        if verbose {
                            eprintln!(
                                "[UMC-SWEEP] {}: {} candidate(s) in {} ms",
                                top.name,
                                top.candidate_count(),
                                top.elapsed_ms
                            );
                        }
                    }
                    Err(_) => abort.store(true, Ordering::Release),
                }
                if result_tx.send((name, outcome)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut outcomes: Vec<TopLevelOutcome> = result_rx.iter().collect();
    for handle in handles {
        handle.join().map_err(|_| UmcError::Worker {
            details: "sweep worker panicked".to_string(),
        })?;
    }

    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    let mut top_levels = Vec::with_capacity(outcomes.len());
    for (_, outcome) in outcomes {
        top_levels.push(outcome?);
    }
    if top_levels.len() != to_sweep.len() {
        return Err(UmcError::Worker {
            details: format!(
                "{} of {} top-level directories were not swept",
                to_sweep.len() - top_levels.len(),
                to_sweep.len()
            ),
        });
    }
    Ok((top_levels, skipped))
}

fn sweep_one(
    name: &str,
    ctx: &ScanContext,
    backend: &dyn StorageBackend,
    with_files: bool,
) -> Result<TopLevelReport> {
    let started = Instant::now();
    let node = DirNode::new(name).fill(ctx, backend)?;
    let candidates = extract_candidates(&node, ctx, with_files);
    Ok(TopLevelReport {
        name: node.name().to_string(),
        candidates,
        elapsed_ms: elapsed_ms(started),
    })
}

fn log_top_level(log: &ActivityLog, ctx: &ScanContext, top: &TopLevelReport) {
    let mut entry = LogEntry::new(EventType::TopLevelComplete, Severity::Info);
    entry.path = Some(ctx.lfn(&top.name));
    entry.candidates = Some(top.candidate_count() as u64);
    entry.files = Some(top.total_files());
    entry.size = Some(top.total_bytes());
    entry.duration_ms = Some(top.elapsed_ms);
    entry.ok = Some(true);
    log.record(&entry);
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
