//! Background memory sampling.
//!
//! `MemorySampler` owns a thread that reads this process's resident set size
//! every `SAMPLE_INTERVAL` and keeps the maximum. It is stopped through a
//! `StopSignal` and joined by `stop()` or on drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chronofetch_io::RunLog;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Cancellation token that sleeping threads can wait on.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock().unwrap_or_else(|p| p.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep up to `timeout`, waking early on `stop()`. Returns true once
    /// stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|p| p.into_inner());
        let (stopped, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|p| p.into_inner());
        *stopped
    }
}

/// Resident set size of this process, if the platform reports it.
pub fn current_rss_bytes() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_memory(),
    );
    sys.process(pid).map(|p| p.memory())
}

pub struct MemorySampler {
    stop: StopSignal,
    peak: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl MemorySampler {
    /// Start sampling. If the thread cannot be spawned the failure is logged
    /// and the sampler reports a peak of zero.
    pub fn start(log: Arc<RunLog>) -> Self {
        let stop = StopSignal::new();
        let peak = Arc::new(AtomicU64::new(0));

        let thread_stop = stop.clone();
        let thread_peak = Arc::clone(&peak);
        let thread_log = Arc::clone(&log);
        let spawned = std::thread::Builder::new()
            .name("memory-sampler".to_string())
            .spawn(move || sample_loop(&thread_stop, &thread_peak, &thread_log));

        let handle = match spawned {
            Ok(h) => Some(h),
            Err(e) => {
                log.warn(format!("Memory sampler not started: {e}"));
                None
            }
        };
        Self { stop, peak, handle }
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Stop and join the sampling thread, returning the peak in bytes.
    pub fn stop(mut self) -> u64 {
        self.shutdown();
        self.peak_bytes()
    }

    fn shutdown(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sample_loop(stop: &StopSignal, peak: &AtomicU64, log: &RunLog) {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    let refresh_kind = ProcessRefreshKind::new().with_memory();

    loop {
        sys.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind);
        if let Some(process) = sys.process(pid) {
            let rss = process.memory();
            peak.fetch_max(rss, Ordering::Relaxed);
            log.debug(format!("Memory usage: {:.2} MB", bytes_to_mb(rss)));
        }
        if stop.wait_timeout(SAMPLE_INTERVAL) {
            break;
        }
    }
}
