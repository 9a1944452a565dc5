//! Cooperative analysis monitoring.
//!
//! Long-running computations consult an [`AnalysisMonitor`] at natural
//! checkpoints (between successors, between kernel rows, between time
//! points). The monitor never forces termination; when it reports that an
//! interruption was requested, the engine stops at the next checkpoint and
//! returns [`crate::Error::Interrupted`].

/// Cooperative cancellation and progress reporting for an analysis.
///
/// Implementations must be cheap to query; the engine calls
/// [`AnalysisMonitor::interrupt_requested`] on every expansion step.
pub trait AnalysisMonitor {
    /// True if the caller asked the analysis to stop.
    fn interrupt_requested(&self) -> bool;

    /// Receive an informational message (progress, interruption notice).
    fn message(&self, text: &str) {
        log::info!("{text}");
    }
}

/// A monitor that never interrupts and logs messages at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMonitor;

impl AnalysisMonitor for NopMonitor {
    fn interrupt_requested(&self) -> bool {
        false
    }
}

/// A monitor backed by a shared boolean flag, for callers that cancel from
/// another execution context.
#[derive(Debug, Clone, Default)]
pub struct FlagMonitor {
    flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl FlagMonitor {
    /// Create an unset monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption at the next checkpoint.
    pub fn request_interrupt(&self) {
        self.flag.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

impl AnalysisMonitor for FlagMonitor {
    fn interrupt_requested(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_monitor_interrupts_after_request() {
        let m = FlagMonitor::new();
        assert!(!m.interrupt_requested());
        m.request_interrupt();
        assert!(m.interrupt_requested());
    }
}
