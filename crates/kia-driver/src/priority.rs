//! 实时线程优先级（`realtime` feature）

/// 把当前线程提升到最高优先级，失败只记录警告
#[cfg(feature = "realtime")]
pub(crate) fn raise_current_thread_priority(thread: &str) {
    use thread_priority::{ThreadPriority, set_current_thread_priority};
    use tracing::{info, warn};

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("{} thread priority set to MAX (realtime)", thread),
        Err(e) => warn!(
            "Failed to set {} thread priority: {:?}. \
            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            thread, e
        ),
    }
}

#[cfg(not(feature = "realtime"))]
pub(crate) fn raise_current_thread_priority(_thread: &str) {}
