//! 界面事件
//!
//! 消费者线程把格式化后的遥测通过有界通道推给展示层。
//! 发送使用 `try_send`，通道满时丢弃事件并计数，消费者线程永不阻塞。

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// 展示层事件
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// 实测转向角（0.1 度）
    SteeringAngleChanged(i16),
    /// 平均车速文本，如 `"42.5 km/h"`
    VelocityChanged(String),
    /// 最近一条命令的力矩偏置文本
    SteeringTorqueChanged(String),
}

/// 事件发送端（可克隆，各消费者共享丢弃计数）
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<UiEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// 发送事件，通道满或接收端已关闭时返回 false
    pub fn emit(&self, event: UiEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("UI event channel full, dropped {:?}", event);
                false
            },
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            },
        }
    }

    /// 累计丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 创建容量为 `capacity` 的事件通道
pub fn channel(capacity: usize) -> (EventSink, Receiver<UiEvent>) {
    let (tx, rx) = bounded(capacity);
    (
        EventSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops_and_counts() {
        let (sink, rx) = channel(2);
        assert!(sink.emit(UiEvent::SteeringAngleChanged(1)));
        assert!(sink.emit(UiEvent::SteeringAngleChanged(2)));
        assert!(!sink.emit(UiEvent::SteeringAngleChanged(3)));
        assert_eq!(sink.dropped(), 1);

        assert_eq!(rx.try_recv().unwrap(), UiEvent::SteeringAngleChanged(1));
        assert!(sink.clone().emit(UiEvent::VelocityChanged("0.0 km/h".into())));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_disconnected_receiver_counts_as_dropped() {
        let (sink, rx) = channel(4);
        drop(rx);
        assert!(!sink.emit(UiEvent::SteeringTorqueChanged("0".into())));
        assert_eq!(sink.dropped(), 1);
    }
}
