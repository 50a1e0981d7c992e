//! 各类遥测的消费者变换
//!
//! 每个函数返回一个交给 [`PollConsumer`](kia_driver::PollConsumer) 的闭包。
//! 闭包只做格式化和非阻塞发送，日志闭包的文件写入只发生在各自的消费者线程上。

use crate::events::{EventSink, UiEvent};
use kia_driver::{Timestamped, TimestampedJsonLogger};
use kia_protocol::{KiaControlCommand, SteeringAngle, Velocity};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// 平均车速文本
pub fn format_velocity(velocity: &Velocity) -> String {
    format!("{:.1} km/h", velocity.average_kmph())
}

/// 力矩偏置文本
pub fn format_torque(command: &KiaControlCommand) -> String {
    command.steering_torque_offset.to_string()
}

/// 转向角直通
pub fn steering_angle(events: EventSink) -> impl FnMut(&Timestamped<SteeringAngle>) + Send + 'static {
    move |sample| {
        events.emit(UiEvent::SteeringAngleChanged(sample.value().angle_deci_degrees));
    }
}

/// 四轮平均车速
pub fn velocity(events: EventSink) -> impl FnMut(&Timestamped<Velocity>) + Send + 'static {
    move |sample| {
        events.emit(UiEvent::VelocityChanged(format_velocity(sample.value())));
    }
}

/// 最近命令的力矩偏置
pub fn steering_torque(events: EventSink) -> impl FnMut(&Timestamped<KiaControlCommand>) + Send + 'static {
    move |sample| {
        events.emit(UiEvent::SteeringTorqueChanged(format_torque(sample.value())));
    }
}

/// 把样本写入结构化日志
///
/// 日志由闭包独占，消费者线程退出时随闭包一起析构并写入文档结尾。
/// 写入失败只告警并计数。
pub fn structured_log<T>(
    mut logger: TimestampedJsonLogger<T>,
    failures: Arc<AtomicU64>,
) -> impl FnMut(&Timestamped<T>) + Send + 'static
where
    T: Serialize + Send + 'static,
{
    move |sample| {
        if let Err(e) = logger.append(sample) {
            let count = failures.fetch_add(1, Ordering::Relaxed) + 1;
            // 持续失败（如磁盘满）时避免刷屏
            if count.is_power_of_two() {
                warn!("Failed to write {}: {} ({} failures)", logger.path().display(), e, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[test]
    fn test_format_velocity_one_decimal() {
        assert_eq!(format_velocity(&Velocity::new(10.0, 11.0, 12.0, 13.0)), "11.5 km/h");
        assert_eq!(format_velocity(&Velocity::default()), "0.0 km/h");
    }

    #[test]
    fn test_format_torque() {
        assert_eq!(format_torque(&KiaControlCommand::steer(-42, 0)), "-42");
    }

    #[test]
    fn test_transforms_emit_events() {
        let (sink, rx) = events::channel(8);
        let mut angle = steering_angle(sink.clone());
        let mut speed = velocity(sink.clone());
        let mut torque = steering_torque(sink);

        angle(&Timestamped::new(SteeringAngle::new(-300), 1));
        speed(&Timestamped::new(Velocity::new(20.0, 20.0, 20.0, 20.0), 2));
        torque(&Timestamped::new(KiaControlCommand::manual(7), 3));

        assert_eq!(rx.try_recv().unwrap(), UiEvent::SteeringAngleChanged(-300));
        assert_eq!(rx.try_recv().unwrap(), UiEvent::VelocityChanged("20.0 km/h".into()));
        assert_eq!(rx.try_recv().unwrap(), UiEvent::SteeringTorqueChanged("7".into()));
    }

    #[test]
    fn test_structured_log_closes_document_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TimestampedJsonLogger::create(dir.path(), "steering_angles", "t").unwrap();
        let path = logger.path().to_path_buf();
        let failures = Arc::new(AtomicU64::new(0));

        let mut log = structured_log(logger, failures.clone());
        log(&Timestamped::new(SteeringAngle::new(5), 10));
        log(&Timestamped::new(SteeringAngle::new(6), 20));
        drop(log);

        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc["steering_angles"].as_array().unwrap().len(), 2);
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }
}
