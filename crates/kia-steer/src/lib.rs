//! # Kia Steer
//!
//! 转向系统的协调层：把 CAN 遥测、闭环控制、结构化日志和展示事件组装在一起。
//!
//! # 示例
//!
//! ```rust,no_run
//! use kia_steer::{SteeringConfig, SteeringCoordinator, events};
//!
//! let config = SteeringConfig::default();
//! let (sink, ui_events) = events::channel(config.event_channel_capacity);
//! let mut coordinator = SteeringCoordinator::connect(config, sink)?;
//!
//! coordinator.set_target_from_input("15")?;
//! coordinator.turn_left()?;
//! while let Ok(event) = ui_events.try_recv() {
//!     println!("{:?}", event);
//! }
//! coordinator.shutdown()?;
//! # Ok::<(), kia_steer::SteerError>(())
//! ```

pub mod config;
pub mod consumers;
pub mod coordinator;
mod error;
pub mod events;

pub use config::SteeringConfig;
pub use coordinator::{CoordinatorStatus, LogPaths, SteeringCoordinator};
pub use error::SteerError;
pub use events::{EventSink, UiEvent};
