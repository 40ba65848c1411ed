//! 工作流模块
//!
//! 提供高层 API 封装完整的连接/控制流程

pub mod controller;

pub use controller::{ControllerOptions, LinkState, RobotController, RobotEvent};
