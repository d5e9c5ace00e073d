//! 数据模型模块

// 审核相关模型
pub mod ban;
pub mod report;

// 通知模型
pub mod notification;

// 公会模型
pub mod guild;

// 重新导出常用类型
pub use ban::*;
pub use guild::*;
pub use notification::*;
pub use report::*;
