//! # 头像裁剪上传工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  命令行 (clap)                            │
//! │                                                          │
//! │  upload ── export ── init-config                         │
//! │       │  (统一错误处理 Result<T, AppError>)               │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↓
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓            库 (Rust)                             │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ settings ─── JSON 设置文件 + 环境变量覆盖             │
//! │  │                                                       │
//! │  └─ avatar ───── AvatarService                           │
//! │      ├─ session       加载·裁剪·预览·导出                 │
//! │      ├─ orchestrator  编码 → 上传 → 关联 → 回读           │
//! │      ├─ backend       reqwest HTTP 接口                   │
//! │      └─ store         当前用户资料 + 订阅                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，命令行入口的返回类型 |
//! | [`settings`] | 设置文件的读取、写出与环境变量覆盖 |
//! | [`avatar`] | 图片加载、裁剪栅格化、PNG 编码、三步上传协议与资料状态 |

pub mod avatar;
pub mod error;
pub mod settings;
