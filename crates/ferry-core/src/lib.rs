//! ferry-core
//!
//! Cross-context message passing: an owner spawns isolated workers and talks
//! to them only through copied, ordered messages.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, value, envelope, state, event）
//! - **codec**: structured clone（Value ↔ Snapshot）
//! - **channel**: 方向ごとの順序付き配送路（MessageChannel）
//! - **events**: EventTarget と Listener
//! - **dispatch**: owner 側の logical thread（listener / timer callback を直列に実行）
//! - **ports**: 抽象化レイヤー（EntryPoint, ModuleLoader）
//! - **impls**: 実装（ModuleRegistry, EntryFn）
//! - **worker**: Worker handle / WorkerScope / WorkerOptions
//! - **timers**: setTimeout / setInterval 相当
//! - **observability**: 配送カウンタ
//! - **error**: エラー型

pub mod channel;
pub mod codec;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod events;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod timers;
pub mod worker;

pub use codec::{MAX_DEPTH, Snapshot, structured_clone};
pub use dispatch::Dispatcher;
pub use domain::{Direction, Event, TimerId, Value, WorkerId, WorkerState};
pub use error::{RegistryError, SerializationError, WorkerError};
pub use events::{EventTarget, Listener, ListenerOptions};
pub use impls::{EntryFn, ModuleRegistry};
pub use ports::{EntryPoint, Locator, ModuleLoader};
pub use timers::Timers;
pub use worker::{Worker, WorkerOptions, WorkerScope};
