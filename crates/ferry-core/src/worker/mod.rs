//! Worker - owner 側の handle と worker 側の scope
//!
//! - **Worker**: spawn / post_message / event listener / terminate
//! - **WorkerScope**: worker context から見た受信・送信口
//! - **WorkerOptions**: spawn 時の設定

mod handle;
mod options;
mod scope;

pub use handle::Worker;
pub use options::WorkerOptions;
pub use scope::WorkerScope;
