//! Ports - 外部コラボレータとの境界
//!
//! - **EntryPoint**: worker context が実行するコード
//! - **ModuleLoader**: locator から EntryPoint を解決する（モジュールローダ）
//!
//! 解決・ロードの仕組みそのものはこのクレートの外側の責務。
//! 開発・テスト用の実装は `impls` にある。

pub mod entry_point;
pub mod module_loader;

pub use self::entry_point::EntryPoint;
pub use self::module_loader::{Locator, ModuleLoader};
