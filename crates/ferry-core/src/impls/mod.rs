//! Impls - ports の実装（開発用・テスト用）
//!
//! - **ModuleRegistry**: locator → EntryPoint の in-memory ローダ
//! - **EntryFn**: クロージャを EntryPoint として使うためのアダプタ

pub mod entry_fn;
pub mod module_registry;

pub use self::entry_fn::EntryFn;
pub use self::module_registry::ModuleRegistry;
