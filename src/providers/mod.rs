//! LSP feature providers (diagnostics, code actions)

pub mod code_actions;
pub mod diagnostics;
