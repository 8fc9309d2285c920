//! Code actions provider for installing companion declaration packages

use tower_lsp::lsp_types::*;

use crate::install::{InstallArguments, is_plausible_package_name};
use crate::providers::diagnostics::NO_TYPES_CODE;
use crate::resolver::companion_package_name;
use crate::utils::text_in_range;

/// Command executed by the install quick fix
pub const INSTALL_TYPES_COMMAND: &str = "types-installer.installTypesModule";

/// Create install actions for every missing-types diagnostic of a document.
///
/// The selection is not consulted: all matching diagnostics are offered.
/// The package name is read from `content` at each diagnostic's range, so
/// edits made after the diagnostic was published are honored.
pub fn create_code_actions(
    uri: &Url,
    diagnostics: &[Diagnostic],
    content: &str,
) -> Vec<CodeActionOrCommand> {
    diagnostics
        .iter()
        .filter(|diag| is_missing_types(diag))
        .filter_map(|diag| create_install_action(uri, diag, content))
        .collect()
}

fn is_missing_types(diagnostic: &Diagnostic) -> bool {
    matches!(&diagnostic.code, Some(NumberOrString::String(code)) if code == NO_TYPES_CODE)
}

/// Create an "Install @types/x module..." action for a diagnostic
fn create_install_action(
    uri: &Url,
    diagnostic: &Diagnostic,
    content: &str,
) -> Option<CodeActionOrCommand> {
    let Some(package) = text_in_range(content, diagnostic.range) else {
        tracing::debug!("Diagnostic range {:?} no longer exists in {}", diagnostic.range, uri);
        return None;
    };
    if !is_plausible_package_name(package) {
        tracing::debug!("Text {:?} at diagnostic range is not a package name", package);
        return None;
    }

    let companion = companion_package_name(package);
    let arguments = InstallArguments {
        uri: uri.clone(),
        range: diagnostic.range,
        package: package.to_string(),
    };
    let argument = serde_json::to_value(&arguments).ok()?;

    Some(CodeActionOrCommand::CodeAction(CodeAction {
        title: format!("Install {companion} module..."),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(vec![diagnostic.clone()]),
        edit: None,
        command: Some(Command {
            title: "Install @types Module".to_string(),
            command: INSTALL_TYPES_COMMAND.to_string(),
            arguments: Some(vec![argument]),
        }),
        is_preferred: Some(true),
        disabled: None,
        data: None,
    }))
}
