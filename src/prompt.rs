//! Console input

use crate::{CrError, ErrorStage};
use dialoguer::Input;

/// Shows `text` and reads one line from the user
///
/// An empty answer is returned as an empty string.
pub fn prompt(text: &str) -> Result<String, CrError> {
    Input::<String>::new()
        .with_prompt(text)
        .allow_empty(true)
        .interact_text()
        .map_err(|e| CrError::new(ErrorStage::Prompt, e))
}
