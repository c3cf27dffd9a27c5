//! Prompt composition for a session.

/// Separator placed between the instructions file and the task prompt.
pub const INSTRUCTIONS_SEPARATOR: &str = "\n\n---\n\n";

/// Prepend instructions (if any) to the task prompt.
pub fn compose_prompt(instructions: Option<&str>, prompt: &str) -> String {
    match instructions {
        Some(instructions) => format!("{instructions}{INSTRUCTIONS_SEPARATOR}{prompt}"),
        None => prompt.to_string(),
    }
}
