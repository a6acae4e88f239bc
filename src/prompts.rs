//! Instruction sent to the vision model by the remote extraction strategy.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::instruction`];
//! the constant here is used only when no override is provided.

/// Default extraction instruction.
///
/// The output feeds a handwriting renderer that draws plain lines of text,
/// so the model is asked for plain text with line breaks kept and no markup.
pub const DEFAULT_EXTRACTION_INSTRUCTION: &str = r#"Extract all text from this page image, exactly as written.

Rules:
- Keep the reading order a human would follow.
- Keep line breaks between lines and blank lines between paragraphs.
- Output plain text only: no Markdown, no code fences, no HTML.
- Do not describe images, logos or layout.
- Do not add commentary, headings or "Page X" markers.
- If the page has no text, output nothing."#;

/// Resolve the instruction for a job.
pub fn extraction_instruction(custom: Option<&str>) -> &str {
    match custom {
        Some(s) if !s.trim().is_empty() => s,
        _ => DEFAULT_EXTRACTION_INSTRUCTION,
    }
}
