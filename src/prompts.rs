//! Prompt templates for photo-to-coloring-page generation.
//!
//! The model receives one text part built here plus the cropped photo as an
//! inline image. Callers can replace the base instruction via
//! [`crate::config::ColoringConfig::system_prompt`]; the style, difficulty
//! and notes sections are always appended.

use crate::config::{Difficulty, Style};

/// Base instruction shared by first conversion and regeneration.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a coloring book image generator. Your task is to convert the user's photo into a coloring book page based on the specified style and difficulty.
The output must be a single PNG image. The output MUST be a coloring book version of the provided photo. Do NOT change the subject matter."#;

const OUTLINE_RULES: &str = r#"Style:
- Convert the image into a classic coloring book page with only black and white.
- The result should be a black and white line drawing with clear, bold outlines and absolutely no color or shading. The image must contain only black lines on a white background."#;

const REALISTIC_RULES: &str = r#"Style:
- Convert the image into a realistic, grayscale coloring book page. The image must be grayscale with no color.
- Preserve shading and detail to create an image that looks like a photograph, but is suitable for coloring."#;

/// Style section for the given style.
pub fn style_rules(style: Style) -> &'static str {
    match style {
        Style::Outline => OUTLINE_RULES,
        Style::Realistic => REALISTIC_RULES,
    }
}

/// Difficulty section.
pub fn difficulty_rules(difficulty: Difficulty) -> String {
    format!(
        "Difficulty:\n- The user has specified the difficulty as '{}'.\n- Adjust the level of detail in the final image to match this difficulty.",
        difficulty.prompt_description()
    )
}

/// Notes section for regeneration. Returns None for absent or blank notes.
pub fn notes_rules(notes: Option<&str>) -> Option<String> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty())?;
    Some(format!(
        "User Notes:\n- The user has provided the following notes to guide the regeneration: \"{notes}\"\n- Pay close attention to these notes and incorporate them into your output."
    ))
}

/// Assemble the full text prompt.
pub fn build_prompt(
    base: Option<&str>,
    style: Style,
    difficulty: Difficulty,
    notes: Option<&str>,
) -> String {
    let mut sections = vec![
        base.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
        style_rules(style).to_string(),
        difficulty_rules(difficulty),
    ];
    if let Some(n) = notes_rules(notes) {
        sections.push(n);
    }
    sections.join("\n\n")
}
