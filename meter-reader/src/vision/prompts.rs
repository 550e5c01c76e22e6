//! Instructions sent to the vision model alongside each meter photo.

/// Token the model is told to answer with when no reading can be made out.
///
/// The pipeline also reports this token for every local or remote failure.
pub const UNREADABLE: &str = "Unreadable";

/// Fixed instruction for electricity meter photos.
///
/// Asks for the large digits of the main display only (5 to 8 of them),
/// ignoring smaller decimal digits, and for nothing but the digits or
/// [`UNREADABLE`] in the answer.
pub const METER_READING_PROMPT: &str = "Read the electricity meter in this photo. \
Look at the main rectangular display, usually in the upper half of the image. \
The reading is the number shown in the large digits and is 5 to 8 digits long. \
Ignore smaller digits such as those after a decimal point or in a separate sub-register. \
If you cannot identify the reading with confidence, answer with \"Unreadable\". \
Answer with only the digits of the reading or \"Unreadable\", with no other text.";

/// Resolve the instruction to use: a non-blank override, or the built-in prompt.
///
/// # Example
/// ```
/// use meter_reader::vision::prompts::{meter_reading_prompt, METER_READING_PROMPT};
///
/// assert_eq!(meter_reading_prompt(None), METER_READING_PROMPT);
/// assert_eq!(meter_reading_prompt(Some("   ")), METER_READING_PROMPT);
/// assert_eq!(meter_reading_prompt(Some("Digits only.")), "Digits only.");
/// ```
pub fn meter_reading_prompt(custom: Option<&str>) -> &str {
    match custom.map(str::trim) {
        Some(prompt) if !prompt.is_empty() => prompt,
        _ => METER_READING_PROMPT,
    }
}
