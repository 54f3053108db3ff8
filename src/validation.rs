use crate::error::AppError;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_max_chars(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::Validation(format!(
            "{field} is too long ({len} characters, max {max})"
        )));
    }
    Ok(())
}

/// Validate an incoming chat message and return it trimmed.
pub fn chat_message(message: &str, max_chars: usize) -> Result<&str, AppError> {
    require_non_empty("message", message)?;
    let trimmed = message.trim();
    require_max_chars("message", trimmed, max_chars)?;
    Ok(trimmed)
}

/// Trim, lowercase and de-duplicate FAQ keywords, keeping first-seen order.
/// At least one keyword must survive.
pub fn normalize_keywords(keywords: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(keywords.len());
    for kw in keywords {
        let kw = kw.trim().to_lowercase();
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    if out.is_empty() {
        return Err(AppError::Validation("keywords must contain at least one term".into()));
    }
    Ok(out)
}
