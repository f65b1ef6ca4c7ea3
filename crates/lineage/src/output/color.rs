//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success:   green   (clean validation, read motive)
//!   - Warning:   yellow  (failures, seed warnings)
//!   - Error:     red     (anomalies, write motive in bold)
//!   - Info:      cyan    (object names, file paths)
//!   - Muted:     dimmed  (field labels, unknown motive)
//!   - Emphasis:  bold    (section headers)

use colored::Colorize;

use super::OutputConfig;
use crate::motive::Motive;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Color a motive label: writes stand out, reads are plain.
pub(crate) fn colorize_motive(motive: Motive, config: &OutputConfig) -> String {
    let text = motive.as_str();
    if !config.use_colors {
        return text.to_string();
    }
    match motive {
        Motive::Write => text.red().bold().to_string(),
        Motive::Read => text.green().to_string(),
        Motive::Unknown => text.dimmed().to_string(),
    }
}
