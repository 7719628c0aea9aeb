// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Consistent error formatting for the assetd command line.
//!
//! Errors printed to the terminal carry the possible causes and a few
//! suggested fixes, so a failed `assetd fetch` can be acted on directly.

use std::fmt;

/// Printed at the end of every formatted error.
pub const HELP_HINT: &str = "Check your settings with: assetd config show";

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use assetd::error::format_error;
///
/// let error = format_error(
///     "Failed to start server",
///     &["Another assetd instance is running"],
///     &["Use a different port: assetd serve --port 62486"],
/// );
/// println!("{}", error);
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_HINT);
    output
}

/// Builder for constructing formatted error messages.
///
/// ```
/// use assetd::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Download failed")
///     .cause("The API key has expired")
///     .fix("Log in again from the add-on")
///     .build();
/// println!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(String::as_str).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(String::as_str).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
