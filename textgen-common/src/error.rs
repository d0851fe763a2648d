//! Error classification shared by the textgen crates

use std::fmt::Debug;

/// Who is at fault for an error, which decides how it is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad request, unknown name, busy session
    User,
    /// Filesystem or other environment failure
    System,
    /// Broken invariant inside the engine
    Internal,
    /// The model runtime failed
    External,
}

/// Implemented by every error enum in the workspace.
///
/// The HTTP layer maps the category to a status code and sends the error
/// code as a stable machine-readable identifier.
pub trait TextgenError: std::error::Error + Send + Sync + Debug {
    fn category(&self) -> ErrorCategory;

    /// Upper-case identifier such as `SESSION_BUSY`.
    fn error_code(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum PresetError {
        #[error("preset {0} not found")]
        Missing(String),
        #[error("presets directory unreadable")]
        Unreadable,
    }

    impl TextgenError for PresetError {
        fn category(&self) -> ErrorCategory {
            match self {
                PresetError::Missing(_) => ErrorCategory::User,
                PresetError::Unreadable => ErrorCategory::System,
            }
        }

        fn error_code(&self) -> &'static str {
            match self {
                PresetError::Missing(_) => "PRESET_MISSING",
                PresetError::Unreadable => "PRESET_UNREADABLE",
            }
        }
    }

    #[test]
    fn test_errors_are_usable_as_trait_objects() {
        let errors: Vec<Box<dyn TextgenError>> = vec![
            Box::new(PresetError::Missing("Pygmalion".into())),
            Box::new(PresetError::Unreadable),
        ];
        let summary: Vec<_> = errors
            .iter()
            .map(|e| (e.category(), e.error_code(), e.to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    ErrorCategory::User,
                    "PRESET_MISSING",
                    "preset Pygmalion not found".to_string()
                ),
                (
                    ErrorCategory::System,
                    "PRESET_UNREADABLE",
                    "presets directory unreadable".to_string()
                ),
            ]
        );
    }
}
