//! Filtered-app classification
//!
//! Decides whether an app's usage is "filtered" per the configured app list
//! and assigns its output label. Filtered apps are never dropped from the
//! record set; they are labeled distinctly so consumers can include or
//! exclude them at analysis time.

use crate::config::FilterConfig;
use tracing::warn;

/// Label assigned to filtered-app sessions
pub const FILTERED_LABEL: &str = "filtered";

/// Classification of one app against the filter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppClass {
    pub is_filtered: bool,
    pub label: String,
}

/// Classify an app package against the configured filter list.
///
/// Pure function of its inputs: exact, case-sensitive package matching;
/// unknown packages are not filtered. When a filtered package's recorded
/// label is not among the expected labels a warning diagnostic is emitted,
/// but classification proceeds on the package identity alone.
pub fn classify(app_package: &str, app_label: Option<&str>, config: &FilterConfig) -> AppClass {
    match config.filtered_apps.get(app_package) {
        Some(expected) => {
            if let Some(label) = app_label {
                let matches = expected.split(',').any(|candidate| candidate.trim() == label);
                if !matches {
                    warn!(
                        app_package,
                        app_label = label,
                        expected,
                        "app label does not match expected labels for filtered package"
                    );
                }
            }
            AppClass {
                is_filtered: true,
                label: FILTERED_LABEL.to_string(),
            }
        }
        None => AppClass {
            is_filtered: false,
            label: app_label.unwrap_or(app_package).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with_filters() -> FilterConfig {
        FilterConfig {
            filtered_apps: BTreeMap::from([
                ("com.android.settings".to_string(), "Settings".to_string()),
                (
                    "com.sec.android.app.launcher".to_string(),
                    "One UI Home, Samsung Experience Home".to_string(),
                ),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_filtered_app_gets_filtered_label() {
        let class = classify("com.android.settings", Some("Settings"), &config_with_filters());
        assert!(class.is_filtered);
        assert_eq!(class.label, FILTERED_LABEL);
    }

    #[test]
    fn test_unknown_package_defaults_to_not_filtered() {
        let class = classify("com.instagram.android", Some("Instagram"), &config_with_filters());
        assert!(!class.is_filtered);
        assert_eq!(class.label, "Instagram");
    }

    #[test]
    fn test_missing_label_falls_back_to_package() {
        let class = classify("com.instagram.android", None, &config_with_filters());
        assert_eq!(class.label, "com.instagram.android");
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let class = classify("com.Android.Settings", Some("Settings"), &config_with_filters());
        assert!(!class.is_filtered);
    }

    #[test]
    fn test_comma_separated_expected_labels_accepted() {
        // Either expected label is fine; classification rests on the package
        let class = classify(
            "com.sec.android.app.launcher",
            Some("Samsung Experience Home"),
            &config_with_filters(),
        );
        assert!(class.is_filtered);
    }

    #[test]
    fn test_label_mismatch_still_filters() {
        let class = classify(
            "com.android.settings",
            Some("Einstellungen"),
            &config_with_filters(),
        );
        assert!(class.is_filtered);
        assert_eq!(class.label, FILTERED_LABEL);
    }
}
