//! The process-wide store and test overrides on top of it.

use std::fs;
use std::sync::OnceLock;

use flagkit::testing::{FlagOverride, override_flags};
use flagkit::{ConfigFormat, FlagsConfig, FlagsError, Variation};
use tempfile::TempDir;

const DOCUMENT: &str = r#"[
    {"name": "Dark Mode", "enabled": true},
    {"name": "Checkout", "test-variations": ["A", "B"], "test-variation-assignment": 10,
     "labels": ["Buy now", "Purchase"]},
    {"name": "Onboarding", "test-variations": ["Enabled", "Disabled"], "test-variation-assignment": 10}
]"#;

static FLAGS_DIR: OnceLock<TempDir> = OnceLock::new();

fn ensure_initialized() {
    let dir = FLAGS_DIR.get_or_init(|| {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote");
        fs::create_dir_all(&remote).unwrap();
        fs::write(remote.join("Features.json"), DOCUMENT).unwrap();
        temp
    });
    let config = FlagsConfig::from_directory(dir.path(), ConfigFormat::Json);
    match flagkit::init_with(config) {
        Ok(()) | Err(FlagsError::AlreadyInitialized) => {}
        Err(e) => panic!("init failed: {e}"),
    }
}

#[test]
fn test_second_init_fails() {
    ensure_initialized();
    let config = FlagsConfig::from_directory(FLAGS_DIR.get().unwrap().path(), ConfigFormat::Json);
    assert!(matches!(
        flagkit::init_with(config),
        Err(FlagsError::AlreadyInitialized)
    ));
}

#[test]
fn test_global_queries() {
    ensure_initialized();
    assert!(flagkit::is_enabled("Dark Mode"));
    assert!(!flagkit::is_enabled("Missing"));
    assert_eq!(flagkit::test_variation("Checkout"), Some(Variation::a()));
    assert!(flagkit::is_test_variation("Checkout", &Variation::a()));
    assert_eq!(flagkit::current_label("Checkout").as_deref(), Some("Buy now"));
    assert_eq!(
        flagkit::label("Checkout", &Variation::b()).as_deref(),
        Some("Purchase")
    );
    assert!(!flagkit::is_unlocked("Dark Mode"));
}

#[test]
fn test_override_flags_restores_on_drop() {
    ensure_initialized();
    {
        let _guard = override_flags(&[
            ("Dark Mode", FlagOverride::Enabled(false)),
            ("Checkout", FlagOverride::Variation(Variation::b())),
            ("Onboarding", FlagOverride::Enabled(false)),
        ])
        .unwrap();
        assert!(!flagkit::is_enabled("Dark Mode"));
        assert_eq!(flagkit::test_variation("Checkout"), Some(Variation::b()));
        assert_eq!(flagkit::current_label("Checkout").as_deref(), Some("Purchase"));
        assert!(!flagkit::is_enabled("Onboarding"));
    }
    assert!(flagkit::is_enabled("Dark Mode"));
    assert_eq!(flagkit::test_variation("Checkout"), Some(Variation::a()));
    assert!(flagkit::is_enabled("Onboarding"));
}

#[test]
fn test_override_flags_rejects_unknown_flag() {
    ensure_initialized();
    let result = override_flags(&[("Missing", FlagOverride::Enabled(true))]);
    assert!(matches!(result, Err(FlagsError::UnknownFlag(_))));
}

#[test]
fn test_override_flags_rejects_unknown_variation() {
    ensure_initialized();
    let result = override_flags(&[("Checkout", FlagOverride::Variation(Variation::c()))]);
    assert!(matches!(result, Err(FlagsError::UnknownVariation { .. })));
}

#[test]
fn test_rejected_overrides_apply_nothing() {
    ensure_initialized();
    let result = override_flags(&[
        ("Dark Mode", FlagOverride::Enabled(false)),
        ("Missing", FlagOverride::Enabled(true)),
    ]);
    assert!(result.is_err());
    assert!(flagkit::is_enabled("Dark Mode"));
}
