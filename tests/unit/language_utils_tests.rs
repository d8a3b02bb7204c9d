/*!
 * Tests for language tag utilities
 */

use docglot::language_utils::{get_language_name, language_codes_match, validate_language_code};

#[test]
fn test_validateLanguageCode_withKnownTags_shouldAccept() {
    for code in ["en", "fr", "zh-CN", "ZH-tw", "pt-BR", "deu", " ja "] {
        assert!(validate_language_code(code).is_ok(), "{} should be valid", code);
    }
}

#[test]
fn test_validateLanguageCode_withUnknownTags_shouldReject() {
    for code in ["", "   ", "xx", "english", "q1"] {
        assert!(validate_language_code(code).is_err(), "{:?} should be invalid", code);
    }
}

#[test]
fn test_getLanguageName_shouldBeCaseInsensitiveForTableEntries() {
    assert_eq!(get_language_name("ZH-cn"), "Chinese (Simplified)");
    assert_eq!(get_language_name("JA"), "Japanese");
}

#[test]
fn test_languageCodesMatch_withSurroundingWhitespace_shouldMatch() {
    assert!(language_codes_match(" fr ", "FR"));
    assert!(!language_codes_match("fr", "fr-CA"));
}
