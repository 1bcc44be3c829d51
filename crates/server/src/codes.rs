//! Random code generation for the device grant.
//!
//! Device codes, user codes, PKCE verifiers and `state` correlators are all drawn
//! from the OS CSPRNG. Characters are sampled uniformly from the de-duplicated
//! alphabet of the requested character classes, so combining overlapping classes
//! (e.g. `a` and `b`) does not skew the distribution.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::rngs::OsRng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

/// Length of generated PKCE verifiers (RFC 7636 allows 43..=128).
pub const PKCE_VERIFIER_LENGTH: usize = 64;
/// Length of generated `state` correlators.
pub const STATE_LENGTH: usize = 43;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CharClass {
    Lowercase,
    /// Lowercase consonants only, avoids vowels forming words.
    LowercaseUnambiguous,
    Uppercase,
    /// Uppercase consonants only, avoids vowels forming words.
    UppercaseUnambiguous,
    Digits,
    Symbols,
}

impl CharClass {
    pub fn alphabet(self) -> &'static str {
        match self {
            CharClass::Lowercase => "abcdefghijklmnopqrstuvwxyz",
            CharClass::LowercaseUnambiguous => "bcdfghjklmnpqrstvwxz",
            CharClass::Uppercase => "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharClass::UppercaseUnambiguous => "BCDFGHJKLMNPQRSTVWXZ",
            CharClass::Digits => "0123456789",
            CharClass::Symbols => "~`!@#$%^&*()_+-={}[]:\";'<>?,./|\\",
        }
    }

    fn from_flag(flag: char) -> Option<Self> {
        match flag {
            'a' => Some(CharClass::Lowercase),
            'b' => Some(CharClass::LowercaseUnambiguous),
            'A' => Some(CharClass::Uppercase),
            'B' => Some(CharClass::UppercaseUnambiguous),
            '#' => Some(CharClass::Digits),
            '!' => Some(CharClass::Symbols),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<&'static [CharClass]> {
        match name.to_ascii_lowercase().as_str() {
            "lowercase" => Some(&[CharClass::Lowercase]),
            "lowercase-no-ambiguous" => Some(&[CharClass::LowercaseUnambiguous]),
            "uppercase" => Some(&[CharClass::Uppercase]),
            "uppercase-no-ambiguous" => Some(&[CharClass::UppercaseUnambiguous]),
            "digit" | "digits" => Some(&[CharClass::Digits]),
            "symbol" | "symbols" => Some(&[CharClass::Symbols]),
            "alnum" => Some(&[CharClass::Lowercase, CharClass::Uppercase]),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeFormatError {
    #[error("unknown character class '{0}'")]
    UnknownClass(String),
    #[error("code format selects no characters")]
    Empty,
}

/// A set of character classes codes are drawn from.
///
/// Parses either the compact flag syntax (`#aA`, `#B`) or `+`-joined names
/// (`digit+uppercase-no-ambiguous`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct CodeFormat {
    alphabet: Vec<char>,
}

impl CodeFormat {
    pub fn new(classes: &[CharClass]) -> Self {
        let alphabet: BTreeSet<char> = classes
            .iter()
            .flat_map(|class| class.alphabet().chars())
            .collect();
        Self {
            alphabet: alphabet.into_iter().collect(),
        }
    }

    /// Mixed-case letters and digits; safe to put in URLs unencoded.
    pub fn alphanumeric() -> Self {
        Self::new(&[
            CharClass::Lowercase,
            CharClass::Uppercase,
            CharClass::Digits,
        ])
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Canonical form of a code typed in by a person: surrounding whitespace is
    /// dropped, and the input is upper-cased when the alphabet has no lowercase
    /// letters.
    pub fn normalize(&self, input: &str) -> String {
        let input = input.trim();
        if self.alphabet.iter().any(char::is_ascii_lowercase) {
            input.to_string()
        } else {
            input.to_ascii_uppercase()
        }
    }
}

impl FromStr for CodeFormat {
    type Err = CodeFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut classes = Vec::new();
        for token in s.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(named) = CharClass::from_name(token) {
                classes.extend_from_slice(named);
                continue;
            }
            for flag in token.chars() {
                let class = CharClass::from_flag(flag)
                    .ok_or_else(|| CodeFormatError::UnknownClass(token.to_string()))?;
                classes.push(class);
            }
        }
        if classes.is_empty() {
            return Err(CodeFormatError::Empty);
        }
        Ok(Self::new(&classes))
    }
}

impl TryFrom<String> for CodeFormat {
    type Error = CodeFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Draw `length` characters uniformly from the format's alphabet.
pub fn random_string(length: usize, format: &CodeFormat) -> String {
    let alphabet = format.alphabet();
    if alphabet.is_empty() {
        return String::new();
    }
    let mut rng = OsRng;
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

/// A PKCE verifier together with its S256 challenge.
#[derive(Clone, Debug)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = random_string(PKCE_VERIFIER_LENGTH, &CodeFormat::alphanumeric());
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// `base64url(sha256(verifier))` without padding.
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// CSRF correlator for one authorization code exchange.
pub fn generate_state() -> String {
    random_string(STATE_LENGTH, &CodeFormat::alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_syntax() {
        let format: CodeFormat = "#B".parse().unwrap();
        assert_eq!(
            format.alphabet().iter().collect::<String>(),
            "0123456789BCDFGHJKLMNPQRSTVWXZ"
        );
    }

    #[test]
    fn parses_named_syntax() {
        let named: CodeFormat = "digit+uppercase-no-ambiguous".parse().unwrap();
        let flags: CodeFormat = "#B".parse().unwrap();
        assert_eq!(named, flags);

        let alnum: CodeFormat = "alnum+digit".parse().unwrap();
        assert_eq!(alnum, CodeFormat::alphanumeric());
    }

    #[test]
    fn overlapping_classes_are_deduplicated() {
        let format: CodeFormat = "ab".parse().unwrap();
        assert_eq!(format.alphabet().len(), 26);
    }

    #[test]
    fn rejects_unknown_and_empty_formats() {
        assert_eq!(
            "#z".parse::<CodeFormat>(),
            Err(CodeFormatError::UnknownClass("#z".into()))
        );
        assert_eq!("".parse::<CodeFormat>(), Err(CodeFormatError::Empty));
    }

    #[test]
    fn normalize_upper_cases_only_case_free_alphabets() {
        let upper: CodeFormat = "#B".parse().unwrap();
        assert_eq!(upper.normalize(" bcdf2345 \n"), "BCDF2345");
        assert_eq!(upper.normalize("BcDf2345"), "BCDF2345");

        let mixed = CodeFormat::alphanumeric();
        assert_eq!(mixed.normalize(" aBc9 "), "aBc9");
    }

    #[test]
    fn random_string_respects_length_and_alphabet() {
        let format: CodeFormat = "#B".parse().unwrap();
        let code = random_string(8, &format);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| format.alphabet().contains(&c)));
    }

    #[test]
    fn random_strings_differ() {
        let format = CodeFormat::alphanumeric();
        assert_ne!(random_string(64, &format), random_string(64, &format));
    }

    #[test]
    fn s256_matches_rfc7636_example() {
        // RFC 7636 appendix B
        assert_eq!(
            s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r-wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn pkce_challenge_is_unpadded_base64url() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), PKCE_VERIFIER_LENGTH);
        assert_eq!(pkce.challenge, s256_challenge(&pkce.verifier));
        assert_eq!(pkce.challenge.len(), 43);
        assert!(
            !pkce.challenge.contains('=')
                && !pkce.challenge.contains('+')
                && !pkce.challenge.contains('/')
        );
    }

    #[test]
    fn state_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), STATE_LENGTH);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
