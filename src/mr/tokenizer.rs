//! Turns raw text into the word tokens fed to the map phase

use std::{borrow::Cow, collections::HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// The atomic unit of work of the map phase
pub type Token = String;

/// ASCII punctuation, `!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~`
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[[:punct:]]").expect("punctuation pattern is valid"));

/// Strips punctuation, splits on whitespace and optionally keeps only `allowed` words
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer<'a> {
    allowed: Option<&'a HashSet<String>>,
    case_fold: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the output to this vocabulary. An empty set filters out everything.
    pub fn with_vocabulary(mut self, allowed: Option<&'a HashSet<String>>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Lowercase every token before the vocabulary check
    pub fn with_case_fold(mut self, case_fold: bool) -> Self {
        self.case_fold = case_fold;
        self
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        // With case folding the vocabulary is folded too, so `The` still admits `the`
        let allowed: Option<Cow<'_, HashSet<String>>> = self.allowed.map(|allowed| {
            if self.case_fold {
                Cow::Owned(allowed.iter().map(|w| w.to_lowercase()).collect())
            } else {
                Cow::Borrowed(allowed)
            }
        });

        let stripped = PUNCTUATION.replace_all(text, "");
        stripped
            .split_whitespace()
            .map(|word| {
                if self.case_fold {
                    word.to_lowercase()
                } else {
                    word.to_string()
                }
            })
            .filter(|word| allowed.as_ref().map_or(true, |allowed| allowed.contains(word)))
            .collect()
    }
}

/// Tokenizes `text` with punctuation stripped and case preserved
pub fn tokenize(text: &str, allowed: Option<&HashSet<String>>) -> Vec<Token> {
    Tokenizer::new().with_vocabulary(allowed).tokenize(text)
}
