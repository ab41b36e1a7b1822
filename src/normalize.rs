//! Text normalization before classification.
//!
//! Raw email text is reduced to lowercase base forms of its content words:
//! Unicode word segmentation, alphabetic tokens only, Portuguese stopwords
//! dropped, each remaining word reduced by a [`Lemmatizer`].
//!
//! The default [`PortugueseStemmer`] approximates lemmatization with the
//! Snowball stemmer: `relatórios` becomes `relatóri`, not the dictionary
//! form `relatório`. Inflections of a word still collapse to one token, which
//! is what the classifier and the cache key need. A dictionary lemmatizer can
//! be plugged in through the trait.

use std::collections::HashSet;

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum characters of input considered by the pipeline.
pub const MAX_TEXT_CHARS: usize = 50_000;

/// Reduces a word to its base form and recognizes stopwords.
pub trait Lemmatizer: Send + Sync {
    /// Base form of a lowercase word.
    fn lemma(&self, word: &str) -> String;

    /// Whether a lowercase word carries no content.
    fn is_stopword(&self, word: &str) -> bool;
}

/// Portuguese stopwords (articles, prepositions, pronouns, auxiliaries).
const PORTUGUESE_STOPWORDS: &[&str] = &[
    "a", "à", "ao", "aos", "aquela", "aquelas", "aquele", "aqueles", "aquilo", "as", "às", "até",
    "com", "como", "da", "das", "de", "dela", "delas", "dele", "deles", "depois", "do", "dos",
    "e", "é", "ela", "elas", "ele", "eles", "em", "entre", "era", "eram", "essa", "essas", "esse",
    "esses", "esta", "está", "estamos", "estão", "estas", "estava", "estavam", "este", "esteja",
    "estes", "estou", "eu", "foi", "fomos", "for", "foram", "fosse", "fossem", "há", "isso",
    "isto", "já", "lhe", "lhes", "mais", "mas", "me", "mesmo", "meu", "meus", "minha", "minhas",
    "muito", "na", "nas", "não", "nem", "no", "nos", "nós", "nossa", "nossas", "nosso", "nossos",
    "num", "numa", "o", "os", "ou", "para", "pela", "pelas", "pelo", "pelos", "por", "qual",
    "quando", "que", "quem", "se", "seja", "sejam", "sem", "ser", "será", "seu", "seus", "só",
    "sua", "suas", "também", "te", "tem", "têm", "temos", "tenho", "ter", "teu", "teus", "tu",
    "tua", "tuas", "um", "uma", "umas", "uns", "você", "vocês", "vos",
];

/// Snowball Portuguese stemmer with a fixed stopword list.
pub struct PortugueseStemmer {
    stemmer: Stemmer,
    stopwords: HashSet<&'static str>,
}

impl PortugueseStemmer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Portuguese),
            stopwords: PORTUGUESE_STOPWORDS.iter().copied().collect(),
        }
    }
}

impl Default for PortugueseStemmer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lemmatizer for PortugueseStemmer {
    fn lemma(&self, word: &str) -> String {
        self.stemmer.stem(word).into_owned()
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }
}

/// Turns raw text into the token sequence sent to the classifier.
pub struct Normalizer {
    lemmatizer: Box<dyn Lemmatizer>,
}

impl Normalizer {
    pub fn new(lemmatizer: Box<dyn Lemmatizer>) -> Self {
        Self { lemmatizer }
    }

    /// Normalizer backed by [`PortugueseStemmer`].
    pub fn portuguese() -> Self {
        Self::new(Box::new(PortugueseStemmer::new()))
    }

    /// Normalize `text`, considering at most [`MAX_TEXT_CHARS`] characters.
    ///
    /// Returns an empty string when nothing classifiable remains.
    pub fn normalize(&self, text: &str) -> String {
        truncate_chars(text, MAX_TEXT_CHARS)
            .unicode_words()
            .map(str::to_lowercase)
            .filter(|word| word.chars().all(char::is_alphabetic))
            .filter(|word| !self.lemmatizer.is_stopword(word))
            .map(|word| self.lemmatizer.lemma(&word))
            .filter(|lemma| !lemma.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::portuguese()
    }
}

/// First `max` characters of `text` (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
