//! URL slug variants for lyric page lookup.
//!
//! Every name gets two slug forms:
//!
//! - **word-interior**: punctuation is trimmed from the edges of each
//!   whitespace token (single-character punctuation tokens vanish), and
//!   whatever punctuation is left inside a token becomes a dash.
//!   `"P!nk"` → `"P-nk"`, `"(Live)"` → `"Live"`.
//! - **strip**: all punctuation is removed outright. `"P!nk"` → `"Pnk"`.
//!
//! Both forms then turn whitespace into dashes, collapse dash runs and trim
//! dashes from the ends. Character handling is a small ordered rule table
//! evaluated once per character.

use any_ascii::any_ascii;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// RULE TABLES
// ============================================================================

/// What a rule does with a matching character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugAction {
    Keep,
    Drop,
    /// Emit a dash, merged with any dash already at the end of the output.
    Separator,
}

/// One row of a rule table. The first rule whose predicate matches wins;
/// characters no rule matches are kept.
#[derive(Clone, Copy)]
pub struct SlugRule {
    pub matches: fn(char) -> bool,
    pub action: SlugAction,
}

/// Typographic characters treated like ASCII punctuation.
const TYPOGRAPHIC_PUNCTUATION: [char; 14] = [
    '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', // curly quotes
    '\u{2013}', '\u{2014}', // en/em dash
    '\u{2026}', // ellipsis
    '\u{00AB}', '\u{00BB}', // guillemets
    '\u{00A1}', '\u{00BF}', // inverted ! and ?
    '\u{00B7}', '\u{2022}', // middle dot, bullet
    '\u{00B4}', // acute accent
];

/// ASCII punctuation or one of the typographic marks above.
pub fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || TYPOGRAPHIC_PUNCTUATION.contains(&c)
}

fn is_space(c: char) -> bool {
    c.is_whitespace()
}

/// Rules for the strip form.
pub static STRIP_RULES: [SlugRule; 2] = [
    SlugRule { matches: is_space, action: SlugAction::Separator },
    SlugRule { matches: is_punctuation, action: SlugAction::Drop },
];

/// Rules applied after edge trimming for the word-interior form.
pub static WORD_INTERIOR_RULES: [SlugRule; 2] = [
    SlugRule { matches: is_space, action: SlugAction::Separator },
    SlugRule { matches: is_punctuation, action: SlugAction::Separator },
];

/// Single pass over `text` with `rules`. The result never contains `--` and
/// never starts or ends with a dash.
pub fn apply_rules(text: &str, rules: &[SlugRule]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let action = rules
            .iter()
            .find(|rule| (rule.matches)(c))
            .map(|rule| rule.action)
            .unwrap_or(SlugAction::Keep);
        match action {
            SlugAction::Keep => out.push(c),
            SlugAction::Drop => {}
            SlugAction::Separator => {
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Trims one punctuation character from each end of a token. A token that is
/// a single punctuation character disappears.
fn trim_token_edges(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() == 1 {
        return if is_punctuation(chars[0]) {
            String::new()
        } else {
            token.to_string()
        };
    }
    let start = usize::from(chars.first().is_some_and(|c| is_punctuation(*c)));
    let end = chars.len() - usize::from(chars.last().is_some_and(|c| is_punctuation(*c)));
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

// ============================================================================
// ASCII FOLDING
// ============================================================================

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strips diacritics, then transliterates what is left. Case is preserved.
/// "Beyoncé" → "Beyonce", "Кино" → "Kino".
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped)
}

// ============================================================================
// GENERATOR
// ============================================================================

/// The two slug forms of one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugForms {
    pub word_interior: String,
    pub strip: String,
}

impl SlugForms {
    /// Whether the two forms give different slugs.
    pub fn differ(&self) -> bool {
        self.word_interior != self.strip
    }
}

/// (artist slug, track slug) pair for one candidate page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugCandidate {
    pub artist: String,
    pub track: String,
}

/// Pure slug generator; holds no state between calls.
#[derive(Debug, Clone, Copy)]
pub struct SlugVariantGenerator {
    fold_ascii: bool,
}

impl Default for SlugVariantGenerator {
    fn default() -> Self {
        Self { fold_ascii: true }
    }
}

impl SlugVariantGenerator {
    /// Generator that folds to ASCII first when `fold_ascii` is set.
    pub fn new(fold_ascii: bool) -> Self {
        Self { fold_ascii }
    }

    /// Word-interior and strip slugs of one name.
    pub fn forms(&self, raw: &str) -> SlugForms {
        let text = if self.fold_ascii {
            fold_to_ascii(raw)
        } else {
            raw.to_string()
        };

        let trimmed_tokens: Vec<String> = text
            .split_whitespace()
            .map(trim_token_edges)
            .filter(|token| !token.is_empty())
            .collect();

        SlugForms {
            word_interior: apply_rules(&trimmed_tokens.join(" "), &WORD_INTERIOR_RULES),
            strip: apply_rules(&text, &STRIP_RULES),
        }
    }

    /// Distinct slug forms in priority order (word-interior first).
    pub fn variants(&self, raw: &str) -> Vec<String> {
        let forms = self.forms(raw);
        let mut out = vec![forms.word_interior.clone()];
        if forms.differ() {
            out.push(forms.strip);
        }
        out
    }

    /// Candidate pages in lookup order:
    /// (artist word-interior, track strip), (artist word-interior, track
    /// word-interior), (artist strip, track strip), (artist strip, track
    /// word-interior). Combinations that would repeat an earlier one, or that
    /// contain an empty slug, are left out.
    pub fn candidates(&self, artist: &str, track: &str) -> Vec<SlugCandidate> {
        let a = self.forms(artist);
        let t = self.forms(track);

        let mut pairs = vec![(&a.word_interior, &t.strip)];
        if t.differ() {
            pairs.push((&a.word_interior, &t.word_interior));
        }
        if a.differ() {
            pairs.push((&a.strip, &t.strip));
        }
        if a.differ() && t.differ() {
            pairs.push((&a.strip, &t.word_interior));
        }

        pairs
            .into_iter()
            .filter(|(artist, track)| !artist.is_empty() && !track.is_empty())
            .map(|(artist, track)| SlugCandidate {
                artist: artist.clone(),
                track: track.clone(),
            })
            .collect()
    }
}
