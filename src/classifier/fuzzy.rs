//! Text normalisation and fuzzy phrase matching.

/// How a phrase matched the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Transcript and phrase are identical.
    Exact,
    /// Within the edit-distance tolerance.
    Fuzzy(usize),
    /// A short phrase appears inside a longer transcript.
    Contained,
}

/// Best phrase match found in a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatch {
    /// The matching phrase, as stored in the table.
    pub phrase: String,
    /// How it matched.
    pub kind: MatchKind,
}

/// Phrases of at most this many characters may match as a substring.
pub const MAX_CONTAINED_PHRASE_LEN: usize = 4;

/// Lowercase, turn hyphens and underscores into spaces, drop punctuation
/// (apostrophes survive) and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' {
            cleaned.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            cleaned.push(' ');
        } else if is_combining_mark(c) {
            // Devanagari and Arabic vowel signs are not alphanumeric.
            cleaned.push(c);
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F   // combining diacritics
        | 0x0610..=0x061A // arabic signs
        | 0x064B..=0x065F // arabic harakat
        | 0x0900..=0x0903 // devanagari signs
        | 0x093A..=0x094F
        | 0x0951..=0x0957
        | 0x0962..=0x0963
        | 0x3099..=0x309A // kana voicing marks
    )
}

/// Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit-distance tolerance for a phrase of `phrase_len` characters.
///
/// `max(1, min(max_distance, floor(len / 3)))`. Very short phrases still get a
/// tolerance of one.
pub fn tolerance(phrase_len: usize, max_distance: usize) -> usize {
    (phrase_len / 3).min(max_distance).max(1)
}

/// Find the best match for an already-normalised transcript.
///
/// Exact matches win, then the smallest edit distance (first phrase on ties),
/// then short phrases contained in the transcript.
pub fn best_match<'a, I>(transcript: &str, phrases: I, max_distance: usize) -> Option<PhraseMatch>
where
    I: IntoIterator<Item = &'a String>,
{
    if transcript.is_empty() {
        return None;
    }

    let mut best_fuzzy: Option<(usize, &String)> = None;
    let mut contained: Option<&String> = None;

    for phrase in phrases {
        if phrase.is_empty() {
            continue;
        }
        if phrase == transcript {
            return Some(PhraseMatch {
                phrase: phrase.clone(),
                kind: MatchKind::Exact,
            });
        }

        let len = phrase.chars().count();
        let distance = levenshtein(transcript, phrase);
        if distance <= tolerance(len, max_distance)
            && best_fuzzy.is_none_or(|(best, _)| distance < best)
        {
            best_fuzzy = Some((distance, phrase));
        }

        if contained.is_none() && len <= MAX_CONTAINED_PHRASE_LEN && contains_phrase(transcript, phrase) {
            contained = Some(phrase);
        }
    }

    if let Some((distance, phrase)) = best_fuzzy {
        return Some(PhraseMatch {
            phrase: phrase.clone(),
            kind: MatchKind::Fuzzy(distance),
        });
    }

    contained.map(|phrase| PhraseMatch {
        phrase: phrase.clone(),
        kind: MatchKind::Contained,
    })
}

/// Substring test that respects word boundaries for space-delimited scripts.
///
/// Phrases written in Han or kana match anywhere, since those scripts do not
/// separate words with spaces.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let (Some(first), Some(last)) = (phrase.chars().next(), phrase.chars().last()) else {
        return false;
    };

    for (start, _) in text.match_indices(phrase) {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();

        let left_ok = is_unspaced_script(first) || before.is_none_or(|c| !c.is_alphanumeric());
        let right_ok = is_unspaced_script(last) || after.is_none_or(|c| !c.is_alphanumeric());
        if left_ok && right_ok {
            return true;
        }
    }
    false
}

fn is_unspaced_script(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF   // hiragana, katakana
        | 0x3400..=0x4DBF // CJK extension A
        | 0x4E00..=0x9FFF // CJK unified ideographs
    )
}
