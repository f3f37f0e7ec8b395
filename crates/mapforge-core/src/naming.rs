//! Artifact naming: deterministic shortening, uniqueness digests, and
//! length bounding.
//!
//! Artifact names are built from a base name plus ordered qualifier values
//! (e.g. cluster, namespace, resource). Qualifier values can be long, so
//! each piece is shortened with a pure vowel-stripping heuristic — and
//! because shortening can collapse two distinct qualifier sets to the same
//! visible text, an 8-character hex digest of the *unshortened* qualifier
//! values is appended. The digest is order-sensitive: the same qualifiers in
//! a different order produce a different suffix.
//!
//! Layout: `{base}-{qualifier...}-{digest}`. The digest always stays at the
//! tail; length enforcement and collision disambiguation both work around
//! it, never through it.

/// Base-name segments longer than this are shortened.
pub const MAX_BASE_NAME_LENGTH: usize = 15;

/// Combined length budget for the qualifier segments, split evenly across
/// qualifiers.
pub const MAX_QUALIFIERS_LENGTH: usize = 30;

/// Hex characters kept from the qualifier digest.
pub const HASH_SUFFIX_LENGTH: usize = 8;

/// Upper bound on `{workspace_prefix}--{artifact name}` as generated names
/// commonly land in DNS-label-constrained fields.
pub const MAX_TARGET_NAME_LENGTH: usize = 63;

/// Lowercase a name and replace anything outside `[a-z0-9-]` with `-`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    out
}

/// Deterministically shorten a name to at most `max_length` characters.
///
/// Names already within the limit pass through (lowercased). Longer names
/// are split into words on `-`/`_`/`.`/space separators and camel-case
/// boundaries; each word keeps its first character and drops subsequent
/// vowels; words rejoin with `-`. If the result still exceeds the limit it
/// is hard-truncated, and stray separators at the edges are stripped.
#[must_use]
pub fn shorten_name(name: &str, max_length: usize) -> String {
    if name.chars().count() <= max_length {
        return name.to_ascii_lowercase();
    }
    let words = split_words(name);
    let shortened = words
        .iter()
        .map(|word| strip_vowels(word))
        .collect::<Vec<_>>()
        .join("-");
    let truncated = truncate_chars(&shortened, max_length);
    truncated.trim_matches('-').to_string()
}

fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.' | ' ') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
        } else {
            if ch.is_uppercase() && previous_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = ch.is_lowercase();
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn strip_vowels(word: &str) -> String {
    word.chars()
        .enumerate()
        .filter(|(i, ch)| *i == 0 || !matches!(ch.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
        .map(|(_, ch)| ch.to_ascii_lowercase())
        .collect()
}

fn truncate_chars(text: &str, max_length: usize) -> String {
    text.chars().take(max_length).collect()
}

/// 8-hex-character digest over the unshortened qualifier values,
/// order-sensitive.
#[must_use]
pub fn qualifier_digest(qualifiers: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for qualifier in qualifiers {
        hasher.update(qualifier.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex()[..HASH_SUFFIX_LENGTH].to_string()
}

/// Assemble the full artifact name from a base name and qualifier values.
///
/// The caller may supply a pre-chosen shortened base name; otherwise the
/// base is shortened automatically when it exceeds
/// [`MAX_BASE_NAME_LENGTH`]. With no qualifiers the base stands alone and
/// carries no digest.
#[must_use]
pub fn make_qualified_name(
    base_name: &str,
    shortened_base_name: Option<&str>,
    qualifiers: &[String],
) -> String {
    let base = match shortened_base_name {
        Some(short) => sanitize(short),
        None => shorten_name(&sanitize(base_name), MAX_BASE_NAME_LENGTH),
    };
    if qualifiers.is_empty() {
        return base;
    }
    let per_qualifier = (MAX_QUALIFIERS_LENGTH / qualifiers.len()).max(1);
    let segments = qualifiers
        .iter()
        .map(|qualifier| shorten_name(&sanitize(qualifier), per_qualifier))
        .collect::<Vec<_>>()
        .join("-");
    format!("{base}-{segments}-{}", qualifier_digest(qualifiers))
}

/// Enforce [`MAX_TARGET_NAME_LENGTH`] on `{prefix}--{name}` (the prefix
/// joins with a two-character separator).
///
/// Excess characters are trimmed from the section ahead of the trailing
/// digest; the digest itself is never touched. Separators left dangling at
/// the trimmed edge are stripped.
#[must_use]
pub fn enforce_target_length(prefix: &str, name: &str) -> String {
    let combined = prefix.chars().count() + 2 + name.chars().count();
    if combined <= MAX_TARGET_NAME_LENGTH {
        return name.to_string();
    }
    let excess = combined - MAX_TARGET_NAME_LENGTH;
    let (stem, tail) = match name.rfind('-') {
        Some(split) => name.split_at(split),
        None => (name, ""),
    };
    let keep = stem.chars().count().saturating_sub(excess);
    let trimmed = truncate_chars(stem, keep);
    let trimmed = trimmed.trim_matches('-');
    if trimmed.is_empty() {
        tail.trim_matches('-').to_string()
    } else {
        format!("{trimmed}{tail}")
    }
}
