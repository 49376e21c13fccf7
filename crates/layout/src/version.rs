//! Version ordering.
//!
//! A close relative of Maven's `ComparableVersion`, shared by every layout
//! unless a provider overrides it:
//!
//! - Versions are split into items on `.`, `-`, and digit/letter transitions.
//! - Numeric items compare numerically (arbitrary length).
//! - Known qualifiers order as
//!   `dev < alpha < beta < milestone < rc < snapshot < "" < sp`, where `ga`,
//!   `final` and `release` are equivalent to the empty qualifier. `a`, `b` and
//!   `m` directly followed by a number are short for alpha/beta/milestone.
//! - Unknown qualifiers sort after every known one, lexically.
//! - Trailing "null" items (`0`, empty qualifier) are ignored, so `1`, `1.0`
//!   and `1.0.0-ga` are all equal.
//! - A number always beats a qualifier at the same position.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(String),
    Qualifier(String),
}
impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Number(n) => n.is_empty(),
            Item::Qualifier(q) => qualifier_rank(q) == Some(NULL_RANK),
        }
    }
}

const NULL_RANK: u8 = 6;

fn qualifier_rank(q: &str) -> Option<u8> {
    Some(match q {
        "dev" => 0,
        "alpha" => 1,
        "beta" => 2,
        "milestone" => 3,
        "rc" | "cr" => 4,
        "snapshot" => 5,
        "" | "ga" | "final" | "release" => NULL_RANK,
        "sp" => 7,
        _ => return None,
    })
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    match (qualifier_rank(a), qualifier_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Compare digit strings that already had leading zeros stripped.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_items(a: &Item, b: &Item) -> Ordering {
    match (a, b) {
        (Item::Number(x), Item::Number(y)) => compare_numbers(x, y),
        (Item::Number(_), Item::Qualifier(_)) => Ordering::Greater,
        (Item::Qualifier(_), Item::Number(_)) => Ordering::Less,
        (Item::Qualifier(x), Item::Qualifier(y)) => compare_qualifiers(x, y),
    }
}

/// Compare a trailing item against "nothing at all".
fn compare_to_null(item: &Item) -> Ordering {
    match item {
        Item::Number(n) if n.is_empty() => Ordering::Equal,
        Item::Number(_) => Ordering::Greater,
        Item::Qualifier(q) => compare_qualifiers(q, ""),
    }
}

fn push_token(items: &mut Vec<Item>, token: &str, numeric: bool) {
    if numeric {
        items.push(Item::Number(token.trim_start_matches('0').to_string()));
    } else {
        items.push(Item::Qualifier(token.to_string()));
    }
}

fn tokenize(version: &str) -> Vec<Item> {
    let version = version.trim().to_lowercase();
    let mut items = Vec::new();
    let mut token = String::new();
    let mut numeric = false;
    // Whether the previous token ended on a digit/letter transition rather
    // than an explicit separator.
    let mut transition = Vec::new();
    for c in version.chars() {
        if c == '.' || c == '-' || c == '_' || c == '+' {
            push_token(&mut items, &token, numeric);
            transition.push(false);
            token.clear();
            numeric = false;
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !token.is_empty() && is_digit != numeric {
            push_token(&mut items, &token, numeric);
            transition.push(true);
            token.clear();
        }
        numeric = is_digit;
        token.push(c);
    }
    push_token(&mut items, &token, numeric);

    // Expand a1/b2/m3 short forms.
    for i in 0..items.len() {
        let followed_by_number =
            transition.get(i).copied().unwrap_or(false) && matches!(items.get(i + 1), Some(Item::Number(_)));
        if let Item::Qualifier(q) = &mut items[i]
            && followed_by_number
        {
            match q.as_str() {
                "a" => *q = "alpha".to_string(),
                "b" => *q = "beta".to_string(),
                "m" => *q = "milestone".to_string(),
                _ => {},
            }
        }
    }
    // Drop empty qualifiers produced by doubled separators, then trailing nulls.
    items.retain(|item| !matches!(item, Item::Qualifier(q) if q.is_empty()));
    while items.last().is_some_and(Item::is_null) {
        items.pop();
    }
    items
}

/// Total ordering over version strings.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use depot_layout::version::compare;
/// assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare("1.0-SNAPSHOT", "1.0"), Ordering::Less);
/// assert_eq!(compare("1.0.0", "1"), Ordering::Equal);
/// ```
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    for i in 0..left.len().max(right.len()) {
        let ordering = match (left.get(i), right.get(i)) {
            (Some(x), Some(y)) => compare_items(x, y),
            (Some(x), None) => compare_to_null(x),
            (None, Some(y)) => compare_to_null(y).reverse(),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Whether `version` is a (base) snapshot version such as `1.0-SNAPSHOT`.
#[must_use]
pub fn is_snapshot(version: &str) -> bool {
    version.len() >= SNAPSHOT.len()
        && version.is_char_boundary(version.len() - SNAPSHOT.len())
        && version[version.len() - SNAPSHOT.len()..].eq_ignore_ascii_case(SNAPSHOT)
}

pub const SNAPSHOT: &str = "SNAPSHOT";

/// Sort versions ascending and drop exact duplicates. Versions that compare
/// equal but are spelled differently (`1.0` vs `1.0.0`) are both kept.
pub fn sort_versions(versions: &mut Vec<String>, cmp: impl Fn(&str, &str) -> Ordering) {
    versions.sort_by(|a, b| cmp(a, b).then_with(|| a.cmp(b)));
    versions.dedup();
}
