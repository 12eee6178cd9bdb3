// Key selection for decode runs.
//
// A filter sees every key before its elements are decoded and decides
// whether the record's events reach the real sink. Only string keys are
// eligible: integer-encoded keys and the absent key of a dump-form payload
// never match a pattern, though inversion can select them.

use crate::rdb::Value;

/// Decides whether a key's record is surfaced.
pub trait KeyFilter {
    fn matches(&self, key: &Value) -> bool;
}

/// Passes every key through.
pub struct AcceptAll;

impl KeyFilter for AcceptAll {
    fn matches(&self, _key: &Value) -> bool {
        true
    }
}

/// Glob matcher with `*`, `?`, bracket classes, and `\` escapes. Patterns
/// without any of those compare bytewise, skipping the glob walk.
pub struct GlobFilter {
    pattern: Vec<u8>,
    exact: bool,
    ignore_case: bool,
    invert: bool,
}

impl GlobFilter {
    pub fn new(pattern: impl Into<Vec<u8>>) -> GlobFilter {
        let pattern = pattern.into();
        let exact = !pattern
            .iter()
            .any(|b| matches!(b, b'*' | b'?' | b'[' | b'\\'));
        GlobFilter {
            pattern,
            exact,
            ignore_case: false,
            invert: false,
        }
    }

    /// Case-insensitive matching over ASCII.
    pub fn ignore_case(mut self, yes: bool) -> GlobFilter {
        self.ignore_case = yes;
        if yes {
            self.pattern.make_ascii_lowercase();
        }
        self
    }

    /// Select the keys the pattern does NOT match.
    pub fn invert(mut self, yes: bool) -> GlobFilter {
        self.invert = yes;
        self
    }

    fn hit(&self, text: &[u8]) -> bool {
        if self.exact {
            if self.ignore_case {
                self.pattern.eq_ignore_ascii_case(text)
            } else {
                self.pattern == text
            }
        } else if self.ignore_case {
            let lowered: Vec<u8> = text.iter().map(u8::to_ascii_lowercase).collect();
            glob_match(&self.pattern, &lowered)
        } else {
            glob_match(&self.pattern, text)
        }
    }
}

impl KeyFilter for GlobFilter {
    fn matches(&self, key: &Value) -> bool {
        let hit = match key.as_bytes() {
            Some(text) => self.hit(text),
            None => false,
        };
        // inversion applies after the eligibility rule above
        hit != self.invert
    }
}

/// Iterative matcher; a star records a resume point instead of recursing,
/// so pathological patterns cannot blow the stack.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut px = 0;
    let mut tx = 0;
    let mut star_px = 0;
    let mut star_tx = 0;

    while tx < text.len() || px < pattern.len() {
        if px < pattern.len() {
            match pattern[px] {
                b'*' => {
                    // match empty first; backtracking widens one byte at a time
                    star_px = px;
                    star_tx = tx + 1;
                    px += 1;
                    continue;
                }
                b'?' if tx < text.len() => {
                    px += 1;
                    tx += 1;
                    continue;
                }
                b'[' if tx < text.len() => {
                    if let Some((hit, end)) = match_bracket(&pattern[px..], text[tx]) {
                        if hit {
                            px += end;
                            tx += 1;
                            continue;
                        }
                    }
                }
                b'\\' if px + 1 < pattern.len() && tx < text.len() => {
                    if pattern[px + 1] == text[tx] {
                        px += 2;
                        tx += 1;
                        continue;
                    }
                }
                c if tx < text.len() && c == text[tx] => {
                    px += 1;
                    tx += 1;
                    continue;
                }
                _ => {}
            }
        }
        if star_tx > 0 && star_tx <= text.len() {
            px = star_px;
            tx = star_tx;
            star_tx += 1;
            continue;
        }
        return false;
    }
    true
}

/// Evaluates `[...]` / `[^...]` with `a-z` ranges against one byte.
/// Returns the verdict and the index just past the closing bracket, or
/// `None` when the class never closes.
fn match_bracket(pattern: &[u8], ch: u8) -> Option<(bool, usize)> {
    let mut i = 1;
    let negate = if pattern.get(i) == Some(&b'^') {
        i += 1;
        true
    } else {
        false
    };

    let mut hit = false;
    while i < pattern.len() && pattern[i] != b']' {
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            if (pattern[i]..=pattern[i + 2]).contains(&ch) {
                hit = true;
            }
            i += 3;
        } else {
            if pattern[i] == ch {
                hit = true;
            }
            i += 1;
        }
    }

    if i < pattern.len() {
        Some((hit != negate, i + 1))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
