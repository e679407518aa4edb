//! Name-pattern matching (4.B): substring and subsequence matching with
//! start/end anchors and case folding. Deliberately exact-contract rather
//! than fuzzy-scored — callers that want fuzzy ranking build it on top.

#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    subsequence: bool,
    anchor_start: bool,
    anchor_end: bool,
    ignore_case: bool,
}

impl Pattern {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            subsequence: false,
            anchor_start: false,
            anchor_end: false,
            ignore_case: false,
        }
    }

    pub fn subsequence(mut self, value: bool) -> Self {
        self.subsequence = value;
        self
    }

    pub fn anchor_start(mut self, value: bool) -> Self {
        self.anchor_start = value;
        self
    }

    pub fn anchor_end(mut self, value: bool) -> Self {
        self.anchor_end = value;
        self
    }

    pub fn ignore_case(mut self, value: bool) -> Self {
        self.ignore_case = value;
        self
    }

    pub fn matches(&self, candidate: &str) -> bool {
        if self.ignore_case {
            let text = self.text.to_lowercase();
            let candidate = candidate.to_lowercase();
            self.matches_exact(&text, &candidate)
        } else {
            self.matches_exact(&self.text, candidate)
        }
    }

    fn matches_exact(&self, pattern: &str, candidate: &str) -> bool {
        if self.subsequence {
            Self::matches_subsequence(pattern, candidate, self.anchor_start, self.anchor_end)
        } else {
            Self::matches_substring(pattern, candidate, self.anchor_start, self.anchor_end)
        }
    }

    fn matches_substring(pattern: &str, candidate: &str, anchor_start: bool, anchor_end: bool) -> bool {
        if pattern.is_empty() {
            return !anchor_start && !anchor_end || candidate.is_empty();
        }
        match (anchor_start, anchor_end) {
            (true, true) => candidate == pattern,
            (true, false) => candidate.starts_with(pattern),
            (false, true) => candidate.ends_with(pattern),
            (false, false) => candidate.contains(pattern),
        }
    }

    fn matches_subsequence(pattern: &str, candidate: &str, anchor_start: bool, anchor_end: bool) -> bool {
        if pattern.is_empty() {
            return true;
        }
        let chars: Vec<char> = candidate.chars().collect();
        let mut pattern_chars = pattern.chars();
        let mut next = pattern_chars.next();
        let mut first_match: Option<usize> = None;
        let mut last_match: Option<usize> = None;

        for (i, &c) in chars.iter().enumerate() {
            let Some(target) = next else { break };
            if c == target {
                if first_match.is_none() {
                    first_match = Some(i);
                }
                last_match = Some(i);
                next = pattern_chars.next();
            }
        }

        if next.is_some() {
            return false; // pattern exhausted candidate before matching every char
        }

        if anchor_start && first_match != Some(0) {
            return false;
        }
        if anchor_end && last_match != Some(chars.len().saturating_sub(1)) {
            return false;
        }
        true
    }
}
