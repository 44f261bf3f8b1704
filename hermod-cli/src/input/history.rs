//! In-memory command history for up/down navigation

const DEFAULT_LIMIT: usize = 500;

/// Previously entered lines, oldest first
#[derive(Debug)]
pub struct InputHistory {
    entries: Vec<String>,
    /// Index being shown while navigating
    position: Option<usize>,
    /// The unfinished line navigation started from
    draft: String,
    limit: usize,
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

impl InputHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` entries, dropping the oldest
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            position: None,
            draft: String::new(),
            limit: limit.max(1),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a submitted line. Blank lines and immediate repeats are skipped.
    pub fn push(&mut self, input: &str) {
        self.position = None;
        if input.trim().is_empty() || self.entries.last().map(String::as_str) == Some(input) {
            return;
        }
        if self.entries.len() == self.limit {
            self.entries.remove(0);
        }
        self.entries.push(input.to_string());
    }

    /// Step to an older entry
    pub fn navigate_up(&mut self, current: &str) -> Option<&str> {
        let next = match self.position {
            None if !self.entries.is_empty() => {
                self.draft = current.to_string();
                self.entries.len() - 1
            }
            Some(pos) if pos > 0 => pos - 1,
            _ => return None,
        };
        self.position = Some(next);
        Some(&self.entries[next])
    }

    /// Step to a newer entry, ending on the draft
    pub fn navigate_down(&mut self) -> Option<&str> {
        let pos = self.position?;
        if pos + 1 >= self.entries.len() {
            self.position = None;
            return Some(&self.draft);
        }
        self.position = Some(pos + 1);
        Some(&self.entries[pos + 1])
    }
}
