//! Ordered, format-preserving HTTP headers for [`HttpRequest`](crate::http::request::HttpRequest)
//! and [`HttpResponse`](crate::http::response::HttpResponse)
//!
//! Headers are kept as an ordered list of entries next to a case-insensitive
//! index pointing at the most recent entry for each name. Duplicate names are
//! allowed and keep their relative order, which matters for `Set-Cookie` and
//! for reproducing intercepted traffic.
//!
//! Entries produced by the [`parser`](crate::http::parser) remember the exact
//! source line and terminator, so an untouched header block serializes back
//! byte for byte. Any edit through this API drops that memory for the edited
//! entry, which then renders in canonical `Name: Value` form.
//!
//! No HTTP semantics are enforced here. Names and values are raw strings.

use indexmap::IndexMap;

const DEFAULT_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    /// Name as it appeared (original case)
    pub name: String,
    /// Value with surrounding whitespace trimmed
    pub value: String,
    /// Exact source text of the line, without its terminator
    pub original_line: Option<String>,
    /// Exact terminator the line ended with
    pub line_terminator: Option<String>,
}

impl HeaderEntry {
    /// Entry created programmatically, rendered canonically
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            original_line: None,
            line_terminator: None,
        }
    }

    /// Entry read from the wire, remembering its exact text
    pub fn parsed(name: &str, value: &str, original_line: &str, terminator: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            original_line: Some(original_line.to_string()),
            line_terminator: Some(terminator.to_string()),
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn canonical(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    entries: Vec<HeaderEntry>,
    // lowercase name -> position of the newest entry with that name
    index: IndexMap<String, usize>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.index.insert(entry.name.to_ascii_lowercase(), i);
        }
    }

    /// Update the newest entry named `name` in place, reverting it to
    /// canonical form. Returns false when no such entry exists.
    fn update_existing(&mut self, name: &str, value: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.value = value.to_string();
                entry.original_line = None;
                entry.line_terminator = None;
                true
            }
            None => false,
        }
    }

    fn insert_at(&mut self, index: usize, name: &str, value: &str) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, HeaderEntry::new(name, value));
        self.reindex();
    }

    /// Set a header, updating the existing entry in place or appending a new one.
    pub fn set(&mut self, name: &str, value: &str) {
        if !self.update_existing(name, value) {
            self.add(name, value);
        }
    }

    /// Set a header right after the first entry named `anchor`.
    ///
    /// An already present `name` is updated in place and does not move.
    /// Without an anchor the header is appended.
    pub fn set_after(&mut self, name: &str, value: &str, anchor: &str) {
        if self.update_existing(name, value) {
            return;
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.is_named(anchor))
            .map_or(self.entries.len(), |i| i + 1);
        self.insert_at(at, name, value);
    }

    /// Set a header right before the first entry named `anchor`.
    /// Same placement rules as [`set_after`](Self::set_after).
    pub fn set_before(&mut self, name: &str, value: &str, anchor: &str) {
        if self.update_existing(name, value) {
            return;
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.is_named(anchor))
            .unwrap_or(self.entries.len());
        self.insert_at(at, name, value);
    }

    /// Set a header at `index`, clamped to the current length.
    pub fn set_at(&mut self, name: &str, value: &str, index: usize) {
        if !self.update_existing(name, value) {
            self.insert_at(index, name, value);
        }
    }

    /// Append a header even if the name is already present.
    pub fn add(&mut self, name: &str, value: &str) {
        self.push(HeaderEntry::new(name, value));
    }

    pub(crate) fn push(&mut self, entry: HeaderEntry) {
        self.index
            .insert(entry.name.to_ascii_lowercase(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_entry(name).map(|e| e.value.as_str())
    }

    /// Original-case name of the newest entry matching `name`
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.get_entry(name).map(|e| e.name.as_str())
    }

    pub fn get_entry(&self, name: &str) -> Option<&HeaderEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    /// Every value stored under `name`, in order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_named(name))
            .map(|e| e.value.as_str())
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove the newest entry named `name`.
    pub fn del(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries.remove(i);
                self.reindex();
                true
            }
            None => false,
        }
    }

    /// Remove every entry named `name`, returning how many were dropped.
    pub fn del_all(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_named(name));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Keep only the entries matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&HeaderEntry) -> bool) {
        self.entries.retain(keep);
        self.reindex();
    }

    /// Snapshot of all entries in order
    pub fn all(&self) -> Vec<HeaderEntry> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    /// Serialize the header block, reusing original lines where they survive.
    pub fn build(&self) -> String {
        self.build_with(None)
    }

    /// Serialize the header block with one terminator forced on every line.
    /// Original line text is kept, only terminators change.
    pub fn build_with_terminator(&self, terminator: &str) -> String {
        self.build_with(Some(terminator))
    }

    fn build_with(&self, forced: Option<&str>) -> String {
        let mut result = String::new();
        let mut last_terminator = self
            .entries
            .iter()
            .filter_map(|e| e.line_terminator.as_deref())
            .find(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TERMINATOR);
        let count = self.entries.len();
        for (i, entry) in self.entries.iter().enumerate() {
            let recorded = entry.line_terminator.as_deref();
            // a parsed last line may carry no terminator at all; only keep
            // that when it is still the last line
            let terminator = match (forced, recorded) {
                (Some(t), _) => t,
                (None, Some("")) if i + 1 < count => last_terminator,
                (None, Some(t)) => t,
                (None, None) => last_terminator,
            };
            if !terminator.is_empty() {
                last_terminator = terminator;
            }
            match &entry.original_line {
                Some(line) => result.push_str(line),
                None => result.push_str(&entry.canonical()),
            }
            result.push_str(terminator);
        }
        result
    }

    /// Canonical `Name: Value\r\n` lines, ignoring any original formatting
    pub fn build_normalized(&self) -> String {
        self.build_canonical(DEFAULT_TERMINATOR)
    }

    /// Canonical `Name: Value` lines ended by `terminator`
    pub fn build_canonical(&self, terminator: &str) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            result.push_str(&entry.canonical());
            result.push_str(terminator);
        }
        result
    }
}
