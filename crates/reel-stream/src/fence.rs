//! Fenced code region extraction.
//!
//! Tokens arrive as arbitrary fragments of the response text. The scanner
//! finds the opening and closing fence markers wherever they fall inside a
//! token and returns the part of each token that belongs to the code region.
//!
//! Limitation: one fenced region per response is assumed. Text after the
//! closing marker in the same token is dropped, and a later marker would
//! open a new region whose text is appended to the same artifact. The
//! backend is expected to send a single fence; nothing here verifies it.

/// Fence delimiter
pub const FENCE_MARKER: &str = "```";

/// Language tags stripped after an opening marker by default
pub const DEFAULT_FENCE_TAGS: &[&str] = &["html"];

/// Where the scanner currently is relative to the code region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    OutsideFence,
    InsideFence,
}

/// Advance the scan by one token.
///
/// Returns the segment of `token` that belongs to the code region (never
/// empty) together with the new state.
pub fn scan<'a, T: AsRef<str>>(
    state: ScanState,
    token: &'a str,
    tags: &[T],
) -> (Option<&'a str>, ScanState) {
    match (state, token.find(FENCE_MARKER)) {
        (ScanState::OutsideFence, None) => (None, ScanState::OutsideFence),
        (ScanState::OutsideFence, Some(at)) => {
            let rest = strip_tag(&token[at + FENCE_MARKER.len()..], tags);
            (non_empty(rest), ScanState::InsideFence)
        }
        (ScanState::InsideFence, None) => (non_empty(token), ScanState::InsideFence),
        (ScanState::InsideFence, Some(at)) => (non_empty(&token[..at]), ScanState::OutsideFence),
    }
}

fn non_empty(segment: &str) -> Option<&str> {
    if segment.is_empty() { None } else { Some(segment) }
}

/// Remove a leading `<tag>` line from the text following an opening marker.
fn strip_tag<'a, T: AsRef<str>>(rest: &'a str, tags: &[T]) -> &'a str {
    for tag in tags {
        let Some(after) = rest.strip_prefix(tag.as_ref()) else {
            continue;
        };
        if after.is_empty() {
            // Tag at the very end of the token; its newline arrives next.
            return after;
        }
        if let Some(body) = after.strip_prefix("\r\n").or_else(|| after.strip_prefix('\n')) {
            return body;
        }
    }
    rest
}

/// Stateful wrapper around [`scan`] for one response.
///
/// Tokens must be fed strictly in arrival order from a single producer.
#[derive(Debug, Clone)]
pub struct FenceScanner {
    state: ScanState,
    tags: Vec<String>,
    opened: bool,
}

impl FenceScanner {
    /// Create a scanner that strips the given language tags
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            state: ScanState::OutsideFence,
            tags: tags.into_iter().map(Into::into).collect(),
            opened: false,
        }
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether an opening marker has been seen in this response
    pub fn has_opened(&self) -> bool {
        self.opened
    }

    /// Feed one token and return the code segment it contributes
    pub fn feed<'a>(&mut self, token: &'a str) -> Option<&'a str> {
        let (segment, next) = scan(self.state, token, self.tags.as_slice());
        if self.state == ScanState::OutsideFence && next == ScanState::InsideFence {
            self.opened = true;
        }
        self.state = next;
        segment
    }
}

impl Default for FenceScanner {
    fn default() -> Self {
        Self::new(DEFAULT_FENCE_TAGS.iter().copied())
    }
}
