//! Token-bounded text splitting.
//!
//! Long page content is split into pieces that each fit a per-call token
//! budget. Splitting prefers paragraph boundaries, then sentence boundaries,
//! and only slices mid-sentence when a single sentence is larger than the
//! budget. All sizes are measured in characters, not bytes, so multi-byte
//! text is never cut inside a code point.
//!
//! Token counts are a model-agnostic estimate; provider adapters apply their
//! own safe-budget fraction before calling [`split`].

/// Characters per token used for both estimation and the character budget.
pub const CHARS_PER_TOKEN: usize = 4;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";
const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Estimate the token count of `text` as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split `content` into chunks of at most `max_tokens` estimated tokens.
///
/// Text that already fits is returned as a single chunk, byte-identical to
/// the input. Otherwise paragraphs are packed greedily; oversized paragraphs
/// are split into sentences and packed the same way.
///
/// # Example
///
/// ```
/// use pagebrief::chunker::split;
///
/// let text = "First paragraph.\n\nSecond paragraph.";
/// assert_eq!(split(text, 1_000), vec![text.to_string()]);
///
/// let chunks = split(text, 5);
/// assert_eq!(chunks, vec!["First paragraph.", "Second paragraph."]);
/// ```
pub fn split(content: &str, max_tokens: usize) -> Vec<String> {
    if estimate_tokens(content) <= max_tokens {
        return vec![content.to_string()];
    }

    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut chunks = Vec::new();
    let mut packer = Packer::new(budget, PARAGRAPH_SEPARATOR);

    for paragraph in content.split(PARAGRAPH_SEPARATOR) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if paragraph.chars().count() > budget {
            packer.flush_into(&mut chunks);
            split_paragraph(paragraph, budget, &mut chunks);
        } else {
            packer.push(paragraph, &mut chunks);
        }
    }
    packer.flush_into(&mut chunks);

    if chunks.is_empty() {
        return slice_fixed(content, budget);
    }
    chunks
}

/// Pack the sentences of one oversized paragraph.
fn split_paragraph(paragraph: &str, budget: usize, chunks: &mut Vec<String>) {
    let mut packer = Packer::new(budget, SENTENCE_SEPARATOR);
    for sentence in sentences(paragraph) {
        if sentence.chars().count() > budget {
            packer.flush_into(chunks);
            chunks.extend(slice_fixed(sentence, budget));
        } else {
            packer.push(sentence, chunks);
        }
    }
    packer.flush_into(chunks);
}

/// Split at sentence terminators followed by whitespace or end of text.
/// Returned sentences keep their terminator and are trimmed.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();

    while let Some((idx, c)) = iter.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }
        let at_boundary = match iter.peek() {
            None => true,
            Some((_, next)) => next.is_whitespace(),
        };
        if at_boundary {
            let end = idx + c.len_utf8();
            push_trimmed(&mut out, text.get(start..end));
            start = end;
        }
    }
    push_trimmed(&mut out, text.get(start..));
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: Option<&'a str>) {
    if let Some(piece) = piece.map(str::trim).filter(|p| !p.is_empty()) {
        out.push(piece);
    }
}

/// Cut `text` into consecutive runs of `budget` characters.
pub fn slice_fixed(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(budget)
        .map(|run| run.iter().collect::<String>())
        .collect()
}

/// Greedy accumulator joining pieces with a separator under a char budget.
struct Packer {
    budget: usize,
    separator: &'static str,
    current: String,
    current_chars: usize,
}

impl Packer {
    fn new(budget: usize, separator: &'static str) -> Self {
        Self {
            budget,
            separator,
            current: String::new(),
            current_chars: 0,
        }
    }

    fn push(&mut self, piece: &str, chunks: &mut Vec<String>) {
        let piece_chars = piece.chars().count();
        if !self.current.is_empty() {
            let joined = self.current_chars + self.separator.chars().count() + piece_chars;
            if joined <= self.budget {
                self.current.push_str(self.separator);
                self.current.push_str(piece);
                self.current_chars = joined;
                return;
            }
            self.flush_into(chunks);
        }
        self.current.push_str(piece);
        self.current_chars = piece_chars;
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        if !self.current.is_empty() {
            chunks.push(std::mem::take(&mut self.current));
            self.current_chars = 0;
        }
    }
}
