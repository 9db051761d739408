/// A chunk of document text ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub position: usize,
}

/// Boundary kinds a window may end on, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

impl Boundary {
    /// Whether a window may end right before `chars[i]`.
    fn ends_before(self, chars: &[char], i: usize) -> bool {
        let prev = chars[i - 1];
        match self {
            Boundary::Paragraph => prev == '\n' && i >= 2 && chars[i - 2] == '\n',
            Boundary::Sentence => match prev {
                '。' | '！' | '？' => true,
                '.' | '!' | '?' => chars[i].is_whitespace(),
                _ => false,
            },
            Boundary::Word => prev.is_whitespace(),
        }
    }
}

/// Splits text into windows of at most `chunk_size` characters.
///
/// A window ends on the strongest boundary found in its second half
/// (paragraph break, then sentence end, then whitespace), or is cut hard when
/// there is none. Each following window starts up to `overlap` characters
/// before the previous end, moved forward to a word start.
pub fn chunk_text(content: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = content.chars().collect();
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size / 2);

    let mut chunks = Vec::new();
    let mut start = skip_whitespace(&chars, 0);

    while start < chars.len() {
        let end = window_end(&chars, start, chunk_size);
        let text: String = chars[start..end].iter().collect();
        let text = text.trim();
        if !text.is_empty() {
            chunks.push(Chunk {
                content: text.to_string(),
                position: chunks.len(),
            });
        }

        if end == chars.len() {
            break;
        }
        start = next_start(&chars, start, end, overlap);
    }

    chunks
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Exclusive end of the window starting at `start`.
fn window_end(chars: &[char], start: usize, chunk_size: usize) -> usize {
    let limit = start + chunk_size;
    if limit >= chars.len() {
        return chars.len();
    }

    let floor = start + chunk_size / 2 + 1;
    BOUNDARIES
        .iter()
        .find_map(|b| (floor..=limit).rev().find(|&i| b.ends_before(chars, i)))
        .unwrap_or(limit)
}

/// Start of the window after one spanning `start..end`.
fn next_start(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return skip_whitespace(chars, end);
    }

    let back = end.saturating_sub(overlap).max(start + 1);
    // First word start inside the carried tail, if it has one
    let word_start = (back..end).find(|&i| i > 0 && chars[i - 1].is_whitespace() && !chars[i].is_whitespace());
    match word_start {
        Some(i) => i,
        None => skip_whitespace(chars, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_short_text_single_trimmed_chunk() {
        let chunks = chunk_text("  tiny document \n", 512, 50);
        assert_eq!(contents(&chunks), vec!["tiny document"]);
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert!(chunk_text("", 512, 50).is_empty());
        assert!(chunk_text("   \n\n   \n\n   ", 512, 50).is_empty());
    }

    #[test]
    fn test_chunks_fit_and_positions_are_sequential() {
        let text = "alpha beta gamma delta epsilon. ".repeat(60);
        let chunks = chunk_text(&text, 120, 30);
        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i);
            assert!(
                chunk.content.chars().count() <= 120,
                "chunk too long: {}",
                chunk.content.chars().count()
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_then_sentence_breaks() {
        let text = format!(
            "{}\n\n{}",
            "Opening remarks were brief. ".repeat(3).trim_end(),
            "The budget section follows here. ".repeat(6)
        );
        let chunks = chunk_text(&text, 120, 0);
        assert!(chunks[0].content.ends_with("brief."));
        assert!(chunks[1].content.starts_with("The budget"));
        assert!(chunks[1].content.ends_with("here."));
    }

    #[test]
    fn test_overlap_repeats_tail_of_previous_chunk() {
        let text = "one two three four five six seven eight nine ten. ".repeat(10);
        let overlap = 30;
        let chunks = chunk_text(&text, 100, overlap);
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0].content, &pair[1].content);
            let carried = (1..=overlap.min(prev.len()))
                .map(|k| &prev[prev.len() - k..])
                .any(|tail| !tail.starts_with(' ') && next.starts_with(tail));
            assert!(carried, "{next:?} does not continue {prev:?}");
        }
    }

    #[test]
    fn test_without_overlap_words_are_kept_in_order() {
        let text = "Revenue grew in every region during the year. ".repeat(20);
        let chunks = chunk_text(&text, 80, 0);
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.content.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_cjk_sentences_split_on_full_stop() {
        let text = "これは日本語のテストです。".repeat(100);
        let chunks = chunk_text(&text, 500, 50);
        assert!(chunks.len() >= 2);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.chars().count() <= 500);
            assert!(chunk.content.ends_with('。'));
        }
    }

    #[test]
    fn test_unbroken_text_is_cut_hard() {
        let text = "x".repeat(1000);
        let chunks = chunk_text(&text, 100, 10);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 100));
        // No word starts to land on, so windows do not overlap
        assert_eq!(chunks.len(), 10);
    }
}
