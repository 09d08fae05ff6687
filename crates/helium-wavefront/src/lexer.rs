// ── Words ─────────────────────────────────────────────────────────────────

/// A whitespace-delimited word with its 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word<'s> {
    pub text: &'s str,
    pub line: usize,
    pub col: usize,
}

/// One logical line of a Wavefront source, already split into words.
///
/// Comment text (`#` to end of line) is stripped before splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Line<'s> {
    pub number: usize,
    pub words: Vec<Word<'s>>,
}

impl<'s> Line<'s> {
    /// Column just past the last word; used to position "missing value" errors.
    pub fn end_col(&self) -> usize {
        self.words
            .last()
            .map(|w| w.col + w.text.chars().count())
            .unwrap_or(1)
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────

pub struct Lexer<'s> {
    src: &'s str,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str) -> Self {
        Self { src }
    }

    /// Splits the source into non-empty lines of words.
    ///
    /// Blank and comment-only lines are dropped; line numbers keep counting
    /// through them so errors point at the original text.
    pub fn lines(self) -> Vec<Line<'s>> {
        self.src
            .lines()
            .enumerate()
            .filter_map(|(i, raw)| {
                let content = match raw.find('#') {
                    Some(end) => &raw[..end],
                    None => raw,
                };
                let words = split_words(content, i + 1);
                (!words.is_empty()).then_some(Line { number: i + 1, words })
            })
            .collect()
    }
}

fn split_words(content: &str, line: usize) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut col = 0;

    for (byte, ch) in content.char_indices() {
        col += 1;
        if ch.is_whitespace() {
            if let Some((s, c)) = start.take() {
                words.push(Word { text: &content[s..byte], line, col: c });
            }
        } else if start.is_none() {
            start = Some((byte, col));
        }
    }

    if let Some((s, c)) = start {
        words.push(Word { text: &content[s..], line, col: c });
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_one_based_and_skip_runs_of_spaces() {
        let lines = Lexer::new("v  1 2\t3").lines();
        let cols: Vec<usize> = lines[0].words.iter().map(|w| w.col).collect();
        assert_eq!(cols, vec![1, 4, 6, 8]);
    }

    #[test]
    fn comments_and_blank_lines_are_dropped() {
        let lines = Lexer::new("# header\n\nv 0 0 0 # trailing\n").lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[0].words.len(), 4);
    }

    #[test]
    fn crlf_line_endings() {
        let lines = Lexer::new("v 1 2 3\r\nf 1 2 3\r\n").lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].words[3].text, "3");
    }
}
