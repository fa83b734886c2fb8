use phar_format::PharPath;

use super::Compactor;
use crate::error::CompactFailure;

/// Strips comments and collapses whitespace in PHP sources. Line breaks are
/// kept so that line numbers in stack traces still match the original file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Php;

impl Compactor for Php {
    fn name(&self) -> &'static str {
        "php"
    }

    fn supports(&self, path: &PharPath) -> bool {
        path.extension().as_deref() == Some("php")
    }

    fn compact(&self, _path: &PharPath, contents: Vec<u8>) -> Result<Vec<u8>, CompactFailure> {
        Lexer::new(&contents).run()
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    out: Vec<u8>,
    // Whitespace seen since the last token, flushed before the next one.
    newlines: usize,
    space: bool,
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

impl<'a> Lexer<'a> {
    fn new(src: &'a [u8]) -> Lexer<'a> {
        Lexer {
            src,
            pos: 0,
            line: 1,
            out: Vec::with_capacity(src.len()),
            newlines: 0,
            space: false,
        }
    }

    fn run(mut self) -> Result<Vec<u8>, CompactFailure> {
        while self.pos < self.src.len() {
            self.html();
            if self.pos < self.src.len() {
                self.code()?;
            }
        }

        self.out.extend(std::iter::repeat(b'\n').take(self.newlines));
        Ok(self.out)
    }

    fn rest(&self) -> &'a [u8] {
        &self.src[self.pos..]
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn copy(&mut self, end: usize) {
        let chunk = &self.src[self.pos..end];
        self.line += chunk.iter().filter(|b| **b == b'\n').count();
        self.out.extend_from_slice(chunk);
        self.pos = end;
    }

    fn flush(&mut self) {
        if self.newlines > 0 {
            self.out.extend(std::iter::repeat(b'\n').take(self.newlines));
        } else if self.space {
            self.out.push(b' ');
        }
        self.newlines = 0;
        self.space = false;
    }

    /// Copies inline markup up to and including the next open tag.
    fn html(&mut self) {
        let rest = self.rest();
        let tag = rest.windows(5).enumerate().find_map(|(i, w)| {
            if w.eq_ignore_ascii_case(b"<?php") {
                Some(i + 5)
            } else if w.starts_with(b"<?=") {
                Some(i + 3)
            } else {
                None
            }
        });

        // `<?=` can sit in the last four bytes, where no window of five exists.
        let tag = tag.or_else(|| {
            let tail = rest.len().saturating_sub(4);
            rest[tail..]
                .windows(3)
                .position(|w| w == b"<?=")
                .map(|i| tail + i + 3)
        });

        let end = match tag {
            Some(end) => self.pos + end,
            None => self.src.len(),
        };
        self.copy(end);
    }

    /// Consumes code up to and including the close tag, or to the end.
    fn code(&mut self) -> Result<(), CompactFailure> {
        while let Some(b) = self.peek(0) {
            let next = self.peek(1);

            match b {
                b'?' if next == Some(b'>') => {
                    self.flush();
                    let end = self.pos + 2;
                    self.copy(end);
                    return Ok(());
                }
                b'/' if next == Some(b'/') => self.line_comment(),
                b'#' if next != Some(b'[') => self.line_comment(),
                b'/' if next == Some(b'*') => self.block_comment()?,
                b'\'' | b'"' | b'`' => self.quoted(b)?,
                b'<' if self.rest().starts_with(b"<<<") => {
                    if !self.heredoc()? {
                        self.flush();
                        self.out.push(b);
                        self.pos += 1;
                    }
                }
                b'\n' => {
                    self.newlines += 1;
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0B | 0x0C => {
                    self.space = true;
                    self.pos += 1;
                }
                _ => {
                    self.flush();
                    self.out.push(b);
                    self.pos += 1;
                }
            }
        }

        Ok(())
    }

    fn line_comment(&mut self) {
        while let Some(b) = self.peek(0) {
            if b == b'\n' || (b == b'?' && self.peek(1) == Some(b'>')) {
                break;
            }
            self.pos += 1;
        }
        self.space = true;
    }

    fn block_comment(&mut self) -> Result<(), CompactFailure> {
        let start_line = self.line;
        let body = &self.src[self.pos + 2..];
        let close = body
            .windows(2)
            .position(|w| w == b"*/")
            .ok_or(CompactFailure::UnterminatedComment { line: start_line })?;

        let newlines = body[..close].iter().filter(|b| **b == b'\n').count();
        self.newlines += newlines;
        self.line += newlines;
        self.space = true;
        self.pos += 2 + close + 2;
        Ok(())
    }

    fn quoted(&mut self, quote: u8) -> Result<(), CompactFailure> {
        let start_line = self.line;
        let mut end = self.pos + 1;

        loop {
            match self.src.get(end).copied() {
                None => return Err(CompactFailure::UnterminatedString { line: start_line }),
                Some(b'\\') => end += 2,
                Some(b) if b == quote => {
                    end += 1;
                    break;
                }
                Some(_) => end += 1,
            }
        }

        self.flush();
        self.copy(end);
        Ok(())
    }

    /// Copies a heredoc or nowdoc verbatim. Returns false when `<<<` does not
    /// start one.
    fn heredoc(&mut self) -> Result<bool, CompactFailure> {
        let src = self.src;
        let mut p = self.pos + 3;

        while matches!(src.get(p).copied(), Some(b' ') | Some(b'\t')) {
            p += 1;
        }

        let quote = match src.get(p).copied() {
            Some(q @ b'\'') | Some(q @ b'"') => {
                p += 1;
                Some(q)
            }
            _ => None,
        };

        let label_start = p;
        if src.get(p).map_or(true, |b| b.is_ascii_digit()) {
            return Ok(false);
        }
        while src.get(p).copied().map_or(false, is_ident) {
            p += 1;
        }
        let label = &src[label_start..p];
        if label.is_empty() {
            return Ok(false);
        }

        if let Some(q) = quote {
            if src.get(p) != Some(&q) {
                return Ok(false);
            }
            p += 1;
        }

        if src.get(p) == Some(&b'\r') {
            p += 1;
        }
        if src.get(p) != Some(&b'\n') {
            return Ok(false);
        }

        let mut line_start = p + 1;
        let end = loop {
            let mut i = line_start;
            while matches!(src.get(i).copied(), Some(b' ') | Some(b'\t')) {
                i += 1;
            }
            if src[i.min(src.len())..].starts_with(label)
                && !src.get(i + label.len()).copied().map_or(false, is_ident)
            {
                break i + label.len();
            }

            match src[line_start.min(src.len())..].iter().position(|b| *b == b'\n') {
                Some(nl) => line_start += nl + 1,
                None => {
                    return Err(CompactFailure::UnterminatedHeredoc {
                        label: String::from_utf8_lossy(label).into_owned(),
                        line: self.line,
                    })
                }
            }
        };

        self.flush();
        self.copy(end);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(src: &str) -> String {
        let out = Php
            .compact(&PharPath::new("a.php").unwrap(), src.as_bytes().to_vec())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn fail(src: &str) -> CompactFailure {
        Php.compact(&PharPath::new("a.php").unwrap(), src.as_bytes().to_vec())
            .unwrap_err()
    }

    #[test]
    fn comments_removed_lines_kept() {
        let src = "<?php\n\n// comment\n$a = 1; # hash\n/* multi\nline */\n$b = 2;\n";
        let out = strip(src);
        assert_eq!(out, "<?php\n\n\n$a = 1;\n\n\n$b = 2;\n");
        assert_eq!(out.lines().count(), src.lines().count());
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(strip("<?php   echo\t\t 1 ;"), "<?php echo 1 ;");
    }

    #[test]
    fn strings_are_untouched() {
        let src = "<?php echo '// not a comment', \"# nor /* this */\", 'it\\'s';";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn attributes_are_not_comments() {
        let src = "<?php\n#[Attribute]\nclass A {}";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn inline_html_is_kept() {
        let src = "<html><?php /* c */ echo 1; ?>\n<p># not php</p>\n<?php // x\n";
        assert_eq!(strip(src), "<html><?php echo 1; ?>\n<p># not php</p>\n<?php\n");
    }

    #[test]
    fn line_comment_ends_at_close_tag() {
        assert_eq!(strip("<?php echo 1; // c ?>tail"), "<?php echo 1; ?>tail");
    }

    #[test]
    fn heredoc_is_verbatim() {
        let src = "<?php\n$x = <<<EOT\n  // kept\n  EOT;\n$y = <<<'RAW'\n/* kept */\nRAW;\n";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn unterminated_comment() {
        assert!(matches!(
            fail("<?php\n\n/* never"),
            CompactFailure::UnterminatedComment { line: 3 }
        ));
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(
            fail("<?php\n$a = 'abc"),
            CompactFailure::UnterminatedString { line: 2 }
        ));
    }

    #[test]
    fn unterminated_heredoc() {
        assert!(matches!(
            fail("<?php\n$a = <<<EOT\nbody\n"),
            CompactFailure::UnterminatedHeredoc { .. }
        ));
    }

    #[test]
    fn only_php_files() {
        assert!(Php.supports(&PharPath::new("src/A.php").unwrap()));
        assert!(Php.supports(&PharPath::new("src/B.PHP").unwrap()));
        assert!(!Php.supports(&PharPath::new("README.md").unwrap()));
    }
}
