// objsh reader - command-language scanner
//
// Splits a script into commands and words. Substitution itself ($var and
// [cmd]) is performed by the interpreter; the reader only marks where it
// happens. Braced words are verbatim, quoted words substitute, bare words
// substitute and end at whitespace.

use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("missing close-brace")]
    MissingCloseBrace,

    #[error("missing close-bracket")]
    MissingCloseBracket,

    #[error("missing closing quote")]
    MissingQuote,

    #[error("extra characters after close-brace")]
    ExtraAfterBrace,

    #[error("extra characters after close-quote")]
    ExtraAfterQuote,
}

/// One piece of a word: literal text, a variable substitution, or a nested
/// command substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Lit(String),
    Var(String),
    Cmd(String),
}

/// A word before substitution.
#[derive(Debug, Clone)]
pub struct RawWord {
    pub parts: SmallVec<[Fragment; 2]>,
}

impl RawWord {
    fn literal(text: String) -> Self {
        let mut parts = SmallVec::new();
        parts.push(Fragment::Lit(text));
        RawWord { parts }
    }

    /// The word's literal text, when it has no substitutions.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Fragment::Lit(s)] => Some(s),
            _ => None,
        }
    }
}

/// One command: a non-empty word list.
#[derive(Debug, Clone)]
pub struct RawCommand {
    pub words: Vec<RawWord>,
}

struct Input {
    chars: Vec<char>,
    index: usize,
}

impl Input {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            index: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.index += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.index >= self.chars.len()
    }
}

fn is_word_end(c: char, in_quotes: bool) -> bool {
    if in_quotes {
        false
    } else {
        c == ' ' || c == '\t' || c == '\n' || c == ';'
    }
}

fn escape_char(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Parse a script into its commands.
pub fn parse_script(src: &str) -> Result<Vec<RawCommand>, ScanError> {
    let mut input = Input::new(src);
    let mut commands = Vec::new();
    let mut words: Vec<RawWord> = Vec::new();

    loop {
        // Skip inter-word space and line continuations.
        while let Some(c) = input.peek() {
            if c == ' ' || c == '\t' {
                input.next();
            } else if c == '\\' && input.chars.get(input.index + 1) == Some(&'\n') {
                input.next();
                input.next();
            } else {
                break;
            }
        }

        match input.peek() {
            None => break,
            Some('\n') | Some(';') => {
                input.next();
                if !words.is_empty() {
                    commands.push(RawCommand {
                        words: std::mem::take(&mut words),
                    });
                }
            }
            Some('#') if words.is_empty() => {
                while let Some(c) = input.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            Some('{') => {
                words.push(parse_braced_word(&mut input)?);
            }
            Some('"') => {
                words.push(parse_quoted_word(&mut input)?);
            }
            Some(_) => {
                words.push(parse_bare_word(&mut input)?);
            }
        }
    }

    if !words.is_empty() {
        commands.push(RawCommand { words });
    }
    Ok(commands)
}

fn parse_braced_word(input: &mut Input) -> Result<RawWord, ScanError> {
    input.next(); // consume '{'
    let mut depth = 1usize;
    let mut text = String::new();
    loop {
        match input.next() {
            None => return Err(ScanError::MissingCloseBrace),
            Some('\\') => {
                // Keep the backslash: braced content is verbatim, but the
                // escaped character must not count toward brace depth.
                text.push('\\');
                if let Some(c) = input.next() {
                    text.push(c);
                }
            }
            Some('{') => {
                depth += 1;
                text.push('{');
            }
            Some('}') => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                text.push('}');
            }
            Some(c) => text.push(c),
        }
    }
    if let Some(c) = input.peek() {
        if !is_word_end(c, false) {
            return Err(ScanError::ExtraAfterBrace);
        }
    }
    Ok(RawWord::literal(text))
}

fn parse_quoted_word(input: &mut Input) -> Result<RawWord, ScanError> {
    input.next(); // consume '"'
    let word = parse_fragments(input, true)?;
    if input.next() != Some('"') {
        return Err(ScanError::MissingQuote);
    }
    if let Some(c) = input.peek() {
        if !is_word_end(c, false) {
            return Err(ScanError::ExtraAfterQuote);
        }
    }
    Ok(word)
}

fn parse_bare_word(input: &mut Input) -> Result<RawWord, ScanError> {
    parse_fragments(input, false)
}

fn parse_fragments(input: &mut Input, in_quotes: bool) -> Result<RawWord, ScanError> {
    let mut parts: SmallVec<[Fragment; 2]> = SmallVec::new();
    let mut lit = String::new();

    let flush = |lit: &mut String, parts: &mut SmallVec<[Fragment; 2]>| {
        if !lit.is_empty() {
            parts.push(Fragment::Lit(std::mem::take(lit)));
        }
    };

    while let Some(c) = input.peek() {
        if in_quotes && c == '"' {
            break;
        }
        if is_word_end(c, in_quotes) {
            break;
        }
        match c {
            '\\' => {
                input.next();
                match input.next() {
                    Some('\n') => lit.push(' '),
                    Some(e) => lit.push(escape_char(e)),
                    None => lit.push('\\'),
                }
            }
            '$' => {
                input.next();
                let name = parse_var_name(input)?;
                if name.is_empty() {
                    lit.push('$');
                } else {
                    flush(&mut lit, &mut parts);
                    parts.push(Fragment::Var(name));
                }
            }
            '[' => {
                input.next();
                let script = parse_bracketed(input)?;
                flush(&mut lit, &mut parts);
                parts.push(Fragment::Cmd(script));
            }
            _ => {
                input.next();
                lit.push(c);
            }
        }
    }

    flush(&mut lit, &mut parts);
    if parts.is_empty() {
        parts.push(Fragment::Lit(String::new()));
    }
    Ok(RawWord { parts })
}

fn parse_var_name(input: &mut Input) -> Result<String, ScanError> {
    let mut name = String::new();
    if input.peek() == Some('{') {
        input.next();
        loop {
            match input.next() {
                None => return Err(ScanError::MissingCloseBrace),
                Some('}') => break,
                Some(c) => name.push(c),
            }
        }
        return Ok(name);
    }
    while let Some(c) = input.peek() {
        if c.is_alphanumeric() || c == '_' || c == ':' || c == '-' {
            name.push(c);
            input.next();
        } else {
            break;
        }
    }
    Ok(name)
}

fn parse_bracketed(input: &mut Input) -> Result<String, ScanError> {
    let mut depth = 1usize;
    let mut script = String::new();
    loop {
        match input.next() {
            None => return Err(ScanError::MissingCloseBracket),
            Some('\\') => {
                script.push('\\');
                if let Some(c) = input.next() {
                    script.push(c);
                }
            }
            Some('[') => {
                depth += 1;
                script.push('[');
            }
            Some(']') => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                script.push(']');
            }
            Some(c) => script.push(c),
        }
    }
    Ok(script)
}

/// Scan a whole string as substitution fragments: whitespace is literal,
/// $var and [cmd] mark substitutions. Used for `subst`-style evaluation of
/// condition words.
pub fn parse_subst(src: &str) -> Result<RawWord, ScanError> {
    let mut input = Input::new(src);
    let mut parts: SmallVec<[Fragment; 2]> = SmallVec::new();
    let mut lit = String::new();

    while let Some(c) = input.peek() {
        match c {
            '\\' => {
                input.next();
                match input.next() {
                    Some(e) => lit.push(escape_char(e)),
                    None => lit.push('\\'),
                }
            }
            '$' => {
                input.next();
                let name = parse_var_name(&mut input)?;
                if name.is_empty() {
                    lit.push('$');
                } else {
                    if !lit.is_empty() {
                        parts.push(Fragment::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(Fragment::Var(name));
                }
            }
            '[' => {
                input.next();
                let script = parse_bracketed(&mut input)?;
                if !lit.is_empty() {
                    parts.push(Fragment::Lit(std::mem::take(&mut lit)));
                }
                parts.push(Fragment::Cmd(script));
            }
            _ => {
                input.next();
                lit.push(c);
            }
        }
    }
    if !lit.is_empty() {
        parts.push(Fragment::Lit(lit));
    }
    if parts.is_empty() {
        parts.push(Fragment::Lit(String::new()));
    }
    Ok(RawWord { parts })
}

/// Split a list value into its words. No substitution: braces and quotes
/// group, backslash keeps the next character.
pub fn parse_list(src: &str) -> Result<Vec<String>, ScanError> {
    let mut input = Input::new(src);
    let mut words = Vec::new();

    loop {
        while let Some(c) = input.peek() {
            if c.is_whitespace() {
                input.next();
            } else {
                break;
            }
        }
        if input.at_end() {
            break;
        }

        match input.peek() {
            Some('{') => {
                let word = parse_braced_word(&mut input)?;
                words.push(word.as_literal().unwrap_or_default().to_string());
            }
            Some('"') => {
                input.next();
                let mut text = String::new();
                loop {
                    match input.next() {
                        None => return Err(ScanError::MissingQuote),
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(c) = input.next() {
                                text.push(escape_char(c));
                            }
                        }
                        Some(c) => text.push(c),
                    }
                }
                words.push(text);
            }
            _ => {
                let mut text = String::new();
                while let Some(c) = input.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    input.next();
                    if c == '\\' {
                        if let Some(e) = input.next() {
                            text.push(escape_char(e));
                        }
                    } else {
                        text.push(c);
                    }
                }
                words.push(text);
            }
        }
    }
    Ok(words)
}

/// True when every brace, bracket and quote in the script is balanced.
/// The REPL uses this to decide whether to keep reading lines.
pub fn script_is_complete(src: &str) -> bool {
    let mut depth = 0i64;
    let mut in_quote = false;
    let mut chars = src.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => in_quote = !in_quote,
            '{' | '[' if !in_quote => depth += 1,
            '}' | ']' if !in_quote => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_quote
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_command() {
        let cmds = parse_script("set a 1").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].words.len(), 3);
        assert_eq!(cmds[0].words[0].as_literal(), Some("set"));
    }

    #[test]
    fn test_separators_and_comments() {
        let cmds = parse_script("# a comment\nset a 1; set b 2\n").unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn test_braced_word_is_verbatim() {
        let cmds = parse_script("proc p {x y} {return $x}").unwrap();
        assert_eq!(cmds[0].words[2].as_literal(), Some("x y"));
        assert_eq!(cmds[0].words[3].as_literal(), Some("return $x"));
    }

    #[test]
    fn test_variable_fragment() {
        let cmds = parse_script("set b $a").unwrap();
        assert_eq!(cmds[0].words[2].parts[0], Fragment::Var("a".into()));
    }

    #[test]
    fn test_command_substitution_fragment() {
        let cmds = parse_script("set b [list 1 2]").unwrap();
        assert_eq!(cmds[0].words[2].parts[0], Fragment::Cmd("list 1 2".into()));
    }

    #[test]
    fn test_quoted_word_mixes_fragments() {
        let cmds = parse_script("set b \"x $a y\"").unwrap();
        let parts = &cmds[0].words[2].parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], Fragment::Var("a".into()));
    }

    #[test]
    fn test_unbalanced_brace_errors() {
        assert!(parse_script("set a {oops").is_err());
        assert!(!script_is_complete("set a {oops"));
        assert!(script_is_complete("set a {ok}"));
    }

    #[test]
    fn test_parse_list() {
        let words = parse_list("a {b c} d").unwrap();
        assert_eq!(words, vec!["a", "b c", "d"]);
    }

    #[test]
    fn test_parse_list_nested_braces() {
        let words = parse_list("{x {y 2}} args").unwrap();
        assert_eq!(words, vec!["x {y 2}", "args"]);
    }
}
