// objsh core types - values and control flow
//
// Everything the command language touches is a string. Value wraps an
// Rc<str> so words can be cloned freely along the evaluation path.

use std::fmt;
use std::rc::Rc;

/// A command-language value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Value(Rc<str>);

impl Value {
    pub fn empty() -> Self {
        Value(Rc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the value as an integer, or raise a command error.
    pub fn as_int(&self) -> Result<i64, Exception> {
        self.0
            .trim()
            .parse::<i64>()
            .map_err(|_| Exception::error(format!("expected integer but got \"{}\"", self.0)))
    }

    /// Integer truth: non-zero is true. Used by the minimal `if` command.
    pub fn as_bool(&self) -> Result<bool, Exception> {
        Ok(self.as_int()? != 0)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(Rc::from(s.as_str()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value(Rc::from(n.to_string().as_str()))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value(Rc::from(n.to_string().as_str()))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value(Rc::from(if b { "1" } else { "0" }))
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Join words into a single list value, brace-quoting words that would
/// otherwise split.
pub fn list_join(words: &[Value]) -> Value {
    let mut out = String::new();
    for (i, w) in words.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let s = w.as_str();
        let needs_quote = s.is_empty()
            || s.contains(|c: char| c.is_whitespace())
            || s.starts_with('{')
            || s.starts_with('"');
        if needs_quote {
            out.push('{');
            out.push_str(s);
            out.push('}');
        } else {
            out.push_str(s);
        }
    }
    Value::from(out)
}

/// How a command body left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Error,
    Return,
    Break,
    Continue,
}

/// Non-normal completion of a script: an error or a control-flow unwind.
///
/// The `error_info` vector accumulates human-readable trace frames as the
/// error propagates outward; it is rendered newest-frame-last.
#[derive(Debug, Clone)]
pub struct Exception {
    pub code: ResultCode,
    pub value: Value,
    pub error_info: Vec<String>,
}

impl Exception {
    pub fn error(msg: impl Into<Value>) -> Self {
        Exception {
            code: ResultCode::Error,
            value: msg.into(),
            error_info: Vec::new(),
        }
    }

    pub fn ret(value: Value) -> Self {
        Exception {
            code: ResultCode::Return,
            value,
            error_info: Vec::new(),
        }
    }

    pub fn brk() -> Self {
        Exception {
            code: ResultCode::Break,
            value: Value::empty(),
            error_info: Vec::new(),
        }
    }

    pub fn cont() -> Self {
        Exception {
            code: ResultCode::Continue,
            value: Value::empty(),
            error_info: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code == ResultCode::Error
    }

    /// Append a trace frame without disturbing the underlying error.
    pub fn add_error_info(mut self, frame: impl Into<String>) -> Self {
        if self.code == ResultCode::Error {
            self.error_info.push(frame.into());
        }
        self
    }

    /// Render the error message followed by its accumulated trace.
    pub fn render(&self) -> String {
        let mut out = self.value.to_string();
        for frame in &self.error_info {
            out.push_str("\n    ");
            out.push_str(frame);
        }
        out
    }
}

/// The result of evaluating a script or invoking a command.
pub type CmdResult = Result<Value, Exception>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_int() {
        let v = Value::from(42i64);
        assert_eq!(v.as_int().unwrap(), 42);
        assert!(Value::from("nope").as_int().is_err());
    }

    #[test]
    fn test_list_join_quoting() {
        let words = [Value::from("a"), Value::from("b c"), Value::from("")];
        assert_eq!(list_join(&words).as_str(), "a {b c} {}");
    }

    #[test]
    fn test_error_info_accumulates() {
        let e = Exception::error("boom").add_error_info("while testing");
        assert_eq!(e.error_info.len(), 1);
        assert!(e.render().contains("while testing"));
    }
}
