#![allow(clippy::module_inception)]

//! Front- and middle-end of the ES language: an externally produced parse
//! tree is annotated with types and symbol resolutions and handed to a code
//! generator.
//!
//! The crate is organised around the annotation pass:
//!
//! - `ast` - the raw tree shape the annotator consumes and mutates
//! - `types` - the ESType arena and the implicit conversion rules
//! - `symbols` - symbol tables, variables, functions and the scope chain
//! - `type_checker` - the compilation session and the type annotator itself
//! - `errors` - recoverable and fatal compile errors

pub mod ast;
pub mod errors;
pub mod symbols;
pub mod type_checker;
pub mod types;

use errors::errors::CompileError;

/// A line/column pair inside a source file, 1-based lines.
///
/// Line 0 means "no position available" (synthesized nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    pub fn null() -> Self {
        Position { line: 0, column: 0 }
    }

    pub fn is_null(&self) -> bool {
        self.line == 0
    }
}

/// Renders a few source lines of context around `position` with a caret
/// marker below the offending column.
///
/// Returns an empty string when no usable position or source is available;
/// callers fall back to the bare error message in that case.
pub fn render_source_context(
    source_lines: &[String],
    position: &Position,
    inline_text: &str,
) -> String {
    if source_lines.is_empty() || position.is_null() {
        return String::new();
    }

    let line_base0 = (position.line - 1) as usize;
    if line_base0 >= source_lines.len() {
        return String::new();
    }

    let start = line_base0.saturating_sub(5);
    let stop = line_base0 + 1;

    let mut s = Vec::new();
    for (i, line) in source_lines.iter().enumerate().take(stop).skip(start) {
        s.push(format!("{:>5}: {}", i + 1, line));
        if i == stop - 1 {
            let mut caret = " ".repeat(7 + position.column as usize);
            caret.push_str(&format!("^--- {}", inline_text));
            s.push(caret);
        }
    }

    s.join("\n")
}

/// Prints a compile error the way the driver shows it to the user.
///
/// ```text
/// error: no implicit cast to bool available
///     3: x = foo();
///            ^--- no implicit cast to bool available
/// ```
pub fn display_error(error: &CompileError) {
    println!("error: {}", error);
    if let Some(context) = error.context() {
        println!("{}", context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_source_context() {
        let lines: Vec<String> = vec![
            "def f() as int32 {".to_string(),
            "    return x;".to_string(),
            "}".to_string(),
        ];
        let rendered = render_source_context(&lines, &Position::new(2, 11), "could not find symbol");

        assert!(rendered.contains("    2:     return x;"));
        assert!(rendered.contains("^--- could not find symbol"));
        // the caret is indented past the line-number gutter
        let caret_line = rendered.lines().last().unwrap();
        assert_eq!(caret_line.find('^'), Some(7 + 11));
    }

    #[test]
    fn test_render_source_context_without_position() {
        let lines: Vec<String> = vec!["x = 1;".to_string()];
        assert_eq!(render_source_context(&lines, &Position::null(), "oops"), "");
        assert_eq!(render_source_context(&[], &Position::new(1, 0), "oops"), "");
    }
}
