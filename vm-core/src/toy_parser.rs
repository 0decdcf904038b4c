//! A tiny bundled toy parser (§2 SUPPLEMENT): turns a prefix s-expression
//! surface syntax into a message tree, for the `demos/run` CLI and for the
//! `state_do_cstring`/`state_do_file` FFI entry points that must accept raw
//! source text across a C boundary. This is not the real parser described
//! in §6 (lexing, operator-shuffle-marker insertion, label assignment for a
//! full surface syntax) — it exists only so there is *some* text format the
//! library itself can turn into a message tree without an external
//! collaborator. The library's real inbound contract remains a pre-built
//! message tree.
//!
//! Grammar: whitespace-separated top-level forms become successive
//! statements (chained via `.next`, `is_end_of_line = true`). A form is
//! either `(selector arg...)` (a keyword/unary send), a numeric literal, a
//! `"double-quoted string"` literal, or a bare identifier (a 0-arg send
//! against whatever receiver the statement chain supplies).

use std::rc::Rc;

use crate::message::Message;
use crate::object::ObjectKind;
use crate::state::State;
use crate::{Fault, VmResult};

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' || c == ')' {
            tokens.push(c.to_string());
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::from("\"");
            while let Some(&c2) = chars.peek() {
                chars.next();
                if c2 == '"' {
                    break;
                }
                s.push(c2);
            }
            s.push('"');
            tokens.push(s);
            continue;
        }
        let mut atom = String::new();
        while let Some(&c2) = chars.peek() {
            if c2.is_whitespace() || c2 == '(' || c2 == ')' {
                break;
            }
            atom.push(c2);
            chars.next();
        }
        tokens.push(atom);
    }
    tokens
}

fn parse_form(state: &mut State, tokens: &[String], pos: &mut usize) -> VmResult<Message> {
    let tok = tokens.get(*pos).ok_or_else(|| Fault::IoError("unexpected end of input".into()))?.clone();

    if tok == "(" {
        *pos += 1;
        let selector = tokens.get(*pos).cloned().ok_or_else(|| Fault::IoError("expected selector after '('".into()))?;
        *pos += 1;
        let mut args = Vec::new();
        loop {
            match tokens.get(*pos).map(|t| t.as_str()) {
                Some(")") => {
                    *pos += 1;
                    break;
                }
                Some(_) => args.push(Rc::new(parse_form(state, tokens, pos)?)),
                None => return Err(Fault::IoError("unterminated form".into())),
            }
        }
        let sym = state.symtab.intern_str(&selector);
        Ok(Message::with_args(sym, args))
    } else if tok == ")" {
        Err(Fault::IoError("unexpected ')'".into()))
    } else {
        *pos += 1;
        if let Ok(n) = tok.parse::<f64>() {
            let id = state.number(n);
            let sym = state.symtab.intern_str(&tok);
            Ok(Message::literal(sym, id))
        } else if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
            let text = &tok[1..tok.len() - 1];
            let lobby = state.lobby;
            let id = state.alloc_with_prototype(ObjectKind::Sequence(text.as_bytes().to_vec()), lobby);
            let sym = state.symtab.intern_str(&tok);
            Ok(Message::literal(sym, id))
        } else {
            let sym = state.symtab.intern_str(&tok);
            Ok(Message::new(sym))
        }
    }
}

/// Parses `source` into a chain of top-level statements. Returns `None` for
/// empty/whitespace-only input.
pub fn parse(state: &mut State, source: &str) -> VmResult<Option<Rc<Message>>> {
    let tokens = tokenize(source);
    let mut pos = 0;
    let mut forms = Vec::new();
    while pos < tokens.len() {
        forms.push(parse_form(state, &tokens, &mut pos)?);
    }

    let mut next: Option<Rc<Message>> = None;
    for mut m in forms.into_iter().rev() {
        m.is_end_of_line = true;
        m.next = next.take();
        next = Some(Rc::new(m));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;

    #[test]
    fn parses_nested_keyword_send_into_args() {
        let mut state = State::new(SandboxConfig::unbounded());
        let tree = parse(&mut state, "(+ 1 (* 2 3))").unwrap().unwrap();
        assert_eq!(state.symtab.as_str(tree.name), "+");
        assert_eq!(tree.args.len(), 2);
        assert_eq!(tree.args[1].args.len(), 2);
    }

    #[test]
    fn chains_top_level_statements_with_end_of_line() {
        let mut state = State::new(SandboxConfig::unbounded());
        let tree = parse(&mut state, "(clone) (yield)").unwrap().unwrap();
        assert!(tree.is_end_of_line);
        assert_eq!(state.symtab.as_str(tree.name), "clone");
        let second = tree.next.clone().unwrap();
        assert_eq!(state.symtab.as_str(second.name), "yield");
    }

    #[test]
    fn empty_source_parses_to_nothing() {
        let mut state = State::new(SandboxConfig::unbounded());
        assert!(parse(&mut state, "   \n  ").unwrap().is_none());
    }
}
