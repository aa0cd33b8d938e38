//! Annotation erasure
//!
//! Produces plain host-language source by cutting annotation spans out of
//! the original text. Only bytes covered by type syntax change; everything
//! else, comments and formatting included, is copied through.

use tr_parser::{Declaration, HasSpan, MethodDef, Parameter, Program, Span};
use tracing::trace;

/// One replacement of a source range
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    span: Span,
    replacement: String,
}

impl Edit {
    fn remove(span: Span) -> Self {
        Edit {
            span,
            replacement: String::new(),
        }
    }
}

/// Erase every type annotation and type-only declaration from `source`.
/// `program` must have been parsed from `source`.
pub fn erase(source: &str, program: &Program) -> String {
    let mut edits = Vec::new();
    for declaration in program.walk() {
        match declaration {
            Declaration::Method(method) => method_edits(method, &mut edits),
            Declaration::TypeAlias(_) | Declaration::Interface(_) => {
                edits.push(Edit::remove(whole_lines(source, declaration.span())));
            }
            Declaration::Class(class) => {
                for ivar in &class.instance_vars {
                    edits.push(Edit::remove(whole_lines(source, ivar.span)));
                }
            }
            Declaration::Module(_) => {}
        }
    }
    apply(source, edits)
}

fn method_edits(method: &MethodDef, edits: &mut Vec<Edit>) {
    let mut params = method.params.iter().peekable();
    while let Some(param) = params.next() {
        match param.group_span {
            Some(group) => {
                let mut members = vec![param];
                while let Some(next) = params.next_if(|next| next.group_span == Some(group)) {
                    members.push(next);
                }
                edits.push(Edit {
                    span: group,
                    replacement: keyword_arguments(&members),
                });
            }
            None => {
                if let Some(span) = param.slot.annotation_span {
                    edits.push(Edit::remove(span));
                }
            }
        }
    }

    if let Some(span) = method.return_slot.annotation_span {
        edits.push(Edit::remove(span));
    }
    trace!("Erased annotations of method '{}'", method.name);
}

/// `{ a: T, b: U = 1 }: Iface` → `a:, b: 1`
fn keyword_arguments(members: &[&Parameter]) -> String {
    members
        .iter()
        .map(|member| match &member.default_value {
            Some(default) => format!("{}: {}", member.name, default.trim()),
            None => format!("{}:", member.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Grow `span` to its full lines when nothing else shares them
fn whole_lines(source: &str, span: Span) -> Span {
    let bytes = source.as_bytes();
    let is_blank = |b: u8| matches!(b, b' ' | b'\t' | b'\r');

    let mut start = span.start.min(bytes.len());
    while start > 0 && is_blank(bytes[start - 1]) {
        start -= 1;
    }
    if start > 0 && bytes[start - 1] != b'\n' {
        return span;
    }

    let mut end = span.end.min(bytes.len());
    while end < bytes.len() && is_blank(bytes[end]) {
        end += 1;
    }
    match bytes.get(end) {
        None => Span::new(start, end),
        Some(b'\n') => Span::new(start, end + 1),
        // a comment or more code follows on the same line
        Some(_) => span,
    }
}

fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| (edit.span.start, edit.span.end));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        // nested inside an edit already applied
        if edit.span.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.span.start]);
        out.push_str(&edit.replacement);
        cursor = edit.span.end;
    }
    out.push_str(&source[cursor..]);
    out
}
