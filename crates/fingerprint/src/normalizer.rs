//! Pattern normalization
//!
//! Corpus patterns are written for a PCRE/Ruby style dialect. This module
//! maps the flag vocabulary onto `regex` builder options, rewrites the few
//! escapes the dialects disagree on, and compiles the result.
//!
//! Dialect notes:
//! - `^` and `$` always anchor at line boundaries
//! - a leading `(?m)` means "dot matches newline" as well
//! - unless newlines are matched, negated classes such as `[^;]` never
//!   match `\n`
//! - `\d`, `\w`, `\s` and `\b` are ASCII-only
//! - a `{` that does not open a counted repetition is a literal
//! - `\Q...\E` quotes literal text
//! - `\<` and `\>` are escaped literals, not word boundaries
//! - `\u0000` is the legacy spelling of `\x00`

use crate::document::FingerprintDocument;
use crate::fingerprint::{Example, Fingerprint};
use recog_common::{CertaintyPolicy, ExampleCase, RecogError, RecogResult};
use regex::{Regex, RegexBuilder};
use regex_syntax::ast::parse::ParserBuilder;
use regex_syntax::ast::print::Printer;
use regex_syntax::ast::{
    self, Ast, AssertionKind, ClassBracketed, ClassPerl, ClassPerlKind, ClassSet, ClassSetItem,
    ClassSetRange, ClassSetUnion, HexLiteralKind, LiteralKind, Span, SpecialLiteralKind,
};
use std::collections::HashMap;

/// Inline modifier that also implies dot-matches-newline in the dialect.
const MULTILINE_PREFIX: &str = "(?m)";

/// Compile options derived from a flag string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherOptions {
    pub case_insensitive: bool,
    pub dot_matches_new_line: bool,
}

impl MatcherOptions {
    /// Parse a flag string such as `"REG_ICASE|REG_DOT_NEWLINE"`.
    ///
    /// Tokens are separated by `|` or `,`; unknown tokens are ignored.
    #[must_use]
    pub fn from_flags(flags: &str) -> Self {
        let mut opts = Self::default();
        for token in flags.split(['|', ',']).map(str::trim) {
            match token {
                "REG_ICASE" | "IGNORECASE" => opts.case_insensitive = true,
                "REG_DOT_NEWLINE" | "REG_MULTILINE" | "REG_LINE_ANY_CRLF" => {
                    opts.dot_matches_new_line = true
                }
                _ => {}
            }
        }
        opts
    }
}

/// A pattern translated and compiled for matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub options: MatcherOptions,
}

/// Translate and compile a corpus pattern.
pub fn compile_pattern(pattern: &str, flags: &str) -> RecogResult<CompiledPattern> {
    let mut options = MatcherOptions::from_flags(flags);
    let rewritten = rewrite_escapes(pattern);

    if rewritten.starts_with(MULTILINE_PREFIX) {
        options.dot_matches_new_line = true;
    }

    let mut ast = ParserBuilder::new()
        .build()
        .parse(&rewritten)
        .map_err(|e| RecogError::Normalize {
            pattern: pattern.to_string(),
            reason: format!("bad regexp syntax: {}", e.kind()),
        })?;

    rewrite_ast(&mut ast, options.dot_matches_new_line);

    let mut printed = String::with_capacity(rewritten.len());
    Printer::new()
        .print(&ast, &mut printed)
        .map_err(|e| RecogError::Normalize {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

    let regex = RegexBuilder::new(&printed)
        .case_insensitive(options.case_insensitive)
        .dot_matches_new_line(options.dot_matches_new_line)
        .multi_line(true)
        .build()
        .map_err(|e| RecogError::Normalize {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

    Ok(CompiledPattern { regex, options })
}

/// Rewrite constructs whose meaning differs between the corpus dialect and
/// `regex`, before parsing.
fn rewrite_escapes(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1).copied() {
                Some('<') | Some('>') => {
                    out.push(chars[i + 1]);
                    i += 2;
                }
                Some('u') if chars.get(i + 2..i + 6) == Some(&['0', '0', '0', '0'][..]) => {
                    out.push_str("\\x00");
                    i += 6;
                }
                Some('Q') => {
                    i += 2;
                    while i < chars.len() && !(chars[i] == '\\' && chars.get(i + 1) == Some(&'E')) {
                        push_literal(&mut out, chars[i]);
                        i += 1;
                    }
                    i = (i + 2).min(chars.len());
                }
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                    i += 2;
                }
                None => {
                    out.push('\\');
                    i += 1;
                }
            },
            '[' if !in_class => {
                in_class = true;
                out.push('[');
                i += 1;
                if chars.get(i) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                if chars.get(i) == Some(&']') {
                    out.push_str("\\]");
                    i += 1;
                }
            }
            '[' => match posix_class_len(&chars[i..]) {
                Some(len) => {
                    out.extend(&chars[i..i + len]);
                    i += len;
                }
                None => {
                    out.push_str("\\[");
                    i += 1;
                }
            },
            ']' if in_class => {
                in_class = false;
                out.push(']');
                i += 1;
            }
            '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            '{' if !in_class => match repetition_len(&chars[i..]) {
                Some(len) => {
                    out.extend(&chars[i..i + len]);
                    i += len;
                }
                None => {
                    out.push_str("\\{");
                    i += 1;
                }
            },
            '}' if !in_class => {
                out.push_str("\\}");
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if regex_syntax::is_meta_character(c) {
        out.push('\\');
    }
    out.push(c);
}

/// Length of a `{n}`, `{n,}` or `{n,m}` quantifier at the start of `rest`.
fn repetition_len(rest: &[char]) -> Option<usize> {
    let digits = |from: usize| rest[from..].iter().take_while(|c| c.is_ascii_digit()).count();

    let mut i = 1;
    let min = digits(i);
    if min == 0 {
        return None;
    }
    i += min;
    if rest.get(i) == Some(&',') {
        i += 1;
        i += digits(i);
    }
    (rest.get(i) == Some(&'}')).then_some(i + 1)
}

/// Length of a `[:name:]` class at the start of `rest`.
fn posix_class_len(rest: &[char]) -> Option<usize> {
    if rest.get(1) != Some(&':') {
        return None;
    }
    let name = rest[2..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic() || **c == '^')
        .count();
    let end = 2 + name;
    (name > 0 && rest.get(end) == Some(&':') && rest.get(end + 1) == Some(&']')).then_some(end + 2)
}

/// Give the parsed pattern the dialect's class semantics.
///
/// Perl classes and word boundaries become ASCII-only. Without
/// `class_matches_new_line`, negated bracket classes also exclude `\n`.
fn rewrite_ast(ast: &mut Ast, class_matches_new_line: bool) {
    match ast {
        Ast::ClassPerl(perl) => {
            let ascii = ascii_perl_class(perl);
            *ast = Ast::ClassBracketed(Box::new(ascii));
        }
        Ast::ClassBracketed(class) => {
            rewrite_class_set(&mut class.kind);
            if class.negated && !class_matches_new_line {
                exclude_new_line(class);
            }
        }
        Ast::Assertion(assertion)
            if matches!(
                assertion.kind,
                AssertionKind::WordBoundary | AssertionKind::NotWordBoundary
            ) =>
        {
            let span = assertion.span;
            let inner = Ast::Assertion(assertion.clone());
            *ast = ascii_group(span, inner);
        }
        Ast::Repetition(rep) => rewrite_ast(&mut rep.ast, class_matches_new_line),
        Ast::Group(group) => rewrite_ast(&mut group.ast, class_matches_new_line),
        Ast::Alternation(alt) => {
            for ast in alt.asts.iter_mut() {
                rewrite_ast(ast, class_matches_new_line);
            }
        }
        Ast::Concat(concat) => {
            for ast in concat.asts.iter_mut() {
                rewrite_ast(ast, class_matches_new_line);
            }
        }
        _ => {}
    }
}

fn rewrite_class_set(set: &mut ClassSet) {
    match set {
        ClassSet::Item(item) => rewrite_class_item(item),
        ClassSet::BinaryOp(op) => {
            rewrite_class_set(&mut op.lhs);
            rewrite_class_set(&mut op.rhs);
        }
    }
}

fn rewrite_class_item(item: &mut ClassSetItem) {
    match item {
        ClassSetItem::Perl(perl) => {
            let ascii = ascii_perl_class(perl);
            *item = ClassSetItem::Bracketed(Box::new(ascii));
        }
        ClassSetItem::Bracketed(class) => rewrite_class_set(&mut class.kind),
        ClassSetItem::Union(union) => {
            for item in union.items.iter_mut() {
                rewrite_class_item(item);
            }
        }
        _ => {}
    }
}

/// `[^...]` becomes `[^...\n]`.
fn exclude_new_line(class: &mut ClassBracketed) {
    let span = class.span;
    let mut previous = std::mem::replace(&mut class.kind, ClassSet::Item(ClassSetItem::Empty(span)));
    let item = if let ClassSet::Item(item) = &mut previous {
        std::mem::replace(item, ClassSetItem::Empty(span))
    } else {
        ClassSetItem::Bracketed(Box::new(ClassBracketed {
            span,
            negated: false,
            kind: previous,
        }))
    };
    let new_line = ClassSetItem::Literal(literal(span, '\n'));
    class.kind = ClassSet::Item(ClassSetItem::Union(ClassSetUnion {
        span,
        items: vec![item, new_line],
    }));
}

/// ASCII bracket class equivalent to `\d`, `\w` or `\s` (or their negations).
fn ascii_perl_class(perl: &ClassPerl) -> ClassBracketed {
    let span = perl.span;
    let range = |start: char, end: char| {
        ClassSetItem::Range(ClassSetRange {
            span,
            start: literal(span, start),
            end: literal(span, end),
        })
    };
    let items = match perl.kind {
        ClassPerlKind::Digit => vec![range('0', '9')],
        ClassPerlKind::Word => vec![
            range('0', '9'),
            range('A', 'Z'),
            range('a', 'z'),
            ClassSetItem::Literal(literal(span, '_')),
        ],
        ClassPerlKind::Space => ['\t', '\n', '\x0C', '\r', ' ']
            .into_iter()
            .map(|c| ClassSetItem::Literal(literal(span, c)))
            .collect(),
    };
    ClassBracketed {
        span,
        negated: perl.negated,
        kind: ClassSet::Item(ClassSetItem::Union(ClassSetUnion { span, items })),
    }
}

/// A literal that prints unambiguously, even in verbose mode.
fn literal(span: Span, c: char) -> ast::Literal {
    let kind = match c {
        '\t' => LiteralKind::Special(SpecialLiteralKind::Tab),
        '\n' => LiteralKind::Special(SpecialLiteralKind::LineFeed),
        '\x0C' => LiteralKind::Special(SpecialLiteralKind::FormFeed),
        '\r' => LiteralKind::Special(SpecialLiteralKind::CarriageReturn),
        c if c.is_ascii_alphanumeric() || c == '_' => LiteralKind::Verbatim,
        _ => LiteralKind::HexFixed(HexLiteralKind::X),
    };
    ast::Literal { span, kind, c }
}

/// `(?-u:inner)`
fn ascii_group(span: Span, inner: Ast) -> Ast {
    Ast::Group(Box::new(ast::Group {
        span,
        kind: ast::GroupKind::NonCapturing(ast::Flags {
            span,
            items: vec![
                ast::FlagsItem {
                    span,
                    kind: ast::FlagsItemKind::Negation,
                },
                ast::FlagsItem {
                    span,
                    kind: ast::FlagsItemKind::Flag(ast::Flag::Unicode),
                },
            ],
        }),
        ast: Box::new(inner),
    }))
}

/// Flatten an example's declared attributes into a lookup. Later duplicates win.
#[must_use]
pub fn flatten_example(case: ExampleCase) -> Example {
    let lookup: HashMap<String, String> = case.attributes.iter().cloned().collect();
    Example::new(case, lookup)
}

/// Normalize one fingerprint record.
///
/// `preference` is the owning database's preference, consulted only by
/// [`CertaintyPolicy::InheritPreference`].
pub fn normalize(
    doc: FingerprintDocument,
    preference: &str,
    policy: CertaintyPolicy,
) -> RecogResult<Fingerprint> {
    let compiled = compile_pattern(&doc.pattern, &doc.flags)?;
    let certainty = policy.resolve(doc.certainty.as_deref(), preference);
    let examples = doc.examples.into_iter().map(flatten_example).collect();

    Ok(Fingerprint::from_parts(
        doc.pattern,
        doc.flags,
        certainty,
        doc.description,
        doc.params,
        examples,
        compiled,
    ))
}
