// ==============================================================================
// Keyword-call analysis
// ==============================================================================
//
// Given a keyword token and its argument tokens, produce the stream of
// specialized call parts the semantic token generator emits: the call name
// (with a BDD prefix split off), named arguments split into
// name/operator/value, and the nested structure of the run-keyword family
// (`Run Keyword`, `Run Keyword If … ELSE IF … ELSE`, `Run Keywords … AND …`,
// and the `And Return/Continue/Ignore Error` variants).
//
// Recursion depth is bounded to one: a run-keyword nested inside another
// run-keyword keeps its name classified as a call, but its own arguments
// stay plain. This covers the overwhelming share of real suites and keeps
// worst-case cost linear in the argument count.

use smol_str::SmolStr;

use robot_ast::Token;

use crate::libdoc::RunKeywordInfo;
use crate::namespace::{strip_bdd_prefix, KeywordHit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPartKind {
    KeywordCall { default_library: bool },
    /// `Given`/`When`/`Then`/`And`/`But` split off a call name.
    BddPrefix,
    Argument,
    NamedArgumentName,
    NamedArgumentOperator,
    /// `ELSE IF` / `ELSE` / `AND` markers inside run-keyword streams.
    Separator,
}

/// One classified span. Columns are Unicode scalar counts, like the tokens
/// they are carved out of; a part never spans lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPart {
    pub line: u32,
    pub col: u32,
    pub end_col: u32,
    pub value: SmolStr,
    pub kind: CallPartKind,
}

impl CallPart {
    fn from_token(token: &Token, kind: CallPartKind) -> Self {
        Self {
            line: token.line,
            col: token.col,
            end_col: token.end_col,
            value: token.value.clone(),
            kind,
        }
    }
}

pub type KeywordLookup<'a> = dyn Fn(&str) -> Option<KeywordHit> + 'a;

/// Analyze one keyword call. `args` holds the content argument tokens in
/// source order.
pub fn analyze_call(keyword: &Token, args: &[&Token], lookup: &KeywordLookup) -> Vec<CallPart> {
    let mut out = Vec::new();
    analyze_at_depth(keyword, args, lookup, 0, &mut out);
    out
}

fn analyze_at_depth(
    keyword: &Token,
    args: &[&Token],
    lookup: &KeywordLookup,
    depth: usize,
    out: &mut Vec<CallPart>,
) {
    let hit = emit_call_name(keyword, lookup, out);

    let run_keyword = hit
        .as_ref()
        .and_then(|h| h.keyword.run_keyword)
        .filter(|_| depth == 0);

    match run_keyword {
        Some(RunKeywordInfo::Plain) => analyze_nested(args, 0, lookup, out),
        Some(RunKeywordInfo::WithCondition(n)) => analyze_nested(args, n, lookup, out),
        Some(RunKeywordInfo::If) => analyze_run_keyword_if(args, lookup, out),
        Some(RunKeywordInfo::Keywords) => analyze_run_keywords(args, lookup, out),
        None => {
            for arg in args {
                emit_argument(arg, hit.as_ref(), out);
            }
        }
    }
}

fn emit_call_name(
    keyword: &Token,
    lookup: &KeywordLookup,
    out: &mut Vec<CallPart>,
) -> Option<KeywordHit> {
    let name = keyword.value.as_str();
    if let Some(rest) = strip_bdd_prefix(name) {
        // The prefix and remainder are carved out of one token; columns stay
        // scalar offsets into its value.
        let rest_offset = name.len() - rest.len();
        let prefix_scalars = name[..rest_offset].trim_end().chars().count() as u32;
        let rest_start = keyword.col + name[..rest_offset].chars().count() as u32;
        out.push(CallPart {
            line: keyword.line,
            col: keyword.col,
            end_col: keyword.col + prefix_scalars,
            value: name[..rest_offset].trim_end().into(),
            kind: CallPartKind::BddPrefix,
        });
        let hit = lookup(rest);
        out.push(CallPart {
            line: keyword.line,
            col: rest_start,
            end_col: keyword.end_col,
            value: rest.into(),
            kind: CallPartKind::KeywordCall {
                default_library: hit.as_ref().is_some_and(|h| h.default_library),
            },
        });
        return hit;
    }

    let hit = lookup(name);
    out.push(CallPart::from_token(
        keyword,
        CallPartKind::KeywordCall {
            default_library: hit.as_ref().is_some_and(|h| h.default_library),
        },
    ));
    hit
}

/// `Run Keyword`-style streams: `skip` leading plain arguments, then a
/// nested keyword name, then its actuals.
fn analyze_nested(args: &[&Token], skip: usize, lookup: &KeywordLookup, out: &mut Vec<CallPart>) {
    for arg in args.iter().take(skip) {
        out.push(CallPart::from_token(arg, CallPartKind::Argument));
    }
    let rest = &args[skip.min(args.len())..];
    let Some((name, actuals)) = rest.split_first() else {
        return;
    };
    analyze_at_depth(name, actuals, lookup, 1, out);
}

/// `condition, name, args…, [ELSE IF, condition, name, args…]*,
/// [ELSE, name, args…]?`
fn analyze_run_keyword_if(args: &[&Token], lookup: &KeywordLookup, out: &mut Vec<CallPart>) {
    let mut rest = args;
    let mut expect_condition = true;
    loop {
        let boundary = rest
            .iter()
            .position(|t| t.value == "ELSE IF" || t.value == "ELSE");
        let (clause, after) = match boundary {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, &[][..]),
        };

        let mut clause = clause;
        if expect_condition {
            if let Some((condition, remaining)) = clause.split_first() {
                out.push(CallPart::from_token(condition, CallPartKind::Argument));
                clause = remaining;
            }
        }
        if let Some((name, actuals)) = clause.split_first() {
            analyze_at_depth(name, actuals, lookup, 1, out);
        }

        let Some((marker, after)) = after.split_first() else {
            return;
        };
        out.push(CallPart::from_token(marker, CallPartKind::Separator));
        expect_condition = marker.value == "ELSE IF";
        rest = after;
    }
}

/// `name₁ args… AND name₂ args… AND …`; without any `AND`, every argument is
/// itself a zero-argument keyword call.
fn analyze_run_keywords(args: &[&Token], lookup: &KeywordLookup, out: &mut Vec<CallPart>) {
    if !args.iter().any(|t| t.value == "AND") {
        for name in args {
            analyze_at_depth(name, &[], lookup, 1, out);
        }
        return;
    }

    let mut rest = args;
    loop {
        let boundary = rest.iter().position(|t| t.value == "AND");
        let (clause, after) = match boundary {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, &[][..]),
        };
        if let Some((name, actuals)) = clause.split_first() {
            analyze_at_depth(name, actuals, lookup, 1, out);
        }
        let Some((marker, after)) = after.split_first() else {
            return;
        };
        out.push(CallPart::from_token(marker, CallPartKind::Separator));
        rest = after;
    }
}

/// Classify one argument against the target keyword's spec: an accepted
/// `name=value` literal becomes three parts, anything else passes through
/// untouched.
fn emit_argument(arg: &Token, hit: Option<&KeywordHit>, out: &mut Vec<CallPart>) {
    let Some(hit) = hit else {
        out.push(CallPart::from_token(arg, CallPartKind::Argument));
        return;
    };
    let Some(split) = split_named_argument(&arg.value) else {
        out.push(CallPart::from_token(arg, CallPartKind::Argument));
        return;
    };
    let (name, value) = split;
    if !hit.keyword.accepts_named_argument(name) {
        out.push(CallPart::from_token(arg, CallPartKind::Argument));
        return;
    }

    let name_scalars = name.chars().count() as u32;
    out.push(CallPart {
        line: arg.line,
        col: arg.col,
        end_col: arg.col + name_scalars,
        value: name.into(),
        kind: CallPartKind::NamedArgumentName,
    });
    out.push(CallPart {
        line: arg.line,
        col: arg.col + name_scalars,
        end_col: arg.col + name_scalars + 1,
        value: "=".into(),
        kind: CallPartKind::NamedArgumentOperator,
    });
    out.push(CallPart {
        line: arg.line,
        col: arg.col + name_scalars + 1,
        end_col: arg.end_col,
        value: value.into(),
        kind: CallPartKind::Argument,
    });
}

/// Split at the first unescaped `=`. An empty value is legal; a literal
/// without one (or with only escaped ones) is not a named argument.
fn split_named_argument(literal: &str) -> Option<(&str, &str)> {
    let mut chars = literal.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '=' => return Some((&literal[..i], &literal[i + 1..])),
            _ => {}
        }
    }
    None
}
