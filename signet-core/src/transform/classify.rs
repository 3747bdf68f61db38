//! Candidate detection for the instrumentation transform.
//!
//! Walks the parsed file collecting every position where a tracking guard
//! could be injected: free functions, impl methods, and closures bound to
//! an identifier. The decision of whether each candidate actually gets
//! instrumented is made by the caller from the collected facts plus the
//! configured mode; this module only gathers them.
//!
//! All content heuristics are deliberately syntactic text scans over the
//! body span. They also see inside macro invocations, which an AST walk
//! would treat as opaque token soup, and a false positive only costs an
//! inert guard.

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Block, Expr, ImplItemFn, ItemFn, Local, Pat};

use super::rewrite::{byte_offset, line_starts};
use super::{TransformOptions, TransformWarning};

/// An explicit annotation in a leading line comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    /// `// @tracked`: instrument even if heuristics would skip.
    Tracked,
    /// `// @untracked`: never instrument. Wins over everything.
    Untracked,
}

/// A function-like position the transform could instrument.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub name: String,
    /// Line of the signature, for logs and warnings.
    pub line: usize,
    /// Byte offset just past the body's opening brace.
    pub insert_offset: usize,
    /// Byte range of the whole body block, for text heuristics.
    pub body_range: (usize, usize),
    /// Leading whitespace of the signature line.
    pub indent: String,
    pub is_async: bool,
    pub marker: Option<(Marker, usize)>,
}

impl Candidate {
    /// Host-framework component convention: uppercase-first name.
    pub fn has_component_name(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }

    /// Hook convention: `use_` prefix.
    pub fn has_hook_name(&self) -> bool {
        self.name.starts_with("use_")
    }
}

/// Whether a body invokes one of the recognized view macros.
pub(crate) fn contains_view_macro(body: &str, macros: &[String]) -> bool {
    macros.iter().any(|name| body.contains(&format!("{name}!")))
}

/// Whether a body might read reactive state. Zero-argument `.get()` is the
/// signal read convention; `.get(key)` lookups don't match.
pub(crate) fn reads_signals(body: &str) -> bool {
    body.contains(".get()")
}

/// Collect all candidates and ambiguity warnings from a parsed file.
pub(crate) fn collect(
    source: &str,
    file: &syn::File,
    options: &TransformOptions,
) -> (Vec<Candidate>, Vec<TransformWarning>) {
    let lines: Vec<&str> = source.lines().collect();
    let starts = line_starts(source);
    let mut collector = Collector {
        source,
        lines: &lines,
        starts: &starts,
        options,
        candidates: Vec::new(),
        warnings: Vec::new(),
    };
    collector.visit_file(file);
    (collector.candidates, collector.warnings)
}

struct Collector<'a> {
    source: &'a str,
    lines: &'a [&'a str],
    starts: &'a [usize],
    options: &'a TransformOptions,
    candidates: Vec<Candidate>,
    warnings: Vec<TransformWarning>,
}

impl Collector<'_> {
    fn add_candidate(
        &mut self,
        name: String,
        first_line: usize,
        sig_line: usize,
        is_async: bool,
        block: &Block,
    ) {
        let open_end = block.brace_token.span.open().end();
        let body_start = byte_offset(self.source, self.starts, block.span().start());
        let body_end = byte_offset(self.source, self.starts, block.span().end());
        let indent = self
            .lines
            .get(sig_line.saturating_sub(1))
            .map(|l| {
                let trimmed = l.trim_start();
                l[..l.len() - trimmed.len()].to_string()
            })
            .unwrap_or_default();

        self.candidates.push(Candidate {
            name,
            line: sig_line,
            insert_offset: byte_offset(self.source, self.starts, open_end),
            body_range: (body_start, body_end),
            indent,
            is_async,
            marker: leading_marker(self.lines, first_line),
        });
    }

    fn first_line(attrs: &[syn::Attribute], fallback: Span) -> usize {
        attrs
            .iter()
            .map(|a| a.span().start().line)
            .min()
            .unwrap_or_else(|| fallback.start().line)
    }

    fn warn_anonymous_closure(&mut self, closure: &syn::ExprClosure) {
        let body_start = byte_offset(self.source, self.starts, closure.body.span().start());
        let body_end = byte_offset(self.source, self.starts, closure.body.span().end());
        let body = &self.source[body_start..body_end];
        if contains_view_macro(body, &self.options.view_macros) {
            self.warnings.push(TransformWarning {
                line: closure.span().start().line,
                message: "closure passed directly into a call cannot be instrumented; \
                          bind it to a name or add the tracking guard manually"
                    .to_string(),
            });
        }
    }
}

impl<'ast> Visit<'ast> for Collector<'_> {
    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        let sig_line = node.sig.fn_token.span.start().line;
        self.add_candidate(
            node.sig.ident.to_string(),
            Self::first_line(&node.attrs, node.sig.fn_token.span),
            sig_line,
            node.sig.asyncness.is_some(),
            &node.block,
        );
        visit::visit_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast ImplItemFn) {
        let sig_line = node.sig.fn_token.span.start().line;
        self.add_candidate(
            node.sig.ident.to_string(),
            Self::first_line(&node.attrs, node.sig.fn_token.span),
            sig_line,
            node.sig.asyncness.is_some(),
            &node.block,
        );
        visit::visit_impl_item_fn(self, node);
    }

    fn visit_local(&mut self, node: &'ast Local) {
        if let (Pat::Ident(pat), Some(init)) = (&node.pat, &node.init) {
            if let Expr::Closure(closure) = init.expr.as_ref() {
                // Only block-bodied closures can take a guard statement;
                // expression bodies are skipped rather than rewritten.
                if let Expr::Block(body) = closure.body.as_ref() {
                    let sig_line = node.let_token.span.start().line;
                    self.add_candidate(
                        pat.ident.to_string(),
                        Self::first_line(&node.attrs, node.let_token.span),
                        sig_line,
                        closure.asyncness.is_some(),
                        &body.block,
                    );
                }
            }
        }
        visit::visit_local(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        for arg in &node.args {
            if let Expr::Closure(closure) = arg {
                self.warn_anonymous_closure(closure);
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        for arg in &node.args {
            if let Expr::Closure(closure) = arg {
                self.warn_anonymous_closure(closure);
            }
        }
        visit::visit_expr_method_call(self, node);
    }
}

/// Scan the comment/attribute block directly above `first_line` for a
/// marker. `@untracked` short-circuits so it wins when both appear.
fn leading_marker(lines: &[&str], first_line: usize) -> Option<(Marker, usize)> {
    let mut found = None;
    let mut line = first_line.saturating_sub(1);
    while line >= 1 {
        let text = lines.get(line - 1)?.trim();
        if text == "// @untracked" {
            return Some((Marker::Untracked, line));
        }
        if text == "// @tracked" {
            found = Some((Marker::Tracked, line));
        } else if !text.starts_with("//") && !text.starts_with("#[") {
            break;
        }
        line -= 1;
    }
    found
}
