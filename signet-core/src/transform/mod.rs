//! Auto-Instrumentation Transform
//!
//! A build-time source-to-source rewrite that finds render-like functions
//! and injects a tracking guard as the first statement of their bodies:
//!
//! ```rust,ignore
//! fn Counter() -> View {
//!     let __tracking_guard = signet_core::render::enter_render_scope();
//!     // original body, unchanged
//! }
//! ```
//!
//! The guard's `Drop` releases the scope, so early returns, `?`, and
//! panics all stay balanced without wrapping the body in anything.
//!
//! # How It Works
//!
//! 1. The source is parsed with `syn` and every instrumentable position is
//!    collected: free functions, impl methods, closures bound to an
//!    identifier.
//!
//! 2. Each candidate is judged by the configured mode, name conventions,
//!    body heuristics, and explicit markers. Anything the transform cannot
//!    resolve statically is skipped; a missed function still works, it
//!    just needs a manual guard.
//!
//! 3. Qualifying bodies get the guard statement spliced in by byte
//!    offset. Untouched code comes out byte-identical, and output that is
//!    run through the transform again comes out unchanged, because a body
//!    that already mentions the hook is never re-instrumented.

mod classify;
mod rewrite;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use classify::Marker;
use rewrite::{line_span, line_starts, Edit};

/// How aggressively the transform selects functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// Components that both build views and read signals; hooks that read
    /// signals.
    #[default]
    Auto,
    /// Only functions opted in with a `// @tracked` marker.
    Manual,
    /// Every component that builds views, whether or not a signal read is
    /// visible; hooks still need a visible read.
    All,
}

/// Transform configuration, deserializable from build-tool JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub mode: TransformMode,
    /// Module path the guard call is qualified with.
    pub import_source: String,
    /// Name of the guard function to inject.
    pub hook_name: String,
    /// Macro names treated as view construction.
    pub view_macros: Vec<String>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            mode: TransformMode::default(),
            import_source: "signet_core::render".to_string(),
            hook_name: "enter_render_scope".to_string(),
            view_macros: vec!["view".to_string()],
        }
    }
}

impl TransformOptions {
    /// Parse options from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, TransformError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A non-fatal finding reported alongside the rewritten source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformWarning {
    pub line: usize,
    pub message: String,
}

/// Result of a successful transform run.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// The rewritten source. Identical to the input when nothing matched.
    pub code: String,
    /// Names of the functions that received a guard, in source order.
    pub instrumented: Vec<String>,
    pub warnings: Vec<TransformWarning>,
}

/// Errors the transform can fail with.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to parse source: {0}")]
    Parse(#[from] syn::Error),
    #[error("invalid transform options: {0}")]
    Config(#[from] serde_json::Error),
}

/// Rewrite `source`, injecting tracking guards into qualifying functions.
///
/// The rewrite is semantically transparent: same return values, same
/// panics, same execution counts. The only addition is the guard statement
/// at the top of each instrumented body. Running the transform on its own
/// output is a no-op.
pub fn transform_source(
    source: &str,
    options: &TransformOptions,
) -> Result<TransformOutput, TransformError> {
    let file: syn::File = syn::parse_file(source)?;
    let (candidates, mut warnings) = classify::collect(source, &file, options);

    let starts = line_starts(source);
    let mut edits = Vec::new();
    let mut instrumented = Vec::new();

    for candidate in &candidates {
        if matches!(candidate.marker, Some((Marker::Untracked, _))) {
            debug!(name = %candidate.name, line = candidate.line, "skipped: opted out");
            continue;
        }
        if candidate.is_async {
            debug!(name = %candidate.name, line = candidate.line, "skipped: async");
            continue;
        }

        let body = &source[candidate.body_range.0..candidate.body_range.1];
        if body.contains(&options.hook_name) {
            debug!(
                name = %candidate.name,
                line = candidate.line,
                "skipped: already instrumented"
            );
            continue;
        }

        let opted_in = matches!(candidate.marker, Some((Marker::Tracked, _)));
        let builds_view = classify::contains_view_macro(body, &options.view_macros);
        let reads = classify::reads_signals(body);
        let qualifies = opted_in
            || match options.mode {
                TransformMode::Manual => false,
                TransformMode::Auto => {
                    (candidate.has_component_name() && builds_view && reads)
                        || (candidate.has_hook_name() && reads)
                }
                TransformMode::All => {
                    (candidate.has_component_name() && builds_view)
                        || (candidate.has_hook_name() && reads)
                }
            };
        if !qualifies {
            continue;
        }

        debug!(name = %candidate.name, line = candidate.line, "instrumenting");
        edits.push(Edit::Insert {
            offset: candidate.insert_offset,
            text: format!(
                "\n{}    let __tracking_guard = {}::{}();",
                candidate.indent, options.import_source, options.hook_name
            ),
        });
        if let Some((_, marker_line)) = candidate.marker {
            let (start, end) = line_span(source, &starts, marker_line);
            edits.push(Edit::DeleteLine { start, end });
        }
        instrumented.push(candidate.name.clone());
    }

    for warning in &warnings {
        warn!(line = warning.line, "{}", warning.message);
    }
    warnings.sort_by_key(|w| w.line);

    Ok(TransformOutput {
        code: rewrite::apply(source, edits),
        instrumented,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(source: &str) -> TransformOutput {
        transform_source(source, &TransformOptions::default()).expect("transform succeeds")
    }

    fn transform_with_mode(source: &str, mode: TransformMode) -> TransformOutput {
        let options = TransformOptions {
            mode,
            ..TransformOptions::default()
        };
        transform_source(source, &options).expect("transform succeeds")
    }

    const COUNTER: &str = r#"fn Counter() -> View {
    let count = use_count();
    view! { "count is " (count.get()) }
}
"#;

    #[test]
    fn auto_mode_instruments_signal_reading_components() {
        let output = transform(COUNTER);
        assert_eq!(output.instrumented, vec!["Counter"]);
        assert!(output
            .code
            .contains("let __tracking_guard = signet_core::render::enter_render_scope();"));
        // The guard is the first statement of the body.
        let guard_pos = output.code.find("__tracking_guard").expect("guard injected");
        let body_pos = output.code.find("let count").expect("body kept");
        assert!(guard_pos < body_pos);
    }

    #[test]
    fn auto_mode_skips_components_without_signal_reads() {
        let source = r#"fn Static() -> View {
    view! { "no signals here" }
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
        assert_eq!(output.code, source);
    }

    #[test]
    fn all_mode_instruments_components_without_visible_reads() {
        let source = r#"fn Static() -> View {
    view! { "no signals here" }
}
"#;
        let output = transform_with_mode(source, TransformMode::All);
        assert_eq!(output.instrumented, vec!["Static"]);
    }

    #[test]
    fn hooks_with_signal_reads_are_instrumented() {
        let source = r#"fn use_doubled(s: &Signal<i32>) -> i32 {
    s.get() * 2
}
"#;
        let output = transform(source);
        assert_eq!(output.instrumented, vec!["use_doubled"]);
    }

    #[test]
    fn lowercase_helpers_are_left_alone() {
        let source = r#"fn helper(s: &Signal<i32>) -> i32 {
    s.get()
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
        assert_eq!(output.code, source);
    }

    #[test]
    fn manual_mode_only_takes_marked_functions() {
        let source = r#"// @tracked
fn helper(s: &Signal<i32>) -> i32 {
    s.get()
}

fn Counter() -> View {
    view! { (count.get()) }
}
"#;
        let output = transform_with_mode(source, TransformMode::Manual);
        assert_eq!(output.instrumented, vec!["helper"]);
        // The marker line is stripped from the instrumented function.
        assert!(!output.code.contains("@tracked"));
    }

    #[test]
    fn untracked_marker_suppresses_heuristics() {
        let source = r#"// @untracked
fn Counter() -> View {
    view! { (count.get()) }
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
        // Opt-out markers stay in place.
        assert_eq!(output.code, source);
    }

    #[test]
    fn async_functions_are_skipped() {
        let source = r#"// @tracked
async fn Loader() -> View {
    view! { (data.get()) }
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
    }

    #[test]
    fn transform_is_idempotent() {
        let once = transform(COUNTER);
        let twice = transform(&once.code);
        assert!(twice.instrumented.is_empty());
        assert_eq!(twice.code, once.code);
    }

    #[test]
    fn manual_wrap_is_not_double_instrumented() {
        let source = r#"fn Counter() -> View {
    let _guard = signet_core::render::enter_render_scope();
    view! { (count.get()) }
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
        assert_eq!(output.code, source);
    }

    #[test]
    fn bound_closure_components_are_instrumented() {
        let source = r#"fn make() {
    let Widget = move || {
        view! { (count.get()) }
    };
    mount(Widget);
}
"#;
        let output = transform(source);
        assert_eq!(output.instrumented, vec!["Widget"]);
    }

    #[test]
    fn anonymous_view_closures_produce_a_warning() {
        let source = r#"fn mount_app() {
    mount(|| {
        view! { (count.get()) }
    });
}
"#;
        let output = transform(source);
        assert!(output.instrumented.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.code, source);
    }

    #[test]
    fn untouched_files_come_back_byte_identical() {
        let source = "//! Module docs.\n\nconst X: i32 = 1; // trailing\n";
        let output = transform(source);
        assert_eq!(output.code, source);
    }

    #[test]
    fn invalid_source_is_a_parse_error() {
        let err = transform_source("fn broken( {", &TransformOptions::default());
        assert!(matches!(err, Err(TransformError::Parse(_))));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options = TransformOptions::from_json(r#"{"mode": "all"}"#).expect("valid json");
        assert_eq!(options.mode, TransformMode::All);
        assert_eq!(options.hook_name, "enter_render_scope");
        assert_eq!(options.view_macros, vec!["view"]);

        let err = TransformOptions::from_json(r#"{"mode": "everything"}"#);
        assert!(matches!(err, Err(TransformError::Config(_))));
    }

    #[test]
    fn custom_hook_and_import_source() {
        let options = TransformOptions {
            import_source: "my_runtime".to_string(),
            hook_name: "track".to_string(),
            ..TransformOptions::default()
        };
        let output = transform_source(COUNTER, &options).expect("transform succeeds");
        assert!(output
            .code
            .contains("let __tracking_guard = my_runtime::track();"));
    }
}
