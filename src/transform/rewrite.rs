//! Source edits, as values, and the splice that applies them.
use std::path::Path;

use serde_json::Value;

use crate::host::relative_path;
use crate::syntax::Span;

use super::locate::CallSite;
use super::print;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Text inserted right before a call's closing parenthesis.
    AppendArgument { at: u32, text: String },
    /// A whole string literal, quotes included.
    ImportSource { span: Span, text: String },
}

impl Replacement {
    pub fn append_argument(site: &CallSite, argument: &Value) -> Self {
        let literal = print::expression(argument);
        let text = match (site.has_args, site.trailing_comma) {
            (false, _) => literal,
            (true, true) => format!(" {literal}"),
            (true, false) => format!(", {literal}"),
        };
        Replacement::AppendArgument { at: site.close_paren, text }
    }

    /// Swaps the specifier of the literal at `span`, keeping its quote style.
    pub fn import_source(original: &str, span: Span, specifier: &str) -> Self {
        let quote = original.chars().next().filter(|c| matches!(c, '\'' | '"')).unwrap_or('\'');
        Replacement::ImportSource { span, text: format!("{quote}{specifier}{quote}") }
    }

    pub fn span(&self) -> Span {
        match self {
            Replacement::AppendArgument { at, .. } => Span::new(*at, *at),
            Replacement::ImportSource { span, .. } => *span,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Replacement::AppendArgument { text, .. } | Replacement::ImportSource { text, .. } => text,
        }
    }
}

/// `../runTimeValidations` for a file one directory below the base.
pub fn generated_module_specifier(file_dir: &Path, base_dir: &Path, module: &str) -> String {
    format!("{}/{module}", relative_path(file_dir, base_dir))
}

/// Applies `replacements` in offset order. A replacement that starts
/// inside an earlier one is dropped.
pub fn apply(text: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by_key(|r| {
        let span = r.span();
        (span.start, span.end)
    });
    let extra: usize = replacements.iter().map(|r| r.text().len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0usize;
    for replacement in &replacements {
        let span = replacement.span();
        let (start, end) = (span.start as usize, span.end as usize);
        if start < cursor {
            tracing::warn!(start, end, "dropping overlapping replacement");
            continue;
        }
        out.push_str(text.get(cursor..start).unwrap_or_default());
        out.push_str(replacement.text());
        cursor = end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TypeArena;
    use crate::host::TypeKind;
    use crate::transform::locate::CallShape;
    use serde_json::json;

    fn site(close_paren: u32, has_args: bool, trailing_comma: bool) -> CallSite {
        let target = TypeArena::new().intern(TypeKind::TypeParam("T".into()));
        CallSite {
            span: Span::new(0, close_paren + 1),
            close_paren,
            has_args,
            trailing_comma,
            shape: CallShape::GenericArgument,
            target,
        }
    }

    #[test]
    fn arguments_are_appended_before_the_closing_paren() {
        let reference = json!({ "$ref": "root#/definitions/A" });
        let src = "v<A>(x)";
        let out = apply(src, vec![Replacement::append_argument(&site(6, true, false), &reference)]);
        assert_eq!(out, r##"v<A>(x, { "$ref": "root#/definitions/A" })"##);

        let src = "v<A>(\n  x,\n)";
        let out = apply(src, vec![Replacement::append_argument(&site(11, true, true), &reference)]);
        assert_eq!(out, "v<A>(\n  x,\n { \"$ref\": \"root#/definitions/A\" })");

        let src = "v<A>()";
        let out = apply(src, vec![Replacement::append_argument(&site(5, false, false), &reference)]);
        assert_eq!(out, r##"v<A>({ "$ref": "root#/definitions/A" })"##);
    }

    #[test]
    fn import_sources_keep_their_quotes() {
        let src = r#"import { isType } from "ts-audit";"#;
        let span = Span::new(23, 33);
        let out = apply(src, vec![Replacement::import_source(&src[23..33], span, "../runTimeValidations")]);
        assert_eq!(out, r#"import { isType } from "../runTimeValidations";"#);
    }

    #[test]
    fn specifiers_are_relative_to_the_base_directory() {
        let base = Path::new("/p/src");
        assert_eq!(generated_module_specifier(base, base, "runTimeValidations"), "./runTimeValidations");
        assert_eq!(
            generated_module_specifier(Path::new("/p/src/a/b"), base, "runTimeValidations"),
            "../../runTimeValidations"
        );
    }

    #[test]
    fn replacements_apply_in_offset_order() {
        let src = "abcdef";
        let out = apply(
            src,
            vec![
                Replacement::AppendArgument { at: 4, text: "X".into() },
                Replacement::ImportSource { span: Span::new(0, 2), text: "Y".into() },
                Replacement::ImportSource { span: Span::new(1, 3), text: "Z".into() },
            ],
        );
        assert_eq!(out, "YcdXef");
    }
}
