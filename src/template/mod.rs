//! Placeholder substitution over raw document text.
//!
//! Substitution runs before structural parsing and never inspects document
//! structure; it is a pure text rewrite. The syntax follows shell-style
//! placeholders:
//!
//! - `${name}` and `$name` are replaced with the argument bound to `name`
//! - `$$` escapes to a literal `$`
//! - a placeholder whose name has no binding is left **verbatim**
//!
//! An empty argument map disables the rewrite entirely, `$$` included; the
//! escape only has meaning in text that is actually being templated.
//!
//! Leaving unknown placeholders untouched is what makes partial templating
//! work: an outer caller resolves some names and hands the text on, and a
//! later pass (or nobody) resolves the rest.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Named template arguments.
///
/// Ordered and hashable, so an argument set can participate in the document
/// cache key; two argument maps with the same entries always compare and
/// hash equal regardless of construction order.
pub type TemplateArgs = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("placeholder pattern is valid")
});

/// Rewrites `source`, replacing known placeholders with their arguments.
///
/// Unknown placeholders are left verbatim; this never fails. With no
/// arguments the text is returned untouched, so `$$` survives as-is.
#[must_use]
pub fn substitute(source: &str, args: &TemplateArgs) -> String {
    if args.is_empty() {
        return source.to_string();
    }
    PLACEHOLDER
        .replace_all(source, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match args.get(name) {
                Some(value) => value.clone(),
                // No binding: keep the original text untouched.
                None => caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string(),
            }
        })
        .into_owned()
}

/// Builds a [`TemplateArgs`] map from `key=value` pairs.
///
/// # Errors
///
/// Returns an error message for any entry without a `=`.
pub fn parse_arg_pairs<I, S>(pairs: I) -> Result<TemplateArgs, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = TemplateArgs::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid template argument '{pair}', expected key=value"))?;
        args.insert(key.to_string(), value.to_string());
    }
    Ok(args)
}
