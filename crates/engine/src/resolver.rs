//! Template key resolver
//!
//! Resolves lock key expressions of the form `"#lockName"` or
//! `"stock-#id"` against a protected call's arguments.
//!
//! ## Syntax
//!
//! - `#name` is replaced by the argument bound to parameter `name`
//! - `#p0` / `#a0` is replaced by the argument at index 0 (any index works)
//! - every other character is copied literally
//!
//! A placeholder name is the longest run of ASCII alphanumerics and `_`
//! following the `#`. Named parameters take precedence over the index forms,
//! so a parameter actually called `p0` is still found by name.

use strata_core::traits::KeyResolver;
use strata_core::{StrataError, StrataResult, Value};

/// Placeholder marker
const MARKER: char = '#';

/// Pure template resolver over parameter names and indexes
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateKeyResolver;

impl TemplateKeyResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }

    fn lookup<'v>(
        param_names: &[&str],
        param_values: &'v [Value],
        expression: &str,
        placeholder: &str,
    ) -> StrataResult<&'v Value> {
        if let Some(pos) = param_names.iter().position(|name| *name == placeholder) {
            return Ok(&param_values[pos]);
        }

        let index = placeholder
            .strip_prefix('p')
            .or_else(|| placeholder.strip_prefix('a'))
            .and_then(|digits| digits.parse::<usize>().ok());

        match index {
            Some(i) => param_values.get(i).ok_or_else(|| {
                StrataError::key_resolution(
                    expression,
                    format!("argument index {} out of range ({} arguments)", i, param_values.len()),
                )
            }),
            None => Err(StrataError::key_resolution(
                expression,
                format!("unknown parameter '{}'", placeholder),
            )),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl KeyResolver for TemplateKeyResolver {
    fn resolve(
        &self,
        param_names: &[&str],
        param_values: &[Value],
        expression: &str,
    ) -> StrataResult<String> {
        if param_names.len() != param_values.len() {
            return Err(StrataError::key_resolution(
                expression,
                format!(
                    "{} parameter names but {} arguments",
                    param_names.len(),
                    param_values.len()
                ),
            ));
        }

        let mut resolved = String::with_capacity(expression.len());
        let mut rest = expression;

        while let Some(start) = rest.find(MARKER) {
            resolved.push_str(&rest[..start]);
            let after = &rest[start + MARKER.len_utf8()..];
            let end = after
                .char_indices()
                .find(|(_, c)| !is_ident_char(*c))
                .map_or(after.len(), |(i, _)| i);

            if end == 0 {
                let offset = expression.len() - rest.len() + start;
                return Err(StrataError::key_resolution(
                    expression,
                    format!("'{}' at offset {} is not followed by a parameter", MARKER, offset),
                ));
            }

            let value = Self::lookup(param_names, param_values, expression, &after[..end])?;
            resolved.push_str(&value.to_string());
            rest = &after[end..];
        }
        resolved.push_str(rest);

        Ok(resolved)
    }
}
