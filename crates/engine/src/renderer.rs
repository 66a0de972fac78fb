//! Literal placeholder substitution for sequence email copy.
//!
//! Substitution is exact token replacement, not templating — no
//! conditionals, loops, or escaping. Rendering is pure: the same pattern
//! and context always produce the same output.

use serde::{Deserialize, Serialize};

use cadence_core::types::Lead;

pub const FIRST_NAME_TOKEN: &str = "{first_name}";
pub const COMPANY_NAME_TOKEN: &str = "{company_name}";

/// Filler used when a lead has no first name.
pub const FIRST_NAME_FALLBACK: &str = "there";
/// Filler used when a lead has no company.
pub const COMPANY_NAME_FALLBACK: &str = "our company";

/// The token values available to a pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderContext {
    pub first_name: Option<String>,
    pub company_name: Option<String>,
}

impl RenderContext {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            first_name: lead.first_name.clone(),
            company_name: lead.company_name.clone(),
        }
    }
}

/// Replace the supported tokens in `pattern`, falling back to generic
/// filler for missing or blank context values.
pub fn render(pattern: &str, ctx: &RenderContext) -> String {
    let first_name = ctx
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(FIRST_NAME_FALLBACK);
    let company_name = ctx
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(COMPANY_NAME_FALLBACK);

    pattern
        .replace(FIRST_NAME_TOKEN, first_name)
        .replace(COMPANY_NAME_TOKEN, company_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(first: Option<&str>, company: Option<&str>) -> RenderContext {
        RenderContext {
            first_name: first.map(str::to_string),
            company_name: company.map(str::to_string),
        }
    }

    #[test]
    fn test_substitutes_tokens() {
        let out = render(
            "Hi {first_name}, how are things at {company_name}?",
            &ctx(Some("Ava"), Some("Northwind")),
        );
        assert_eq!(out, "Hi Ava, how are things at Northwind?");
    }

    #[test]
    fn test_missing_values_fall_back() {
        let out = render(
            "Hi {first_name} from {company_name}",
            &ctx(None, None),
        );
        assert_eq!(out, "Hi there from our company");

        // Blank values are treated as missing too.
        let out = render("Hi {first_name}", &ctx(Some("   "), None));
        assert_eq!(out, "Hi there");
    }

    #[test]
    fn test_repeated_tokens() {
        let out = render(
            "{first_name}, {first_name}!",
            &ctx(Some("Ben"), None),
        );
        assert_eq!(out, "Ben, Ben!");
    }

    #[test]
    fn test_pure_and_idempotent() {
        let context = ctx(Some("Carol"), Some("Contoso"));
        let once = render("Hello {first_name} at {company_name}", &context);
        let twice = render("Hello {first_name} at {company_name}", &context);
        assert_eq!(once, twice);

        // Output with no remaining tokens renders to itself.
        assert_eq!(render(&once, &context), once);
    }

    #[test]
    fn test_unknown_tokens_left_alone() {
        let out = render("Hi {last_name}", &ctx(Some("Dan"), None));
        assert_eq!(out, "Hi {last_name}");
    }
}
