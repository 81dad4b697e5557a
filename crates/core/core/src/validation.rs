//! Form validation.
//!
//! A [`Validator`] holds rules per field and checks a JSON object, collecting
//! every failure per field instead of stopping at the first one.
//!
//! ```rust,ignore
//! let validator = Validator::new()
//!     .field("slug", [Rule::Required, Rule::Slug, Rule::MaxLength(48)])
//!     .field("owner_email", [Rule::Required, Rule::Email]);
//! validator.validate(&body)?;
//! ```

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{OwnerError, OwnerResult};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?)://[A-Za-z0-9\-._~%]+(:\d+)?(/\S*)?$").expect("url pattern is valid"));

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug pattern is valid"));

/// A single validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Present, non-null, and not an empty or blank string.
    Required,
    /// Minimum length in characters.
    MinLength(usize),
    /// Maximum length in characters.
    MaxLength(usize),
    Email,
    /// An http(s) URL; `https_only` rejects plain http.
    Url { https_only: bool },
    /// Lowercase letters, digits and single hyphens.
    Slug,
    /// One of a fixed set of strings.
    OneOf(Vec<String>),
    /// Number within an inclusive range.
    Range { min: f64, max: f64 },
    /// Matches a regular expression.
    Pattern { regex: Regex, message: String },
    /// A non-negative integer.
    WholeNumber,
    /// An array of strings.
    StringList,
    /// An object whose values are all strings.
    StringMap,
    /// Any structured value `accepts` approves of.
    Shape {
        accepts: fn(&Value) -> bool,
        message: &'static str,
    },
}

impl Rule {
    /// Builds a `OneOf` rule.
    pub fn one_of(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Rule::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Builds a `Pattern` rule, failing on an invalid expression.
    pub fn pattern(pattern: &str, message: impl Into<String>) -> OwnerResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| OwnerError::config(format!("invalid validation pattern: {}", e)))?;
        Ok(Rule::Pattern {
            regex,
            message: message.into(),
        })
    }

    /// Checks a present value; returns the failure message.
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            Rule::Required => None,
            Rule::MinLength(min) => {
                let len = text_len(value)?;
                (len < *min).then(|| format!("must be at least {} characters", min))
            }
            Rule::MaxLength(max) => {
                let len = text_len(value)?;
                (len > *max).then(|| format!("must be at most {} characters", max))
            }
            Rule::Email => match value.as_str() {
                Some(s) if EMAIL.is_match(s.trim()) => None,
                _ => Some("must be a valid email address".to_string()),
            },
            Rule::Url { https_only } => match value.as_str().and_then(|s| URL.captures(s.trim())) {
                Some(caps) if *https_only && &caps[1] != "https" => Some("must use https".to_string()),
                Some(_) => None,
                None => Some("must be a valid URL".to_string()),
            },
            Rule::Slug => match value.as_str() {
                Some(s) if SLUG.is_match(s) => None,
                _ => Some("must contain only lowercase letters, digits and hyphens".to_string()),
            },
            Rule::OneOf(options) => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => None,
                _ => Some(format!("must be one of: {}", options.join(", "))),
            },
            Rule::Range { min, max } => match value.as_f64() {
                Some(n) if n >= *min && n <= *max => None,
                _ => Some(format!("must be between {} and {}", min, max)),
            },
            Rule::Pattern { regex, message } => match value.as_str() {
                Some(s) if regex.is_match(s) => None,
                _ => Some(message.clone()),
            },
            Rule::WholeNumber => value.as_u64().is_none().then(|| "must be a whole number".to_string()),
            Rule::StringList => match value.as_array() {
                Some(items) if items.iter().all(Value::is_string) => None,
                _ => Some("must be a list of strings".to_string()),
            },
            Rule::StringMap => match value.as_object() {
                Some(map) if map.values().all(Value::is_string) => None,
                _ => Some("must be an object of string values".to_string()),
            },
            Rule::Shape { accepts, message } => (!accepts(value)).then(|| message.to_string()),
        }
    }
}

fn text_len(value: &Value) -> Option<usize> {
    value.as_str().map(|s| s.chars().count())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Failures collected per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one field.
    pub fn field(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok` when empty, otherwise [`OwnerError::Validation`].
    pub fn into_result(self) -> OwnerResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(OwnerError::Validation { errors: self.errors })
        }
    }
}

/// Rules for the fields of one form.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rules for a field.
    pub fn field(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields.push((name.into(), rules.into_iter().collect()));
        self
    }

    /// Runs every rule and collects the failures.
    ///
    /// Optional fields that are absent or blank are skipped.
    pub fn check(&self, data: &Value) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (name, rules) in &self.fields {
            let value = data.get(name);
            if is_blank(value) {
                if rules.iter().any(|r| matches!(r, Rule::Required)) {
                    errors.add(name, "is required");
                }
                continue;
            }
            let Some(value) = value else { continue };
            for rule in rules {
                if let Some(message) = rule.check(value) {
                    errors.add(name, message);
                }
            }
        }
        errors
    }

    /// Like [`check`](Self::check) but returns an error when anything failed.
    pub fn validate(&self, data: &Value) -> OwnerResult<()> {
        self.check(data).into_result()
    }
}
