//! Markup attributes and their normalization into layer options.

use std::collections::BTreeMap;

use crate::expression::{ExpressionEvaluator, Resolution, Scope};
use crate::value::{OptionMap, OptionValue};

/// Normalized option record handed to layer builders.
pub type LayerOptions = OptionMap;

/// Attributes carrying the layer kind.
pub const KIND_ATTRIBUTES: &[&str] = &["lyrType", "kind"];
/// Attributes carrying the layer URL.
pub const URL_ATTRIBUTES: &[&str] = &["lyrUrl", "url"];
/// Attributes carrying the explicit options object.
pub const OPTIONS_ATTRIBUTES: &[&str] = &["lyrOptions", "options"];
/// Attribute carrying the layer name.
pub const NAME_ATTRIBUTE: &str = "name";

/// Attributes of a layer element that never become options.
pub const LAYER_RESERVED: &[&str] = &[
    "lyrType",
    "kind",
    "lyrUrl",
    "url",
    "lyrOptions",
    "options",
    "name",
];

/// Raw attributes of one markup element, keyed by normalized name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    attributes: BTreeMap<String, String>,
}

impl AttributeBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, builder style. The name is normalized with [`normalize_name`].
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds an attribute. The name is normalized with [`normalize_name`].
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(normalize_name(name), value.into());
    }

    /// Raw value of an attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Raw value of the first present attribute among `names`.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Layer kind attribute.
    pub fn kind(&self) -> Option<&str> {
        self.first_of(KIND_ATTRIBUTES)
    }

    /// Layer URL attribute.
    pub fn url(&self) -> Option<&str> {
        self.first_of(URL_ATTRIBUTES)
    }

    /// Layer name attribute.
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_ATTRIBUTE)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for AttributeBag {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut bag = Self::new();
        for (name, value) in iter {
            bag.insert(name.as_ref(), value);
        }
        bag
    }
}

/// Converts a markup attribute name into its camel case form.
///
/// `x-` and `data-` prefixes are dropped and `-`, `:` and `_` separate words, so `lyr-type`,
/// `data-lyr-type`, `lyr:type` and `lyrType` all normalize to `lyrType`.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let stripped = ["data-", "x-"]
        .iter()
        .find_map(|prefix| lower.starts_with(prefix).then(|| &name[prefix.len()..]))
        .unwrap_or(name);

    let mut out = String::with_capacity(stripped.len());
    let mut upper_next = false;
    for ch in stripped.chars() {
        match ch {
            '-' | ':' | '_' => upper_next = !out.is_empty(),
            c if upper_next => {
                out.extend(c.to_uppercase());
                upper_next = false;
            }
            c => out.push(c),
        }
    }
    out
}

/// Turns attribute bags into option records.
pub struct AttributeNormalizer<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
    scope: &'a Scope,
}

impl<'a> AttributeNormalizer<'a> {
    /// Creates a normalizer resolving expressions with `evaluator` against `scope`.
    pub fn new(evaluator: &'a dyn ExpressionEvaluator, scope: &'a Scope) -> Self {
        Self { evaluator, scope }
    }

    /// Resolves a single attribute string.
    pub fn resolve(&self, raw: &str) -> Resolution {
        self.evaluator.resolve(raw, self.scope)
    }

    /// Builds the option record of an element.
    ///
    /// Every attribute outside `reserved` is resolved individually. The explicit options object
    /// (see [`OPTIONS_ATTRIBUTES`]) is then merged on top, so its keys win.
    pub fn normalize(&self, bag: &AttributeBag, reserved: &[&str]) -> LayerOptions {
        let mut options = LayerOptions::new();

        for (key, raw) in bag.iter().filter(|(key, _)| !reserved.contains(key)) {
            let mut value = self.resolve(raw).into_value();
            if key == "version" && !value.is_numeric() {
                value = OptionValue::String(raw.to_string());
            }
            options.insert(key.to_string(), value);
        }

        if let Some(raw) = bag.first_of(OPTIONS_ATTRIBUTES) {
            match self.resolve(raw) {
                Resolution::Resolved(OptionValue::Object(explicit)) => options.extend(explicit),
                Resolution::Resolved(OptionValue::Null) => {}
                other => log::warn!("Layer options `{raw}` are not an object, ignoring: {other:?}"),
            }
        }

        options
    }
}
