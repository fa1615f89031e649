//! Hash-tag annotation parser.
//!
//! A message such as
//!
//! ```text
//! Operation failed #app=MyApp #opn=save #rsn=orders.db #rcd=5 #msg='disk #2 full'
//! ```
//!
//! is split into its plain-text prefix (`Operation failed`) and an annotation
//! map. An annotation is the delimiter, a key token and `=`; its value runs up
//! to the next annotation and is trimmed, unless it starts with a single quote,
//! in which case it runs to the closing quote and may contain the delimiter.
//!
//! User fields may carry an explicit type: `#%l/order=42` or
//! `#%d:currency/amount=9.99`. The value is converted at parse time and falls
//! back to a string when it does not fit the declared type.
//!
//! The parser never fails. Anything it cannot interpret stays plain text.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tagtrack_activity::{DataType, Property, PropertyValue};
use tracing::debug;

pub const DEFAULT_DELIMITER: char = '#';

/// Annotation keys the engine interprets itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ControlKey {
    /// Begin an activity
    Beg,
    /// End the current activity
    End,
    /// Application / source name
    App,
    /// User name
    Usr,
    /// Correlator
    Cid,
    /// User tag
    Tag,
    /// Location
    Loc,
    /// Operation name
    Opn,
    /// Operation type
    Opt,
    /// Resource name
    Rsn,
    /// Message text
    Msg,
    /// Severity
    Sev,
    /// Completion code
    Ccd,
    /// Reason code
    Rcd,
    /// Exception text
    Exc,
    /// Elapsed time, microseconds
    Elt,
    /// Message age, microseconds
    Age,
    /// Start time, microseconds since epoch
    Stt,
    /// End time, microseconds since epoch
    Ent,
}

/// A user-defined field, typed at parse time
#[derive(Debug, Clone, PartialEq)]
pub struct UserField {
    /// Key as written, case preserved
    pub name: String,
    /// Value text as written
    pub raw: String,
    pub value: PropertyValue,
    pub value_type: Option<String>,
}

impl UserField {
    pub fn to_property(&self) -> Property {
        Property::new(self.name.clone(), self.value.clone()).with_value_type(self.value_type.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Control(ControlKey, String),
    Field(UserField),
}

impl Annotation {
    /// Raw value text
    pub fn value(&self) -> &str {
        match self {
            Annotation::Control(_, value) => value,
            Annotation::Field(field) => &field.raw,
        }
    }
}

// `%[type][:value-type]/name` form of a user field key
static TYPED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%(?P<dt>[silfndbSILFNDB])?(?::(?P<vt>[A-Za-z0-9_]+))?/(?P<name>[A-Za-z0-9_.\-]+)$")
        .expect("invalid regex")
});

// Key token plus `=` directly after a delimiter
static ANNOTATION_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[A-Za-z0-9_]+|%[silfndbSILFNDB]?(?::[A-Za-z0-9_]+)?/[A-Za-z0-9_.\-]+)=")
        .expect("invalid regex")
});

// Map key of a user field. Control keys are bare words, so prefixed field
// keys never replace a control entry of the same name.
fn field_key(name: &str) -> String {
    format!("%/{}", name.to_lowercase())
}

/// Annotation map of one record. Keys are case-insensitive and unique; the
/// last occurrence of a key wins. Control keys and user fields are kept apart,
/// so `#%s/rsn=x` and `#rsn=y` both survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    entries: IndexMap<String, Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build annotations from host-supplied structured fields.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        let mut annotations = Self::new();
        for (key, value) in fields {
            annotations.insert(key, value.clone());
        }
        annotations
    }

    /// Insert an annotation. Returns `false` when the key is empty.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let value = value.into();

        if let Ok(control) = key.parse::<ControlKey>() {
            self.entries
                .insert(control.as_ref().to_string(), Annotation::Control(control, value));
            return true;
        }

        let (name, data_type, value_type) = match TYPED_KEY.captures(key) {
            Some(caps) => (
                caps["name"].to_string(),
                caps.name("dt")
                    .and_then(|m| m.as_str().chars().next())
                    .and_then(DataType::from_letter)
                    .unwrap_or_default(),
                caps.name("vt").map(|m| m.as_str().to_string()),
            ),
            None => (key.to_string(), DataType::String, None),
        };

        let typed = PropertyValue::parse(data_type, &value).unwrap_or_else(|err| {
            debug!(target: "tagtrack::tags", field = %name, "{err}, keeping it as a string");
            PropertyValue::String(value.clone())
        });

        self.entries.insert(
            field_key(&name),
            Annotation::Field(UserField {
                name,
                raw: value,
                value: typed,
                value_type,
            }),
        );
        true
    }

    /// Raw value of an annotation, looked up case-insensitively. A control
    /// key takes precedence over a user field of the same name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .or_else(|| self.entries.get(&field_key(key)))
            .map(Annotation::value)
    }

    /// User field named `name`, looked up case-insensitively.
    pub fn field(&self, name: &str) -> Option<&UserField> {
        match self.entries.get(&field_key(name)) {
            Some(Annotation::Field(field)) => Some(field),
            _ => None,
        }
    }

    pub fn control(&self, key: ControlKey) -> Option<&str> {
        match self.entries.get(key.as_ref()) {
            Some(Annotation::Control(_, value)) => Some(value),
            _ => None,
        }
    }

    /// Whether the record opens or closes an activity.
    pub fn is_activity_instruction(&self) -> bool {
        self.control(ControlKey::Beg).is_some() || self.control(ControlKey::End).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.values()
    }

    pub fn user_fields(&self) -> impl Iterator<Item = &UserField> {
        self.entries.values().filter_map(|annotation| match annotation {
            Annotation::Field(field) => Some(field),
            Annotation::Control(..) => None,
        })
    }

    /// Merge `other` into `self`; entries of `other` win.
    pub fn merge(&mut self, other: Annotations) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of parsing one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    /// Message text with annotations removed
    pub text: String,
    pub annotations: Annotations,
}

/// Split `message` into plain text and annotations.
pub fn parse_message(message: &str, delimiter: char) -> ParsedMessage {
    let mut annotations = Annotations::new();
    let mut text: Vec<&str> = Vec::new();

    // Start of text not yet attributed to an annotation value
    let mut cursor = 0;
    // Key and value start of the annotation whose value is still open
    let mut pending: Option<(&str, usize)> = None;
    let mut pos = 0;

    while let Some(offset) = message[pos..].find(delimiter) {
        let at = pos + offset;
        let after = at + delimiter.len_utf8();

        let Some(caps) = ANNOTATION_KEY.captures(&message[after..]) else {
            pos = after;
            continue;
        };

        // Text preceding this annotation, when no value is still open
        let text_start = match pending.take() {
            Some((key, value_start)) => {
                annotations.insert(key, message[value_start..at].trim());
                None
            }
            None => Some(cursor),
        };

        let key = caps.name("key").map_or("", |m| m.as_str());
        let value_start = after + caps.get(0).map_or(0, |m| m.end());
        let value = message[value_start..].trim_start();

        if let Some(inner) = value.strip_prefix('\'') {
            let inner_start = message.len() - inner.len();
            let Some(close) = inner.find('\'') else {
                // Unterminated quote, the remainder is literal text
                text.push(&message[text_start.unwrap_or(at)..]);
                cursor = message.len();
                break;
            };
            if let Some(start) = text_start {
                text.push(&message[start..at]);
            }
            annotations.insert(key, &inner[..close]);
            pos = inner_start + close + 1;
            cursor = pos;
        } else {
            if let Some(start) = text_start {
                text.push(&message[start..at]);
            }
            pending = Some((key, value_start));
            pos = value_start;
        }
    }

    match pending {
        Some((key, value_start)) => {
            annotations.insert(key, message[value_start..].trim());
        }
        None => text.push(&message[cursor..]),
    }

    let text = text
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    ParsedMessage { text, annotations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn parse(message: &str) -> ParsedMessage {
        parse_message(message, DEFAULT_DELIMITER)
    }

    #[test]
    fn test_plain_text_and_values() {
        let parsed = parse("text #rsn=Foo #msg='A B' #rcd=42");
        assert_eq!(parsed.text, "text");
        assert_eq!(parsed.annotations.len(), 3);
        assert_eq!(parsed.annotations.get("rsn"), Some("Foo"));
        assert_eq!(parsed.annotations.get("msg"), Some("A B"));
        assert_eq!(parsed.annotations.get("rcd"), Some("42"));
    }

    #[test]
    fn test_quoted_value_may_contain_delimiter() {
        let parsed = parse("#msg='a #b c'");
        assert_eq!(parsed.text, "");
        assert_eq!(parsed.annotations.get("msg"), Some("a #b c"));
        assert_eq!(parsed.annotations.len(), 1);
    }

    #[test]
    fn test_unquoted_value_runs_to_next_annotation() {
        let parsed = parse("Operation Failed #app=MyApp #opn=save #rsn=my file.txt  #rcd=5");
        assert_eq!(parsed.text, "Operation Failed");
        assert_eq!(parsed.annotations.get("app"), Some("MyApp"));
        assert_eq!(parsed.annotations.get("rsn"), Some("my file.txt"));
        assert_eq!(parsed.annotations.get("rcd"), Some("5"));
    }

    #[test]
    fn test_keys_are_case_insensitive_and_last_wins() {
        let parsed = parse("x #RSN=first #rsn=second");
        assert_eq!(parsed.annotations.control(ControlKey::Rsn), Some("second"));
        assert_eq!(parsed.annotations.get("Rsn"), Some("second"));
        assert_eq!(parsed.annotations.len(), 1);
    }

    #[test]
    fn test_empty_value() {
        let parsed = parse("Ending #end= #app=Test");
        assert_eq!(parsed.annotations.control(ControlKey::End), Some(""));
        assert_eq!(parsed.annotations.control(ControlKey::App), Some("Test"));
        assert!(parsed.annotations.is_activity_instruction());
    }

    #[test]
    fn test_delimiter_without_equals_is_text() {
        let parsed = parse("fixed issue #42 today #rsn=db");
        assert_eq!(parsed.text, "fixed issue #42 today");
        assert_eq!(parsed.annotations.get("rsn"), Some("db"));

        let parsed = parse("#rsn=db see #42");
        assert_eq!(parsed.annotations.get("rsn"), Some("db see #42"));
    }

    #[test]
    fn test_unterminated_quote_is_literal() {
        let parsed = parse("hello #rsn=db #msg='never closed");
        assert_eq!(parsed.text, "hello #msg='never closed");
        assert_eq!(parsed.annotations.get("rsn"), Some("db"));
        assert_eq!(parsed.annotations.get("msg"), None);
    }

    #[test]
    fn test_text_after_quoted_value_is_kept() {
        let parsed = parse("start #msg='quoted' middle #rsn=db");
        assert_eq!(parsed.text, "start middle");
        assert_eq!(parsed.annotations.get("msg"), Some("quoted"));
    }

    #[test]
    fn test_typed_user_fields() {
        let parsed = parse("Finished #end=Order #%l/order=7634732 #%d:currency/amount=9.99 #%/note=hi");
        let fields: Vec<&UserField> = parsed.annotations.user_fields().collect();
        assert_eq!(fields.len(), 3);

        assert_eq!(fields[0].name, "order");
        assert_eq!(fields[0].value, PropertyValue::Long(7634732));
        assert_eq!(fields[0].value_type, None);

        assert_eq!(fields[1].name, "amount");
        assert_eq!(fields[1].value, PropertyValue::Double(9.99));
        assert_eq!(fields[1].value_type.as_deref(), Some("currency"));

        assert_eq!(fields[2].value, PropertyValue::String("hi".to_string()));
    }

    #[test]
    fn test_typed_field_falls_back_to_string() {
        let parsed = parse("#%i/count=lots");
        let field = parsed.annotations.user_fields().next().unwrap();
        assert_eq!(field.value, PropertyValue::String("lots".to_string()));
    }

    #[test]
    fn test_unknown_keys_preserve_case() {
        let parsed = parse("#OrderId=17");
        let field = parsed.annotations.user_fields().next().unwrap();
        assert_eq!(field.name, "OrderId");
        assert_eq!(parsed.annotations.get("orderid"), Some("17"));
    }

    #[test]
    fn test_user_field_named_like_control_key() {
        let parsed = parse("x #rsn=db #%s/rsn=typed");
        assert_eq!(parsed.annotations.control(ControlKey::Rsn), Some("db"));
        assert_eq!(parsed.annotations.field("rsn").map(|f| f.raw.as_str()), Some("typed"));
        assert_eq!(parsed.annotations.len(), 2);

        let parsed = parse("x #%l/rsn=5 #rsn=db");
        assert_eq!(parsed.annotations.control(ControlKey::Rsn), Some("db"));
        assert_eq!(
            parsed.annotations.field("RSN").map(|f| &f.value),
            Some(&PropertyValue::Long(5))
        );
        assert_eq!(parsed.annotations.get("rsn"), Some("db"));
    }

    #[test]
    fn test_custom_delimiter() {
        let parsed = parse_message("saving @rsn=db @msg='a @b'", '@');
        assert_eq!(parsed.text, "saving");
        assert_eq!(parsed.annotations.get("rsn"), Some("db"));
        assert_eq!(parsed.annotations.get("msg"), Some("a @b"));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Annotations::from_fields(&[
            ("rsn".to_string(), "span".to_string()),
            ("usr".to_string(), "alice".to_string()),
        ]);
        base.merge(parse("#rsn=message").annotations);
        assert_eq!(base.get("rsn"), Some("message"));
        assert_eq!(base.get("usr"), Some("alice"));
    }

    proptest! {
        #[test]
        fn test_parser_never_panics(message in ".*") {
            let parsed = parse(&message);
            prop_assert!(parsed.text.len() <= message.len());
        }

        #[test]
        fn test_annotation_free_text_is_preserved(message in "[a-zA-Z0-9 ,.]{0,64}") {
            let parsed = parse(&message);
            prop_assert!(parsed.annotations.is_empty());
            prop_assert_eq!(parsed.text, message.trim());
        }
    }
}
