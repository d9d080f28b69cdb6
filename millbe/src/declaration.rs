//! Parses filter and feature writer declarations.
//!
//! Declarations come from two places: command line strings of the form
//! `[module::]Name(key=value, ...)`, and dictionaries stored in a font's lib.
//! Both produce a [`Declaration`]; turning that into something runnable is up
//! to [`crate::filters`] and [`crate::features`].

use std::collections::{BTreeMap, BTreeSet};

use millcore::types::GlyphName;

use crate::error::Error;

/// A keyword argument value
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<OptionValue>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            OptionValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Int(v) => Some(*v as f64),
            OptionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// A list of strings, read as glyph names
    pub fn as_names(&self) -> Option<BTreeSet<GlyphName>> {
        match self {
            OptionValue::List(values) => values
                .iter()
                .map(|v| v.as_str().map(GlyphName::new))
                .collect(),
            OptionValue::Str(v) => Some(BTreeSet::from([GlyphName::new(v)])),
            _ => None,
        }
    }

    fn from_plist(value: &plist::Value) -> Option<OptionValue> {
        Some(match value {
            plist::Value::Boolean(v) => OptionValue::Bool(*v),
            plist::Value::Integer(v) => OptionValue::Int(v.as_signed()?),
            plist::Value::Real(v) => OptionValue::Float(*v),
            plist::Value::String(v) => OptionValue::Str(v.clone()),
            plist::Value::Array(values) => OptionValue::List(
                values
                    .iter()
                    .map(OptionValue::from_plist)
                    .collect::<Option<_>>()?,
            ),
            _ => return None,
        })
    }
}

pub type Options = BTreeMap<String, OptionValue>;

/// One entry of a filter or feature writer list
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `...`, stands for the default list at this position
    Defaults,
    /// `None`, turns the whole chain off
    Disabled,
    Named {
        name: String,
        namespace: Option<String>,
        options: Options,
    },
}

impl Declaration {
    pub fn named(name: impl Into<String>) -> Declaration {
        Declaration::Named {
            name: name.into(),
            namespace: None,
            options: Default::default(),
        }
    }

    pub fn with_option(self, key: &str, value: OptionValue) -> Declaration {
        match self {
            Declaration::Named {
                name,
                namespace,
                mut options,
            } => {
                options.insert(key.to_string(), value);
                Declaration::Named {
                    name,
                    namespace,
                    options,
                }
            }
            other => other,
        }
    }
}

fn bad(text: &str, reason: impl Into<String>) -> Error {
    Error::Declaration {
        text: text.to_string(),
        reason: reason.into(),
    }
}

/// Parse a command line declaration such as `DecomposeComponentsFilter(include=["a"])`
pub fn parse_declaration(text: &str) -> Result<Declaration, Error> {
    let trimmed = text.trim();
    match trimmed {
        "..." => return Ok(Declaration::Defaults),
        "None" => return Ok(Declaration::Disabled),
        "" => return Err(bad(text, "empty")),
        _ => (),
    }

    let (head, args) = match trimmed.find('(') {
        Some(idx) => {
            let Some(args) = trimmed[idx + 1..].strip_suffix(')') else {
                return Err(bad(text, "unbalanced parentheses"));
            };
            (&trimmed[..idx], Some(args))
        }
        None => (trimmed, None),
    };
    let (namespace, name) = match head.rsplit_once("::") {
        Some((namespace, name)) => (Some(namespace.trim().to_string()), name.trim()),
        None => (None, head.trim()),
    };
    if !is_identifier(name) {
        return Err(bad(text, format!("'{name}' is not a valid name")));
    }

    let options = match args {
        Some(args) => {
            let mut parser = Parser::new(text, args);
            let options = parser.keyword_args()?;
            parser.finish()?;
            options
        }
        None => Default::default(),
    };

    Ok(Declaration::Named {
        name: name.to_string(),
        namespace,
        options,
    })
}

/// Parse a declaration stored in a font lib.
///
/// Accepts both the filter shape (`name`, `namespace`, `kwargs`, `pre`,
/// `include`, `exclude`) and the feature writer shape (`class`, `module`,
/// `options`). Top level flags are folded into the options.
pub fn declaration_from_plist(value: &plist::Value) -> Result<Declaration, Error> {
    let text = format!("{value:?}");
    let dict = match value {
        plist::Value::Dictionary(dict) => dict,
        plist::Value::String(s) => return parse_declaration(s),
        _ => return Err(bad(&text, "expected a dictionary")),
    };
    let get_str = |key: &str| dict.get(key).and_then(plist::Value::as_string);

    let Some(name) = get_str("name").or_else(|| get_str("class")) else {
        return Err(bad(&text, "missing 'name'"));
    };
    let namespace = get_str("namespace")
        .or_else(|| get_str("module"))
        .map(str::to_string);

    let mut options = Options::new();
    for key in ["kwargs", "options"] {
        let Some(values) = dict.get(key) else {
            continue;
        };
        let Some(values) = values.as_dictionary() else {
            return Err(bad(&text, format!("'{key}' must be a dictionary")));
        };
        for (k, v) in values.iter() {
            let Some(v) = OptionValue::from_plist(v) else {
                return Err(bad(&text, format!("unsupported value for '{k}'")));
            };
            options.insert(k.clone(), v);
        }
    }
    for key in ["pre", "include", "exclude"] {
        if let Some(v) = dict.get(key) {
            let Some(v) = OptionValue::from_plist(v) else {
                return Err(bad(&text, format!("unsupported value for '{key}'")));
            };
            options.insert(key.to_string(), v);
        }
    }

    Ok(Declaration::Named {
        name: name.to_string(),
        namespace,
        options,
    })
}

/// Read a list of declarations from a lib key, if present
pub fn declarations_from_lib(
    lib: &plist::Dictionary,
    key: &str,
) -> Result<Option<Vec<Declaration>>, Error> {
    let Some(value) = lib.get(key) else {
        return Ok(None);
    };
    let Some(values) = value.as_array() else {
        return Err(bad(key, "expected an array of declarations"));
    };
    values
        .iter()
        .map(declaration_from_plist)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, args: &str) -> Self {
        Parser {
            text,
            chars: args.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        bad(self.text, reason)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, expected: char) -> Result<(), Error> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn finish(&mut self) -> Result<(), Error> {
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
        }
    }

    fn word(&mut self) -> String {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+'))
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn keyword_args(&mut self) -> Result<Options, Error> {
        let mut options = Options::new();
        while self.peek().is_some() {
            let key = self.word();
            if !is_identifier(&key) {
                return Err(self.error(format!("'{key}' is not a valid keyword")));
            }
            self.expect('=')?;
            let value = self.value()?;
            options.insert(key, value);
            if self.peek() == Some(',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(options)
    }

    fn value(&mut self) -> Result<OptionValue, Error> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => self.string(quote),
            Some(open @ ('[' | '(' | '{')) => {
                let close = match open {
                    '[' => ']',
                    '(' => ')',
                    _ => '}',
                };
                self.pos += 1;
                let mut values = Vec::new();
                while self.peek() != Some(close) {
                    values.push(self.value()?);
                    if self.peek() == Some(',') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(close)?;
                Ok(OptionValue::List(values))
            }
            Some(_) => {
                let word = self.word();
                match word.as_str() {
                    "None" => Ok(OptionValue::None),
                    "True" => Ok(OptionValue::Bool(true)),
                    "False" => Ok(OptionValue::Bool(false)),
                    "" => Err(self.error("expected a value")),
                    _ => {
                        if let Ok(v) = word.parse::<i64>() {
                            Ok(OptionValue::Int(v))
                        } else if let Ok(v) = word.parse::<f64>() {
                            Ok(OptionValue::Float(v))
                        } else {
                            Err(self.error(format!("unrecognized value '{word}'")))
                        }
                    }
                }
            }
            None => Err(self.error("expected a value, found end of input")),
        }
    }

    fn string(&mut self, quote: char) -> Result<OptionValue, Error> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.chars.get(self.pos) {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    let Some(c) = self.chars.get(self.pos) else {
                        return Err(self.error("unterminated string"));
                    };
                    value.push(*c);
                }
                Some(c) if *c == quote => {
                    self.pos += 1;
                    return Ok(OptionValue::Str(value));
                }
                Some(c) => value.push(*c),
            }
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn named(name: &str, namespace: Option<&str>, options: &[(&str, OptionValue)]) -> Declaration {
        Declaration::Named {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn bare_name() {
        assert_eq!(
            named("DecomposeComponentsFilter", None, &[]),
            parse_declaration("DecomposeComponentsFilter").unwrap()
        );
    }

    #[test]
    fn namespace_and_kwargs() {
        assert_eq!(
            named(
                "TransformationsFilter",
                Some("ufo2ft.filters.transformations"),
                &[
                    ("OffsetY", OptionValue::Int(-20)),
                    ("ScaleX", OptionValue::Float(99.5)),
                    (
                        "include",
                        OptionValue::List(vec![
                            OptionValue::Str("a".into()),
                            OptionValue::Str("b, c".into())
                        ])
                    ),
                    ("pre", OptionValue::Bool(true)),
                ]
            ),
            parse_declaration(
                "ufo2ft.filters.transformations::TransformationsFilter(OffsetY=-20, ScaleX=99.5, include=['a', \"b, c\"], pre=True)"
            )
            .unwrap()
        );
    }

    #[test]
    fn writer_mode() {
        let decl = parse_declaration("KernFeatureWriter(mode=\"append\", quantization=None)").unwrap();
        let Declaration::Named { options, .. } = decl else {
            panic!("expected a named declaration");
        };
        assert_eq!(Some("append"), options["mode"].as_str());
        assert_eq!(OptionValue::None, options["quantization"]);
    }

    #[rstest]
    #[case("...", Declaration::Defaults)]
    #[case(" None ", Declaration::Disabled)]
    fn special_values(#[case] text: &str, #[case] expected: Declaration) {
        assert_eq!(expected, parse_declaration(text).unwrap());
    }

    #[rstest]
    #[case("")]
    #[case("Bad Name")]
    #[case("Filter(include=['a')")]
    #[case("Filter(x=)")]
    #[case("Filter(x=1")]
    #[case("Filter(x=banana)")]
    #[case("Filter(x='unterminated)")]
    fn rejects_malformed(#[case] text: &str) {
        assert!(
            matches!(parse_declaration(text), Err(Error::Declaration { .. })),
            "{text} should fail"
        );
    }

    #[test]
    fn from_lib_filter_shape() {
        let mut dict = plist::Dictionary::new();
        dict.insert("name".into(), "propagateAnchors".into());
        dict.insert("pre".into(), true.into());
        dict.insert(
            "include".into(),
            plist::Value::Array(vec!["aacute".into()]),
        );
        let mut kwargs = plist::Dictionary::new();
        kwargs.insert("answer".into(), 42.into());
        dict.insert("kwargs".into(), plist::Value::Dictionary(kwargs));

        assert_eq!(
            named(
                "propagateAnchors",
                None,
                &[
                    ("answer", OptionValue::Int(42)),
                    ("include", OptionValue::List(vec![OptionValue::Str("aacute".into())])),
                    ("pre", OptionValue::Bool(true)),
                ]
            ),
            declaration_from_plist(&plist::Value::Dictionary(dict)).unwrap()
        );
    }

    #[test]
    fn from_lib_writer_shape() {
        let mut dict = plist::Dictionary::new();
        dict.insert("class".into(), "KernFeatureWriter".into());
        dict.insert("module".into(), "ufo2ft.featureWriters".into());
        let mut options = plist::Dictionary::new();
        options.insert("mode".into(), "append".into());
        dict.insert("options".into(), plist::Value::Dictionary(options));

        let mut lib = plist::Dictionary::new();
        lib.insert(
            "writers".into(),
            plist::Value::Array(vec![plist::Value::Dictionary(dict), "...".into()]),
        );
        assert_eq!(
            Some(vec![
                named(
                    "KernFeatureWriter",
                    Some("ufo2ft.featureWriters"),
                    &[("mode", OptionValue::Str("append".into()))]
                ),
                Declaration::Defaults,
            ]),
            declarations_from_lib(&lib, "writers").unwrap()
        );
        assert_eq!(None, declarations_from_lib(&lib, "nope").unwrap());
    }

    #[test]
    fn names_from_list() {
        let value = OptionValue::List(vec![OptionValue::Str("a".into()), OptionValue::Str("b".into())]);
        assert_eq!(
            Some(BTreeSet::from([GlyphName::new("a"), GlyphName::new("b")])),
            value.as_names()
        );
        assert_eq!(None, OptionValue::List(vec![OptionValue::Int(1)]).as_names());
    }
}
