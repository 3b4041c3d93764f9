//! Declarative command schema.
//!
//! A [`Descriptor`] is the registration record every command carries: its
//! description, ordered positional arguments, option flags and whether it must
//! run inside a project. The Router, the Argument Mapper and the Help
//! Synthesizer all read the same descriptor; none of them mutate it.

use crate::core::error::TrellisError;
use crate::core::options::option_key;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Long flags owned by the dispatcher itself.
pub const RESERVED_FLAGS: &[&str] = &["root-dir", "debug", "help", "version"];

static FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:-(?P<short>[A-Za-z0-9])\s*,\s*)?--(?P<long>[A-Za-z0-9][A-Za-z0-9-]*)(?:\s+(?P<open>[<\[])(?P<value>[^>\]\s]+)[>\]])?$",
    )
    .expect("valid flag pattern")
});

/// Ordered, lowercase command name tokens. Space-joined it is the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// Parse a space-separated path such as `"module add"`.
    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split_whitespace())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn key(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Deserialize)]
struct ArgumentDecl {
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
}

/// One positional parameter. `variadic` comes from a trailing `...` on the
/// declared name, which is stripped before storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ArgumentDecl")]
pub struct ArgumentSpec {
    pub name: String,
    pub required: bool,
    pub variadic: bool,
    pub description: Option<String>,
}

impl From<ArgumentDecl> for ArgumentSpec {
    fn from(decl: ArgumentDecl) -> Self {
        let mut spec = ArgumentSpec::new(&decl.name, decl.required);
        spec.description = decl.description;
        spec
    }
}

impl ArgumentSpec {
    pub fn new(declared: &str, required: bool) -> Self {
        let declared = declared.trim();
        let (name, variadic) = match declared.strip_suffix("...") {
            Some(bare) => (bare.to_string(), true),
            None => (declared.to_string(), false),
        };
        Self {
            name,
            required,
            variadic,
            description: None,
        }
    }

    pub fn required(declared: &str) -> Self {
        Self::new(declared, true)
    }

    pub fn optional(declared: &str) -> Self {
        Self::new(declared, false)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Usage token: `<name>`, `[name]`, `<...name>` or `[...name]`.
    pub fn usage_token(&self) -> String {
        let dots = if self.variadic { "..." } else { "" };
        if self.required {
            format!("<{}{}>", dots, self.name)
        } else {
            format!("[{}{}]", dots, self.name)
        }
    }
}

#[derive(Debug, Deserialize)]
struct OptionDecl {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<Value>,
}

/// One option flag, declared cac-style: `--force`, `--repo <url>`,
/// `-o, --out [dir]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "OptionDecl")]
pub struct OptionSpec {
    pub raw: String,
    pub long: String,
    pub short: Option<char>,
    pub value_name: Option<String>,
    pub value_optional: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
}

impl TryFrom<OptionDecl> for OptionSpec {
    type Error = TrellisError;

    fn try_from(decl: OptionDecl) -> Result<Self, Self::Error> {
        let mut spec = OptionSpec::parse(&decl.name)?;
        spec.description = decl.description;
        spec.default = decl.default;
        Ok(spec)
    }
}

impl OptionSpec {
    pub fn parse(raw: &str) -> Result<Self, TrellisError> {
        let raw = raw.trim();
        let caps = FLAG_PATTERN.captures(raw).ok_or_else(|| {
            TrellisError::DescriptorError(format!(
                "malformed option flag '{}' (expected e.g. `--name`, `--name <value>`, `-n, --name`)",
                raw
            ))
        })?;
        Ok(Self {
            raw: raw.to_string(),
            long: caps["long"].to_string(),
            short: caps
                .name("short")
                .and_then(|m| m.as_str().chars().next()),
            value_name: caps.name("value").map(|m| m.as_str().to_string()),
            value_optional: caps.name("open").is_some_and(|m| m.as_str() == "["),
            description: None,
            default: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Key under which the flag lands in the options object.
    pub fn key(&self) -> String {
        option_key(&self.long)
    }

    pub fn takes_value(&self) -> bool {
        self.value_name.is_some()
    }
}

/// The schema one command path is registered with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgumentSpec>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    #[serde(default)]
    pub requires_project: bool,
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_arg(mut self, arg: ArgumentSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn requiring_project(mut self) -> Self {
        self.requires_project = true;
        self
    }

    /// Usage line for `path`: `module add <url> [name]`.
    pub fn usage_line(&self, path: &CommandPath) -> String {
        let mut line = path.key();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.usage_token());
        }
        line
    }

    /// Reject argument shapes positional binding cannot honor: a variadic that
    /// is not last, more than one variadic, a required argument after an
    /// optional one, duplicate names, and flags clashing with the dispatcher's
    /// own.
    pub fn validate(&self) -> Result<(), TrellisError> {
        let mut seen_args = HashSet::new();
        let mut seen_optional = false;
        for (index, arg) in self.args.iter().enumerate() {
            if arg.name.is_empty() {
                return Err(TrellisError::DescriptorError(format!(
                    "argument #{} has an empty name",
                    index + 1
                )));
            }
            if !seen_args.insert(arg.name.as_str()) {
                return Err(TrellisError::DescriptorError(format!(
                    "argument '{}' is declared twice",
                    arg.name
                )));
            }
            if arg.variadic && index + 1 != self.args.len() {
                return Err(TrellisError::DescriptorError(format!(
                    "variadic argument '{}' must be the last argument",
                    arg.name
                )));
            }
            if arg.required && seen_optional {
                return Err(TrellisError::DescriptorError(format!(
                    "required argument '{}' follows an optional argument; positionals bind by index, so the dispatcher requires required arguments first",
                    arg.name
                )));
            }
            seen_optional |= !arg.required;
        }

        let mut seen_longs = HashSet::new();
        let mut seen_shorts = HashSet::new();
        for option in &self.options {
            if RESERVED_FLAGS.contains(&option.long.as_str()) {
                return Err(TrellisError::DescriptorError(format!(
                    "option '--{}' is reserved by the dispatcher",
                    option.long
                )));
            }
            if !seen_longs.insert(option.long.as_str()) {
                return Err(TrellisError::DescriptorError(format!(
                    "option '--{}' is declared twice",
                    option.long
                )));
            }
            if let Some(short) = option.short {
                if matches!(short, 'h' | 'V') || !seen_shorts.insert(short) {
                    return Err(TrellisError::DescriptorError(format!(
                        "short flag '-{}' is reserved or declared twice",
                        short
                    )));
                }
            }
        }
        Ok(())
    }
}
