//! Positional binding and forwarded-flag parsing.
//!
//! [`bind`] reconciles positional values against a descriptor's ordered
//! argument specs. [`parse_forwarded`] splits the raw tail a grouped family
//! receives (`module add <url> --branch dev`) into positionals and flag
//! options before binding.

use crate::core::descriptor::{ArgumentSpec, OptionSpec};
use crate::core::options::{DEBUG_KEY, Options, ROOT_DIR_KEY, option_key};
use serde_json::Value;

/// Bind `positionals` onto `args` by index, writing into `options`.
///
/// Specs without a value are skipped: their keys stay absent. A variadic
/// spec absorbs the rest of the list as an array. Values are never coerced.
pub fn bind(args: &[ArgumentSpec], positionals: &[String], options: &mut Options) {
    for (index, spec) in args.iter().enumerate() {
        if index >= positionals.len() {
            continue;
        }
        let value = if spec.variadic {
            Value::Array(
                positionals[index..]
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            )
        } else {
            Value::String(positionals[index].clone())
        };
        options.insert(spec.name.clone(), value);
    }
}

/// How a flag found in forwarded tokens consumes values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Switch,
    Value,
    OptionalValue,
    /// Unknown flag: takes the next token when it does not look like a flag.
    Guess,
}

fn long_arity(name: &str, known: &[OptionSpec]) -> Arity {
    if name == "root-dir" {
        return Arity::Value;
    }
    if name == "debug" || name == "help" {
        return Arity::Switch;
    }
    match known.iter().find(|o| o.long == name) {
        Some(spec) if spec.value_optional => Arity::OptionalValue,
        Some(spec) if spec.takes_value() => Arity::Value,
        Some(_) => Arity::Switch,
        None => Arity::Guess,
    }
}

fn short_target(short: char, known: &[OptionSpec]) -> (String, Arity) {
    if short == 'h' {
        return ("help".to_string(), Arity::Switch);
    }
    match known.iter().find(|o| o.short == Some(short)) {
        Some(spec) if spec.value_optional => (spec.key(), Arity::OptionalValue),
        Some(spec) if spec.takes_value() => (spec.key(), Arity::Value),
        Some(spec) => (spec.key(), Arity::Switch),
        None => (short.to_string(), Arity::Switch),
    }
}

fn looks_like_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && token.parse::<f64>().is_err()
}

/// Split forwarded tokens into positionals and flag options.
///
/// Flags declared in `known` consume values according to their declaration.
/// Unknown `--name value` pairs take the following token unless it is itself
/// a flag; a bare unknown flag is `true`. `--no-name` sets `name` to `false`,
/// and everything after `--` is positional.
pub fn parse_forwarded(tokens: &[String], known: &[OptionSpec]) -> (Vec<String>, Options) {
    let mut positionals = Vec::new();
    let mut options = Options::new();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        if token == "--" {
            positionals.extend(iter.by_ref().cloned());
            break;
        }

        if let Some(body) = token.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (body, None),
            };
            if let Some(negated) = name.strip_prefix("no-") {
                if inline.is_none() && !known.iter().any(|o| o.long == name) {
                    options.insert(option_key(negated), Value::Bool(false));
                    continue;
                }
            }
            let key = option_key(name);
            let value = match (long_arity(name, known), inline) {
                (_, Some(inline)) => Value::String(inline),
                (Arity::Switch, None) => Value::Bool(true),
                (Arity::Value, None) => match iter.next() {
                    Some(next) => Value::String(next.clone()),
                    None => Value::Bool(true),
                },
                (Arity::OptionalValue | Arity::Guess, None) => {
                    match iter.next_if(|next| !looks_like_flag(next)) {
                        Some(next) => Value::String(next.clone()),
                        None => Value::Bool(true),
                    }
                }
            };
            options.insert(key, value);
            continue;
        }

        if looks_like_flag(token) {
            let shorts: Vec<char> = token[1..].chars().collect();
            for (index, short) in shorts.iter().enumerate() {
                let (key, arity) = short_target(*short, known);
                let last = index + 1 == shorts.len();
                let value = match arity {
                    Arity::Value if last => match iter.next() {
                        Some(next) => Value::String(next.clone()),
                        None => Value::Bool(true),
                    },
                    Arity::OptionalValue if last => {
                        match iter.next_if(|next| !looks_like_flag(next)) {
                            Some(next) => Value::String(next.clone()),
                            None => Value::Bool(true),
                        }
                    }
                    _ => Value::Bool(true),
                };
                options.insert(key, value);
            }
            continue;
        }

        positionals.push(token.clone());
    }

    (positionals, options)
}

/// A family's raw tail split around its subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyTail {
    pub subcommand: Option<String>,
    /// Flag tokens seen before the subcommand.
    pub leading: Vec<String>,
    /// Everything after the subcommand, `--` included.
    pub trailing: Vec<String>,
}

/// Find the subcommand in a family's raw tail: the first token that is not a
/// flag, ahead of any `--`. Flags before it cannot take a separate value
/// (only `--name=value`), except `--root-dir <path>`.
pub fn split_family_tail(tail: &[String]) -> FamilyTail {
    let mut split = FamilyTail::default();
    let mut iter = tail.iter();
    while let Some(token) = iter.next() {
        if token == "--" {
            split.leading.push(token.clone());
            split.leading.extend(iter.by_ref().cloned());
            break;
        }
        if token == "--root-dir" {
            split.leading.push(token.clone());
            split.leading.extend(iter.next().cloned());
            continue;
        }
        if looks_like_flag(token) {
            split.leading.push(token.clone());
            continue;
        }
        split.subcommand = Some(token.clone());
        split.trailing.extend(iter.by_ref().cloned());
        break;
    }
    split
}

/// Parse a split family tail. Flags given after the subcommand override the
/// same flags given before it.
pub fn parse_family_tail(tail: &FamilyTail, known: &[OptionSpec]) -> (Vec<String>, Options) {
    let leading: Vec<String> = tail
        .leading
        .iter()
        .take_while(|t| t.as_str() != "--")
        .cloned()
        .collect();
    let (_, mut options) = parse_forwarded(&leading, known);
    let (positionals, trailing) = parse_forwarded(&tail.trailing, known);
    for (key, value) in trailing.as_map() {
        options.insert(key.clone(), value.clone());
    }
    (positionals, options)
}

/// Fill absent keys with the declared defaults of `specs`.
pub fn apply_defaults(specs: &[OptionSpec], options: &mut Options) {
    for spec in specs {
        if let Some(default) = &spec.default {
            options.set_default(spec.key(), default.clone());
        }
    }
}

/// Make sure both reserved globals are present, `null` when unset.
pub fn ensure_globals(root_dir: Option<&str>, debug: bool, options: &mut Options) {
    if let Some(dir) = root_dir {
        options.set_default(ROOT_DIR_KEY, Value::String(dir.to_string()));
    }
    if debug {
        options.set_default(DEBUG_KEY, Value::Bool(true));
    }
    options.set_default(ROOT_DIR_KEY, Value::Null);
    options.set_default(DEBUG_KEY, Value::Null);
}
