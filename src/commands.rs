//! Command surface for rule management.
//!
//! Four commands operate on a [`RuleService`]:
//!
//! ```text
//! /stream-regex-add    [id=<id>] regex=/matcher/flags automation=<automation id>
//! /stream-regex-update id=<id> [regex=/matcher/flags] [automation=<automation id>]
//! /stream-regex-delete id=<id>
//! /stream-regex-list
//! ```
//!
//! Arguments are `key=value` pairs. Values may be double-quoted to include
//! spaces; inside quotes `\"` is a literal quote and every other backslash is
//! kept as written, so `regex="/a\n b/"` reaches the pattern parser unchanged.
//! Empty values count as absent.

use std::collections::BTreeMap;

use crate::error::{StreamRegexResult, ValidationError};
use crate::rule::{AutomationId, RuleId};
use crate::service::RuleService;

/// A named argument accepted by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
    pub default: Option<&'static str>,
}

/// Static description of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub alias: &'static str,
    pub args: &'static [ArgSpec],
    pub returns: &'static str,
    pub help: &'static str,
    pub example: &'static str,
}

const REGEX_DESCRIPTION: &str = "regex in the form of /matcher/flags";
const AUTOMATION_DESCRIPTION: &str = "automation ID used to trigger Quick Replies";

/// Every command, in help order.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "stream-regex-add",
        alias: "add",
        args: &[
            ArgSpec {
                name: "id",
                required: false,
                description: "ID used to update or delete the regex",
                default: Some("a unique random ID (UUID)"),
            },
            ArgSpec {
                name: "regex",
                required: true,
                description: REGEX_DESCRIPTION,
                default: None,
            },
            ArgSpec {
                name: "automation",
                required: true,
                description: AUTOMATION_DESCRIPTION,
                default: None,
            },
        ],
        returns: "ID of the added regex",
        help: "Add a new regex to be executed during streaming that triggers Quick Replies by their automation ID on match.",
        example: r"/stream-regex-add id=myRegex regex=/\n/ automation=STOP",
    },
    CommandSpec {
        name: "stream-regex-update",
        alias: "update",
        args: &[
            ArgSpec {
                name: "id",
                required: true,
                description: "ID of the regex to update",
                default: None,
            },
            ArgSpec {
                name: "regex",
                required: false,
                description: REGEX_DESCRIPTION,
                default: None,
            },
            ArgSpec {
                name: "automation",
                required: false,
                description: AUTOMATION_DESCRIPTION,
                default: None,
            },
        ],
        returns: "ID of the updated regex",
        help: "Update a regex to be executed during streaming that triggers Quick Replies by their automation ID on match.",
        example: r"/stream-regex-update id=myRegex regex=/\n\n/",
    },
    CommandSpec {
        name: "stream-regex-delete",
        alias: "delete",
        args: &[ArgSpec {
            name: "id",
            required: true,
            description: "ID of the regex to delete",
            default: None,
        }],
        returns: "ID of the deleted regex",
        help: "Delete a regex to be executed during streaming that triggers Quick Replies by their automation ID on match.",
        example: "/stream-regex-delete id=myRegex",
    },
    CommandSpec {
        name: "stream-regex-list",
        alias: "list",
        args: &[],
        returns: "list of all stream regex items",
        help: "Get a list of all registered stream regex items.",
        example: "/stream-regex-list",
    },
];

impl CommandSpec {
    /// Looks a command up by full name or alias, with or without a leading `/`.
    #[must_use]
    pub fn find(name: &str) -> Option<&'static Self> {
        let name = name.strip_prefix('/').unwrap_or(name);
        COMMANDS.iter().find(|c| c.name == name || c.alias == name)
    }

    /// Multi-line usage text.
    #[must_use]
    pub fn usage(&self) -> String {
        let mut out = format!("/{}", self.name);
        for arg in self.args {
            if arg.required {
                out.push_str(&format!(" {}=<{}>", arg.name, arg.name));
            } else {
                out.push_str(&format!(" [{}=<{}>]", arg.name, arg.name));
            }
        }
        out.push_str(&format!("\n    {}\n", self.help));
        for arg in self.args {
            out.push_str(&format!("    {:<12}{}", arg.name, arg.description));
            if let Some(default) = arg.default {
                out.push_str(&format!(" [default: {default}]"));
            }
            out.push('\n');
        }
        out.push_str(&format!("    returns: {}\n    example: {}\n", self.returns, self.example));
        out
    }
}

/// A parsed rule management command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        id: Option<RuleId>,
        regex: String,
        automation: AutomationId,
    },
    Update {
        id: RuleId,
        regex: Option<String>,
        automation: Option<AutomationId>,
    },
    Delete {
        id: RuleId,
    },
    List,
}

impl Command {
    /// Parses a full command line such as `stream-regex-delete id=a`.
    pub fn parse(line: &str) -> StreamRegexResult<Self> {
        let tokens = tokenize(line)?;
        Self::from_tokens(&tokens)
    }

    /// Builds a command from already split tokens (command name first).
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> StreamRegexResult<Self> {
        let Some((name, rest)) = tokens.split_first() else {
            return Err(ValidationError::MalformedCommand {
                reason: "empty command line".to_string(),
            }
            .into());
        };

        let name = name.as_ref();
        let spec = CommandSpec::find(name).ok_or_else(|| ValidationError::UnknownCommand {
            name: name.to_string(),
        })?;

        Self::build(spec, rest).map_err(|e| e.in_command(spec.name))
    }

    /// Full name of this command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "stream-regex-add",
            Self::Update { .. } => "stream-regex-update",
            Self::Delete { .. } => "stream-regex-delete",
            Self::List => "stream-regex-list",
        }
    }

    /// Applies this command and returns its textual result.
    ///
    /// `add`, `update` and `delete` return the rule id; `list` returns the
    /// rule list as a JSON array.
    pub fn execute(self, rules: &RuleService) -> StreamRegexResult<String> {
        let name = self.name();
        let result = match self {
            Self::Add {
                id,
                regex,
                automation,
            } => rules.add(id, &regex, automation).map(|id| id.to_string()),
            Self::Update {
                id,
                regex,
                automation,
            } => rules
                .update(&id, regex.as_deref(), automation)
                .map(|id| id.to_string()),
            Self::Delete { id } => rules.delete(&id).map(|id| id.to_string()),
            Self::List => rules.list_json(),
        };
        result.map_err(|e| e.in_command(name))
    }

    fn build<S: AsRef<str>>(spec: &CommandSpec, tokens: &[S]) -> StreamRegexResult<Self> {
        let mut args = parse_args(spec, tokens)?;

        let cmd = match spec.alias {
            "add" => Self::Add {
                regex: take_required(&mut args, "regex")?,
                automation: take_required(&mut args, "automation")?.into(),
                id: args.remove("id").map(RuleId::from),
            },
            "update" => Self::Update {
                id: take_required(&mut args, "id")?.into(),
                regex: args.remove("regex"),
                automation: args.remove("automation").map(AutomationId::from),
            },
            "delete" => Self::Delete {
                id: take_required(&mut args, "id")?.into(),
            },
            "list" => Self::List,
            other => {
                return Err(ValidationError::UnknownCommand {
                    name: other.to_string(),
                }
                .into())
            }
        };
        Ok(cmd)
    }
}

fn parse_args<S: AsRef<str>>(
    spec: &CommandSpec,
    tokens: &[S],
) -> Result<BTreeMap<&'static str, String>, ValidationError> {
    let mut args = BTreeMap::new();

    for token in tokens {
        let token = token.as_ref();
        let Some((key, value)) = token.split_once('=') else {
            return Err(ValidationError::MalformedCommand {
                reason: format!("expected key=value, got '{token}'"),
            });
        };

        let arg = spec
            .args
            .iter()
            .find(|a| a.name == key)
            .ok_or_else(|| ValidationError::UnknownArgument {
                name: key.to_string(),
            })?;

        if args.contains_key(arg.name) {
            return Err(ValidationError::MalformedCommand {
                reason: format!("argument '{key}' given more than once"),
            });
        }
        if !value.is_empty() {
            args.insert(arg.name, value.to_string());
        }
    }

    Ok(args)
}

fn take_required(
    args: &mut BTreeMap<&'static str, String>,
    name: &str,
) -> Result<String, ValidationError> {
    args.remove(name).ok_or_else(|| ValidationError::MissingArgument {
        name: name.to_string(),
    })
}

/// Splits a command line on whitespace, honouring double quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, ValidationError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            '\\' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(ValidationError::MalformedCommand {
            reason: "unterminated quote".to_string(),
        });
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
