//! Typed view of a remote executor's system manifest.
//!
//! Manifests arrive as loosely-typed JSON from `GET /status`. They are
//! parsed exactly once, at the boundary, by [`Manifest::from_value`]:
//! malformed nodes and commands are skipped rather than failing the whole
//! document, and every downstream consumer works with the typed result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ────────────────────────────────────────────────────────────────────────────
// Argument specs
// ────────────────────────────────────────────────────────────────────────────

/// Declared type of one command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Int,
    Float,
    Bool,
    String,
}

impl ArgType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Some(ArgType::Int),
            "float" => Some(ArgType::Float),
            "bool" => Some(ArgType::Bool),
            "string" => Some(ArgType::String),
            _ => None,
        }
    }
}

/// Declared shape of one positional command argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgType,
    /// Allowed values for string arguments (manifest key `enum`).
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Commands and nodes
// ────────────────────────────────────────────────────────────────────────────

/// One command a remote node exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Free-text synonyms/examples from the manifest's NLP hints block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl CommandSpec {
    pub fn token_upper(&self) -> String {
        self.token.trim().to_uppercase()
    }
}

/// One node (device) in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub node_id: String,
    pub commands: Vec<CommandSpec>,
}

/// Borrowed (node, command) pair produced by [`Manifest::commands`].
#[derive(Debug, Clone, Copy)]
pub struct CommandHandle<'a> {
    pub node: &'a NodeSpec,
    pub command: &'a CommandSpec,
}

impl CommandHandle<'_> {
    /// Stable identity key: `node_id + ":" + uppercase(token)`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.node.node_id, self.command.token_upper())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Manifest
// ────────────────────────────────────────────────────────────────────────────

/// The whole declarative command surface of the remote executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_version: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl Manifest {
    /// Parse a loose JSON manifest into a typed one.
    ///
    /// Nodes without a usable name, commands without a token, and argument
    /// entries with unknown types are skipped. A non-object input yields an
    /// empty manifest.
    pub fn from_value(value: &Value) -> Manifest {
        let obj = match value.as_object() {
            Some(o) => o,
            None => return Manifest::default(),
        };
        let daemon_version = obj
            .get("daemon_version")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut nodes = Vec::new();
        for raw_node in obj.get("nodes").and_then(|v| v.as_array()).into_iter().flatten() {
            let node_obj = match raw_node.as_object() {
                Some(o) => o,
                None => continue,
            };
            let name = node_obj
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("node")
                .to_string();
            let node_id = node_obj
                .get("node_id")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&name)
                .to_string();

            let mut commands = Vec::new();
            for raw_cmd in node_obj
                .get("commands")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
            {
                if let Some(cmd) = Self::parse_command(raw_cmd) {
                    commands.push(cmd);
                }
            }
            nodes.push(NodeSpec {
                name,
                node_id,
                commands,
            });
        }

        Manifest {
            daemon_version,
            nodes,
        }
    }

    fn parse_command(raw: &Value) -> Option<CommandSpec> {
        let obj = raw.as_object()?;
        let token = obj.get("token")?.as_str()?.trim();
        if token.is_empty() {
            return None;
        }
        let description = obj
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut args = Vec::new();
        for raw_arg in obj.get("args").and_then(|v| v.as_array()).into_iter().flatten() {
            let arg_obj = match raw_arg.as_object() {
                Some(o) => o,
                None => continue,
            };
            let kind = match arg_obj
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(ArgType::parse)
            {
                Some(k) => k,
                None => continue,
            };
            args.push(ArgSpec {
                name: arg_obj
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                kind,
                one_of: string_list(arg_obj.get("enum")),
                min: arg_obj.get("min").and_then(|v| v.as_f64()),
                max: arg_obj.get("max").and_then(|v| v.as_f64()),
            });
        }

        let nlp = obj.get("nlp").and_then(|v| v.as_object());
        Some(CommandSpec {
            token: token.to_string(),
            description,
            args,
            synonyms: string_list(nlp.and_then(|n| n.get("synonyms"))),
            examples: string_list(nlp.and_then(|n| n.get("examples"))),
        })
    }

    /// Iterate every (node, command) pair in manifest order.
    pub fn commands(&self) -> impl Iterator<Item = CommandHandle<'_>> {
        self.nodes.iter().flat_map(|node| {
            node.commands
                .iter()
                .map(move |command| CommandHandle { node, command })
        })
    }

    /// Look up a command by target (node name or id) and token
    /// (case-insensitive).
    pub fn command_spec(&self, target: &str, token: &str) -> Option<&CommandSpec> {
        let token_u = token.trim().to_uppercase();
        self.nodes
            .iter()
            .filter(|n| n.name == target || n.node_id == target)
            .flat_map(|n| n.commands.iter())
            .find(|c| c.token_upper() == token_u)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
