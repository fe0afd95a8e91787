//! Purpose: `objadm` CLI entry point: host registry and admin commands.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON value on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code` (usage errors exit 2).
#![allow(clippy::result_large_err)]
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use objadm::api::{
    AdminClient, Error, ErrorKind, GroupStatus, HostEntry, HostRegistry, Principal, UserStatus,
    to_exit_code,
};
use objadm::config_paths::default_config_dir;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

const USAGE_EXIT_CODE: i32 = 2;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

/// Anything that ends a run early: bad invocation or a failed admin call.
#[derive(Debug)]
enum Failure {
    Usage {
        message: String,
        hint: Option<String>,
        cause: Option<String>,
    },
    Api(Error),
}

impl Failure {
    fn usage(message: impl Into<String>) -> Self {
        Failure::Usage {
            message: message.into(),
            hint: None,
            cause: None,
        }
    }

    fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            Failure::Usage { message, cause, .. } => Failure::Usage {
                message,
                hint: Some(hint.into()),
                cause,
            },
            Failure::Api(err) => Failure::Api(err.with_hint(hint)),
        }
    }

    fn with_cause(self, cause: impl ToString) -> Self {
        match self {
            Failure::Usage { message, hint, .. } => Failure::Usage {
                message,
                hint,
                cause: Some(cause.to_string()),
            },
            other => other,
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            Failure::Usage { .. } => USAGE_EXIT_CODE,
            Failure::Api(err) => to_exit_code(err.kind()),
        }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::Api(err)
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((failure, color_mode)) => {
            emit_failure(&failure, color_mode);
            failure.exit_code()
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Failure, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Failure::usage("failed to write help").with_cause(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    USAGE_EXIT_CODE
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Failure::usage(clap_error_summary(&err)).with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let context = CommandContext {
        registry: HostRegistry::in_dir(cli.config_dir.unwrap_or_else(default_config_dir)),
        timeout: cli.timeout_ms.map(Duration::from_millis),
        color_mode,
    };

    command_dispatch::dispatch_command(cli.command, &context)
        .map_err(|failure| (add_transport_hint(failure), color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Resolved global options handed to every command.
struct CommandContext {
    registry: HostRegistry,
    timeout: Option<Duration>,
    color_mode: ColorMode,
}

impl CommandContext {
    fn connect(&self, host: &str) -> Result<AdminClient, Error> {
        let client = AdminClient::connect(&self.registry, host)?;
        Ok(match self.timeout {
            Some(timeout) => client.with_timeout(timeout),
            None => client,
        })
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "objadm",
    version,
    about = "Administer users, groups, and policies on object-storage hosts",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Hosts are registered once under an alias; admin commands take that alias.

Mental model:
  - `config host` manages aliases (endpoint + credentials, stored locally)
  - `admin user|group|policy` talk to the host behind an alias
"#,
    after_help = r#"EXAMPLES
  $ objadm config host add local http://127.0.0.1:9000 minioadmin minioadmin
  $ objadm admin user add local alice s3cr3tpass
  $ objadm admin group add local devs alice
  $ objadm admin policy attach local readwrite --group devs

LEARN MORE
  $ objadm <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Config directory holding hosts.json (default: $OBJADM_CONFIG_DIR or ~/.objadm)",
        value_hint = ValueHint::DirPath
    )]
    config_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "MS",
        help = "Timeout for each admin request in milliseconds"
    )]
    timeout_ms: Option<u64>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics; always also pretty-prints stdout JSON: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Manage local configuration",
        after_help = r#"EXAMPLES
  $ objadm config host add local http://127.0.0.1:9000 minioadmin minioadmin
  $ objadm config host list
  $ objadm config host remove local"#
    )]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Administer users, groups, and policies on a host"
    )]
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ objadm completion bash > ~/.local/share/bash-completion/completions/objadm
  $ objadm completion zsh > ~/.zfunc/_objadm
  $ objadm completion fish > ~/.config/fish/completions/objadm.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    #[command(arg_required_else_help = true, about = "Manage host aliases")]
    Host {
        #[command(subcommand)]
        command: HostCommand,
    },
}

#[derive(Debug, Subcommand)]
enum HostCommand {
    #[command(
        arg_required_else_help = true,
        about = "Register or update a host alias",
        after_help = r#"NOTES
  - Re-adding an alias replaces its url and credentials.
  - The url must be http(s)://host[:port] without a path."#
    )]
    Add {
        #[arg(help = "Alias to register")]
        alias: String,
        #[arg(help = "Endpoint url, e.g. http://127.0.0.1:9000", value_hint = ValueHint::Url)]
        url: String,
        #[arg(help = "Access key used for admin requests")]
        access_key: String,
        #[arg(help = "Secret key used for admin requests")]
        secret_key: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Forget a host alias (no-op when absent)"
    )]
    Remove {
        #[arg(help = "Alias to remove")]
        alias: String,
    },
    #[command(about = "List registered host aliases")]
    List,
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    #[command(arg_required_else_help = true, about = "Manage users")]
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    #[command(arg_required_else_help = true, about = "Manage groups and membership")]
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
    #[command(arg_required_else_help = true, about = "Manage policies")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[derive(Debug, Args)]
struct UserTarget {
    #[arg(help = "Host alias")]
    host: String,
    #[arg(help = "User access key")]
    access_key: String,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    #[command(
        arg_required_else_help = true,
        about = "Create a user or rotate its secret key",
        after_help = r#"EXAMPLES
  $ objadm admin user add local alice s3cr3tpass"#
    )]
    Add {
        #[command(flatten)]
        target: UserTarget,
        #[arg(help = "Secret key for the user")]
        secret_key: String,
    },
    #[command(arg_required_else_help = true, about = "Enable a user")]
    Enable {
        #[command(flatten)]
        target: UserTarget,
    },
    #[command(arg_required_else_help = true, about = "Disable a user")]
    Disable {
        #[command(flatten)]
        target: UserTarget,
    },
    #[command(
        arg_required_else_help = true,
        about = "Show a user's status, policy, and groups"
    )]
    Info {
        #[command(flatten)]
        target: UserTarget,
    },
    #[command(arg_required_else_help = true, about = "List users and their status")]
    List {
        #[arg(help = "Host alias")]
        host: String,
    },
    #[command(arg_required_else_help = true, about = "Remove a user")]
    Remove {
        #[command(flatten)]
        target: UserTarget,
    },
}

#[derive(Debug, Args)]
struct GroupTarget {
    #[arg(help = "Host alias")]
    host: String,
    #[arg(help = "Group name")]
    group: String,
}

#[derive(Debug, Subcommand)]
enum GroupCommand {
    #[command(
        arg_required_else_help = true,
        about = "Create a group and/or add members",
        after_help = r#"EXAMPLES
  $ objadm admin group add local devs alice bob

NOTES
  - Members must be existing users.
  - Duplicate members are added once."#
    )]
    Add {
        #[command(flatten)]
        target: GroupTarget,
        #[arg(required = true, help = "User access key(s) to add")]
        members: Vec<String>,
    },
    #[command(arg_required_else_help = true, about = "Enable a group")]
    Enable {
        #[command(flatten)]
        target: GroupTarget,
    },
    #[command(arg_required_else_help = true, about = "Disable a group")]
    Disable {
        #[command(flatten)]
        target: GroupTarget,
    },
    #[command(
        arg_required_else_help = true,
        about = "Show a group's members, status, and policy"
    )]
    Info {
        #[command(flatten)]
        target: GroupTarget,
    },
    #[command(arg_required_else_help = true, about = "List group names")]
    List {
        #[arg(help = "Host alias")]
        host: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Remove members, or delete an empty group",
        after_help = r#"EXAMPLES
  $ objadm admin group remove local devs bob      # drop one member
  $ objadm admin group remove local devs          # delete the (empty) group

NOTES
  - Deleting a group that still has members fails with NotEmpty."#
    )]
    Remove {
        #[command(flatten)]
        target: GroupTarget,
        #[arg(help = "User access key(s) to remove; omit to delete the group")]
        members: Vec<String>,
    },
}

#[derive(Debug, Args)]
struct PolicyTarget {
    #[arg(help = "Host alias")]
    host: String,
    #[arg(help = "Policy name")]
    policy: String,
}

#[derive(Debug, Subcommand)]
enum PolicyCommand {
    #[command(
        arg_required_else_help = true,
        about = "Create or replace a policy from a JSON document",
        after_help = r#"EXAMPLES
  $ objadm admin policy add local listonly ./listonly.json
  $ cat listonly.json | objadm admin policy add local listonly -"#
    )]
    Add {
        #[command(flatten)]
        target: PolicyTarget,
        #[arg(help = "Policy document path (use - for stdin)", value_hint = ValueHint::FilePath)]
        file: String,
    },
    #[command(arg_required_else_help = true, about = "Show a policy document")]
    Info {
        #[command(flatten)]
        target: PolicyTarget,
    },
    #[command(arg_required_else_help = true, about = "List policy names")]
    List {
        #[arg(help = "Host alias")]
        host: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Remove a policy (canned policies are protected)"
    )]
    Remove {
        #[command(flatten)]
        target: PolicyTarget,
    },
    #[command(
        arg_required_else_help = true,
        about = "Attach a policy to a user or group",
        after_help = r#"EXAMPLES
  $ objadm admin policy attach local readwrite --user alice
  $ objadm admin policy attach local readonly --group devs"#
    )]
    Attach {
        #[command(flatten)]
        target: PolicyTarget,
        #[arg(long, conflicts_with = "group", required_unless_present = "group", help = "User access key")]
        user: Option<String>,
        #[arg(long, help = "Group name")]
        group: Option<String>,
    },
}

fn principal_from_flags(user: Option<String>, group: Option<String>) -> Result<Principal, Failure> {
    match (user, group) {
        (Some(user), None) => Ok(Principal::user(user)),
        (None, Some(group)) => Ok(Principal::group(group)),
        _ => Err(Failure::usage("attach needs exactly one of --user or --group")
            .with_hint("Use `--user <access-key>` or `--group <name>`.")),
    }
}

fn read_policy_document(file: &str) -> Result<Value, Failure> {
    let text = if file == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| Failure::usage("failed to read policy from stdin").with_cause(err))?;
        text
    } else {
        fs::read_to_string(file).map_err(|err| {
            Failure::usage(format!("failed to read policy file {file}")).with_cause(err)
        })?
    };
    let document: Value = serde_json::from_str(&text).map_err(|err| {
        Failure::usage("policy document is not valid json")
            .with_hint("Provide a JSON policy document, e.g. {\"Version\":\"2012-10-17\",\"Statement\":[...]}.")
            .with_cause(err)
    })?;
    if !document.is_object() {
        return Err(Failure::usage("policy document must be a JSON object"));
    }
    Ok(document)
}

fn host_json(entry: &HostEntry) -> Value {
    json!({
        "alias": entry.alias,
        "URL": entry.url,
        "accessKey": entry.access_key,
    })
}

fn user_status_json(access_key: &str, status: UserStatus) -> Value {
    json!({ "accessKey": access_key, "status": status })
}

fn group_status_json(name: &str, status: GroupStatus) -> Value {
    json!({ "name": name, "status": status })
}

fn add_transport_hint(failure: Failure) -> Failure {
    match failure {
        Failure::Api(err) if err.kind() == ErrorKind::Transport && err.hint().is_none() => {
            let hint = match err.host() {
                Some(host) => format!("Check `objadm config host list` for the url registered as '{host}'."),
                None => "Check the registered host url and credentials.".to_string(),
            };
            Failure::Api(err.with_hint(hint))
        }
        other => other,
    }
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let encoded = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_failure(failure: &Failure, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", failure_text(failure, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&failure_json(failure)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Transport\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::NotEmpty => "group is not empty".to_string(),
        ErrorKind::ProtectedPolicy => "policy is protected".to_string(),
        ErrorKind::Transport => "request failed".to_string(),
        ErrorKind::Registry => "host registry error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn failure_json(failure: &Failure) -> Value {
    let mut inner = Map::new();
    match failure {
        Failure::Usage {
            message,
            hint,
            cause,
        } => {
            inner.insert("kind".to_string(), json!("Usage"));
            inner.insert("message".to_string(), json!(message));
            if let Some(hint) = hint {
                inner.insert("hint".to_string(), json!(hint));
            }
            if let Some(cause) = cause {
                inner.insert("causes".to_string(), json!([cause]));
            }
        }
        Failure::Api(err) => {
            inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
            inner.insert("message".to_string(), json!(error_message(err)));
            if let Some(host) = err.host() {
                inner.insert("host".to_string(), json!(host));
            }
            if let Some((entity, id)) = err.entity() {
                inner.insert("entity".to_string(), json!(entity.as_str()));
                inner.insert("id".to_string(), json!(id));
            }
            if let Some(hint) = err.hint() {
                inner.insert("hint".to_string(), json!(hint));
            }
            if let Some(status) = err.status() {
                inner.insert("status".to_string(), json!(status));
            }
            if let Some(code) = err.code() {
                inner.insert("code".to_string(), json!(code));
            }
            if let Some(path) = err.path() {
                inner.insert("path".to_string(), json!(path.display().to_string()));
            }
            let causes = error_causes(err);
            if !causes.is_empty() {
                inner.insert("causes".to_string(), json!(causes));
            }
        }
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn failure_text(failure: &Failure, use_color: bool) -> String {
    let label = |name: &str| colorize_label(name, use_color, AnsiColor::Yellow);
    let mut lines = Vec::new();
    match failure {
        Failure::Usage {
            message,
            hint,
            cause,
        } => {
            lines.push(format!(
                "{} {message}",
                colorize_label("error:", use_color, AnsiColor::Red)
            ));
            if let Some(hint) = hint {
                lines.push(format!("{} {hint}", label("hint:")));
            }
            if let Some(cause) = cause {
                lines.push(format!("{} {cause}", label("caused by:")));
            }
        }
        Failure::Api(err) => {
            lines.push(format!(
                "{} {}",
                colorize_label("error:", use_color, AnsiColor::Red),
                error_message(err)
            ));
            if let Some((entity, id)) = err.entity() {
                lines.push(format!("{} {id}", label(&format!("{entity}:"))));
            }
            if let Some(host) = err.host() {
                lines.push(format!("{} {host}", label("host:")));
            }
            if let Some(hint) = err.hint() {
                lines.push(format!("{} {hint}", label("hint:")));
            }
            if let Some(path) = err.path() {
                lines.push(format!("{} {}", label("path:"), path.display()));
            }
            if let Some(cause) = error_causes(err).first() {
                lines.push(format!("{} {cause}", label("caused by:")));
            }
        }
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `objadm --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "objadm") else {
        return "Try `objadm --help`.".to_string();
    };

    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();

    if parts.is_empty() {
        return "Try `objadm --help`.".to_string();
    }
    format!("Try `objadm {} --help`.", parts.join(" "))
}
